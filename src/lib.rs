//! # Hotkey Repeater
//!
//! Presses a key over and over on a fixed interval, started and stopped by
//! global hotkeys. Presses go either to whatever window has focus or to one
//! chosen window.
//!
//! ## Components
//!
//! - [`keys`]: key names and combinations to and from native codes
//! - [`window`]: top-level window listing and liveness checks
//! - [`injector`]: synthetic key presses, global or window-scoped
//! - [`hotkey`]: start/stop hotkey registration and press delivery
//! - [`status`]: status broadcast to any number of observers
//! - [`engine`]: the run/stop state machine tying it all together
//!
//! ## Example
//!
//! ```no_run
//! use hotkey_repeater::{AutomationEngine, Configuration, EngineParts, EngineSettings, JsonFileStore};
//!
//! # async fn run() -> hotkey_repeater::Result<()> {
//! let engine = AutomationEngine::new(
//!     EngineParts::native(JsonFileStore::default_location()?),
//!     EngineSettings::default(),
//! );
//! engine.init_from_store().await;
//! engine.spawn_hotkey_loop();
//!
//! let mut status = engine.subscribe();
//! while let Some(s) = status.recv().await {
//!     println!("running={} registered={}", s.running, s.registered);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```json
//! {
//!   "triggerKey": "F6",
//!   "intervalMs": 100,
//!   "startHotkey": "F11",
//!   "stopHotkey": "F12",
//!   "keyMode": "global"
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod hotkey;
pub mod injector;
pub mod keys;
pub mod process;
pub mod status;
pub mod window;

pub use config::{ConfigStore, Configuration, JsonFileStore, KeyMode};
pub use engine::{AutomationEngine, EngineParts, EngineSettings, TARGET_CLOSED};
pub use error::{RepeaterError, Result};
pub use hotkey::{HotkeyBackend, HotkeyEvent, HotkeyListener, HotkeySlot};
pub use injector::InputInjector;
pub use keys::{encode_key_event, parse_key_combo, KeyCode, KeyCombo, Modifier};
pub use status::{Status, StatusStream};
pub use window::{WindowHandle, WindowRegistry};
