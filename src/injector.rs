//! Synthetic key presses.
//!
//! A press is a key-down followed by a key-up. The global path goes through
//! `enigo` into the system-wide input stream; the window path posts keyboard
//! messages straight to one window so it works without focus.
//!
//! Calls are synchronous. The engine bounds them with its own timeout, so an
//! implementation is allowed to block.

use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use enigo::{Direction, Enigo, Keyboard, Settings};
use tracing::{debug, trace};

use crate::error::{RepeaterError, Result};
use crate::keys::KeyCode;
use crate::window::WindowHandle;

/// Time the key is held between down and up.
pub const KEY_HOLD: Duration = Duration::from_millis(10);

/// Emits key presses either globally or into a specific window.
pub trait InputInjector: Send + Sync {
    /// Press and release `key` on the system-wide input stream.
    fn press_global(&self, key: KeyCode) -> Result<()>;

    /// Press and release `key` inside `window`, regardless of focus.
    ///
    /// Fails with [`RepeaterError::TargetGone`] if the window is known to be
    /// closed. Implementations are not required to re-validate on each call.
    fn press_to_window(&self, window: &WindowHandle, key: KeyCode) -> Result<()>;
}

/// Injector backed by the running desktop.
///
/// The `enigo` connection is opened on first use so that constructing the
/// injector never fails on a machine without a display.
pub struct NativeInjector {
    enigo: Mutex<Option<Enigo>>,
}

impl Default for NativeInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeInjector {
    pub fn new() -> Self {
        Self {
            enigo: Mutex::new(None),
        }
    }
}

impl InputInjector for NativeInjector {
    fn press_global(&self, key: KeyCode) -> Result<()> {
        let mut guard = self.enigo.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            let enigo = Enigo::new(&Settings::default()).map_err(|e| {
                RepeaterError::injection_failed(format!("failed to open input device: {e}"))
            })?;
            *guard = Some(enigo);
        }
        let Some(enigo) = guard.as_mut() else {
            return Err(RepeaterError::injection_failed("input device unavailable"));
        };

        let enigo_key = key.to_enigo_key();
        trace!(%key, "global key down");
        enigo
            .key(enigo_key, Direction::Press)
            .map_err(|e| RepeaterError::injection_failed(format!("key down {key}: {e}")))?;
        thread::sleep(KEY_HOLD);
        enigo
            .key(enigo_key, Direction::Release)
            .map_err(|e| RepeaterError::injection_failed(format!("key up {key}: {e}")))?;
        debug!(%key, "global key press sent");
        Ok(())
    }

    #[cfg(windows)]
    fn press_to_window(&self, window: &WindowHandle, key: KeyCode) -> Result<()> {
        use winapi::shared::minwindef::{LPARAM, WPARAM};
        use winapi::um::winuser::{IsWindow, PostMessageW, WM_KEYDOWN, WM_KEYUP};

        use crate::window::win32::to_hwnd;

        let hwnd = to_hwnd(window.id);
        let vk = key.virtual_key() as WPARAM;

        if unsafe { IsWindow(hwnd) } == 0 {
            return Err(RepeaterError::TargetGone(window.id));
        }

        if unsafe { PostMessageW(hwnd, WM_KEYDOWN, vk, 1) } == 0 {
            return Err(RepeaterError::injection_failed(format!(
                "WM_KEYDOWN {key} to {:#x}: {}",
                window.id,
                std::io::Error::last_os_error()
            )));
        }
        thread::sleep(KEY_HOLD);
        // Repeat count 1, previous-state and transition bits set.
        if unsafe { PostMessageW(hwnd, WM_KEYUP, vk, 0xC000_0001u32 as LPARAM) } == 0 {
            return Err(RepeaterError::injection_failed(format!(
                "WM_KEYUP {key} to {:#x}: {}",
                window.id,
                std::io::Error::last_os_error()
            )));
        }
        debug!(%key, window = window.id, "window key press posted");
        Ok(())
    }

    #[cfg(not(windows))]
    fn press_to_window(&self, _window: &WindowHandle, _key: KeyCode) -> Result<()> {
        Err(RepeaterError::unsupported_platform(
            "window-scoped key injection requires Windows",
        ))
    }
}
