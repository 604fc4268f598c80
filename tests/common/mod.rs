#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use hotkey_repeater::hotkey::HotkeyId;
use hotkey_repeater::{
    parse_key_combo, AutomationEngine, ConfigStore, Configuration, EngineParts, EngineSettings,
    HotkeyBackend, InputInjector, KeyCode, KeyCombo, RepeaterError, Result, Status, StatusStream,
    WindowHandle, WindowRegistry,
};

/// Hotkey backend that lives in memory. Combos marked external behave as if
/// another process owns them.
pub struct FakeHotkeyBackend {
    state: Mutex<FakeHotkeyState>,
    register_delay_ms: AtomicU32,
    press_tx: Sender<HotkeyId>,
    press_rx: Receiver<HotkeyId>,
}

#[derive(Default)]
struct FakeHotkeyState {
    next_id: HotkeyId,
    held: HashMap<HotkeyId, KeyCombo>,
    external: HashSet<KeyCombo>,
}

impl FakeHotkeyBackend {
    pub fn new() -> Arc<Self> {
        let (press_tx, press_rx) = unbounded();
        Arc::new(Self {
            state: Mutex::new(FakeHotkeyState::default()),
            register_delay_ms: AtomicU32::new(0),
            press_tx,
            press_rx,
        })
    }

    pub fn hold_externally(&self, combo: &str) {
        let combo = parse_key_combo(combo).unwrap();
        self.state.lock().unwrap().external.insert(combo);
    }

    /// Make every `register` call block for `delay`, like a slow OS call.
    pub fn delay_registration(&self, delay: Duration) {
        self.register_delay_ms
            .store(delay.as_millis() as u32, Ordering::SeqCst);
    }

    /// Registered combos in canonical text, sorted.
    pub fn held(&self) -> Vec<String> {
        let mut held: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .held
            .values()
            .map(|c| c.to_string())
            .collect();
        held.sort();
        held
    }

    /// Simulate the user pressing `combo`. Unregistered combos are ignored.
    pub fn press(&self, combo: &str) {
        let combo = parse_key_combo(combo).unwrap();
        let state = self.state.lock().unwrap();
        if let Some((id, _)) = state.held.iter().find(|(_, c)| **c == combo) {
            self.press_tx.send(*id).unwrap();
        }
    }
}

impl HotkeyBackend for FakeHotkeyBackend {
    fn register(&self, combo: &KeyCombo) -> Result<HotkeyId> {
        let delay = self.register_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay as u64));
        }
        let mut state = self.state.lock().unwrap();
        if state.external.contains(combo) || state.held.values().any(|c| c == combo) {
            return Err(RepeaterError::hotkey_conflict(
                combo.to_string(),
                "held by another application",
            ));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.held.insert(id, combo.clone());
        Ok(id)
    }

    fn unregister(&self, id: HotkeyId) -> Result<()> {
        self.state.lock().unwrap().held.remove(&id);
        Ok(())
    }

    fn presses(&self) -> Receiver<HotkeyId> {
        self.press_rx.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Press {
    pub window: Option<u64>,
    pub key: KeyCode,
    pub at: Instant,
}

/// Injector that records presses and can be told to fail or stall.
#[derive(Default)]
pub struct RecordingInjector {
    presses: Mutex<Vec<Press>>,
    fail_next: AtomicU32,
    fail_always: AtomicBool,
    stall_ms: AtomicU32,
}

impl RecordingInjector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn presses(&self) -> Vec<Press> {
        self.presses.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.presses.lock().unwrap().len()
    }

    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn fail_always(&self, on: bool) {
        self.fail_always.store(on, Ordering::SeqCst);
    }

    pub fn stall(&self, duration: Duration) {
        self.stall_ms
            .store(duration.as_millis() as u32, Ordering::SeqCst);
    }

    fn record(&self, window: Option<u64>, key: KeyCode) -> Result<()> {
        let stall = self.stall_ms.load(Ordering::SeqCst);
        if stall > 0 {
            thread::sleep(Duration::from_millis(stall as u64));
        }
        if self.fail_always.load(Ordering::SeqCst) {
            return Err(RepeaterError::injection_failed("access denied"));
        }
        let pending = self.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next.store(pending - 1, Ordering::SeqCst);
            return Err(RepeaterError::injection_failed("focus lost"));
        }
        self.presses.lock().unwrap().push(Press {
            window,
            key,
            at: Instant::now(),
        });
        Ok(())
    }
}

impl InputInjector for RecordingInjector {
    fn press_global(&self, key: KeyCode) -> Result<()> {
        self.record(None, key)
    }

    fn press_to_window(&self, window: &WindowHandle, key: KeyCode) -> Result<()> {
        self.record(Some(window.id), key)
    }
}

/// Window registry over a fixed set of windows that tests can close.
#[derive(Default)]
pub struct FakeWindowRegistry {
    windows: Mutex<Vec<WindowHandle>>,
}

impl FakeWindowRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self, id: u64, title: &str) -> WindowHandle {
        let window = WindowHandle {
            id,
            title: title.to_string(),
            class_name: "FakeClass".to_string(),
            process_name: "fake.exe".to_string(),
        };
        self.windows.lock().unwrap().push(window.clone());
        window
    }

    pub fn close(&self, id: u64) {
        self.windows.lock().unwrap().retain(|w| w.id != id);
    }
}

impl WindowRegistry for FakeWindowRegistry {
    fn list_windows(&self, filter: Option<&str>) -> Result<Vec<WindowHandle>> {
        let windows = self.windows.lock().unwrap().clone();
        Ok(hotkey_repeater::window::filter_windows(windows, filter))
    }

    fn is_valid(&self, handle: &WindowHandle) -> bool {
        self.windows.lock().unwrap().iter().any(|w| w.id == handle.id)
    }
}

/// Config store kept in memory; can be told to fail saves.
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Option<Configuration>>,
    saves: AtomicU32,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(config: Configuration) -> Arc<Self> {
        let store = Self::default();
        *store.saved.lock().unwrap() = Some(config);
        Arc::new(store)
    }

    pub fn saved(&self) -> Option<Configuration> {
        self.saved.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, on: bool) {
        self.fail_saves.store(on, Ordering::SeqCst);
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Configuration> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, config: &Configuration) -> Result<Configuration> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(RepeaterError::config_save("memory", "disk full"));
        }
        *self.saved.lock().unwrap() = Some(config.clone());
        Ok(config.clone())
    }
}

pub struct Harness {
    pub engine: AutomationEngine,
    pub hotkeys: Arc<FakeHotkeyBackend>,
    pub injector: Arc<RecordingInjector>,
    pub windows: Arc<FakeWindowRegistry>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let hotkeys = FakeHotkeyBackend::new();
        let injector = RecordingInjector::new();
        let windows = FakeWindowRegistry::new();
        let store = MemoryStore::new();
        let engine = AutomationEngine::new(
            EngineParts {
                hotkeys: Ok(hotkeys.clone() as Arc<dyn HotkeyBackend>),
                injector: injector.clone(),
                windows: windows.clone(),
                store: store.clone(),
            },
            settings,
        );
        engine.spawn_hotkey_loop();
        Self {
            engine,
            hotkeys,
            injector,
            windows,
            store,
        }
    }
}

/// `triggerKey=F6, intervalMs=100, startHotkey=F11, stopHotkey=F12, Global`.
pub fn scenario_config() -> Configuration {
    Configuration {
        trigger_key: "F6".to_string(),
        interval_ms: 100,
        start_hotkey: "F11".to_string(),
        stop_hotkey: "F12".to_string(),
        ..Configuration::default()
    }
}

/// Wait until the stream yields a status matching `pred`.
pub async fn wait_for<F>(stream: &mut StatusStream, timeout: Duration, pred: F) -> Status
where
    F: Fn(&Status) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match stream.recv().await {
                Some(status) if pred(&status) => return status,
                Some(_) => continue,
                None => panic!("status channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for status")
}
