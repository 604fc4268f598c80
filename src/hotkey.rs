//! Global start/stop hotkeys.
//!
//! [`HotkeyListener`] owns two logical slots (start and stop) on top of a
//! [`HotkeyBackend`]. Presses are forwarded as [`HotkeyEvent`]s into a bounded
//! tokio channel; the listener never runs engine logic on its own thread.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use global_hotkey::hotkey::HotKey;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{RepeaterError, Result};
use crate::keys::{parse_key_combo, KeyCombo};

/// Identifier the backend assigns to a registered combination.
pub type HotkeyId = u32;

/// How long a caller waits for the backend thread to answer.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
/// Backend and dispatcher poll period.
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const DISPATCH_TIMEOUT: Duration = Duration::from_millis(100);

/// Logical hotkey slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HotkeySlot {
    Start,
    Stop,
}

impl HotkeySlot {
    fn event(self) -> HotkeyEvent {
        match self {
            HotkeySlot::Start => HotkeyEvent::StartPressed,
            HotkeySlot::Stop => HotkeyEvent::StopPressed,
        }
    }
}

impl fmt::Display for HotkeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotkeySlot::Start => f.write_str("start"),
            HotkeySlot::Stop => f.write_str("stop"),
        }
    }
}

/// A press of one of the registered hotkeys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    StartPressed,
    StopPressed,
}

/// OS-level hotkey registration.
pub trait HotkeyBackend: Send + Sync {
    /// Claim `combo` system-wide. Fails with
    /// [`RepeaterError::HotkeyConflict`] if it is already held.
    fn register(&self, combo: &KeyCombo) -> Result<HotkeyId>;

    /// Release a registration. Unknown ids are ignored.
    fn unregister(&self, id: HotkeyId) -> Result<()>;

    /// Ids of registered hotkeys, one message per press, in press order.
    fn presses(&self) -> Receiver<HotkeyId>;
}

/// A slot currently held by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationHandle {
    pub slot: HotkeySlot,
    pub id: HotkeyId,
    pub combo: KeyCombo,
}

/// Start/stop hotkey slots plus the thread that forwards their presses.
pub struct HotkeyListener {
    backend: Arc<dyn HotkeyBackend>,
    slots: Arc<Mutex<HashMap<HotkeySlot, RegistrationHandle>>>,
    stop_flag: Arc<AtomicBool>,
    dispatcher: Option<JoinHandle<()>>,
}

impl HotkeyListener {
    /// Start forwarding presses from `backend` into `events`.
    pub fn new(backend: Arc<dyn HotkeyBackend>, events: mpsc::Sender<HotkeyEvent>) -> Self {
        let slots = Arc::new(Mutex::new(HashMap::new()));
        let stop_flag = Arc::new(AtomicBool::new(false));

        let presses = backend.presses();
        let dispatch_slots = Arc::clone(&slots);
        let dispatch_stop = Arc::clone(&stop_flag);
        let dispatcher = thread::Builder::new()
            .name("hotkey-dispatch".into())
            .spawn(move || dispatch_presses(presses, dispatch_slots, dispatch_stop, events));

        let dispatcher = match dispatcher {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("failed to spawn hotkey dispatcher: {e}");
                None
            }
        };

        Self {
            backend,
            slots,
            stop_flag,
            dispatcher,
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<HotkeySlot, RegistrationHandle>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parse `text` and register it in `slot`.
    pub fn register_text(&self, slot: HotkeySlot, text: &str) -> Result<RegistrationHandle> {
        let combo = parse_key_combo(text)?;
        self.register(slot, &combo)
    }

    /// Put `combo` in `slot`, replacing whatever the slot held.
    ///
    /// On failure the slot keeps its previous combination: the old one is
    /// re-claimed if it had already been released.
    pub fn register(&self, slot: HotkeySlot, combo: &KeyCombo) -> Result<RegistrationHandle> {
        let mut slots = self.slots();

        if let Some(existing) = slots.get(&slot) {
            if existing.combo == *combo {
                return Ok(existing.clone());
            }
        }
        if let Some(other) = slots.values().find(|r| r.slot != slot && r.combo == *combo) {
            return Err(RepeaterError::hotkey_conflict(
                combo.to_string(),
                format!("already used by the {} hotkey", other.slot),
            ));
        }

        let previous = slots.remove(&slot);
        if let Some(prev) = &previous {
            if let Err(e) = self.backend.unregister(prev.id) {
                slots.insert(slot, prev.clone());
                return Err(e);
            }
        }

        match self.backend.register(combo) {
            Ok(id) => {
                let handle = RegistrationHandle {
                    slot,
                    id,
                    combo: combo.clone(),
                };
                slots.insert(slot, handle.clone());
                info!(%slot, %combo, "hotkey registered");
                Ok(handle)
            }
            Err(err) => {
                if let Some(prev) = previous {
                    match self.backend.register(&prev.combo) {
                        Ok(id) => {
                            warn!(%slot, combo = %prev.combo, "kept previous hotkey after failed swap");
                            slots.insert(slot, RegistrationHandle { id, ..prev });
                        }
                        Err(restore) => {
                            error!(%slot, combo = %prev.combo, "previous hotkey could not be restored: {restore}");
                        }
                    }
                }
                Err(err)
            }
        }
    }

    /// Release a registration. Stale or repeated handles are a no-op.
    pub fn unregister(&self, handle: &RegistrationHandle) {
        let mut slots = self.slots();
        if slots.get(&handle.slot).is_some_and(|r| r.id == handle.id) {
            slots.remove(&handle.slot);
            self.release(handle);
        }
    }

    /// Release both slots.
    pub fn unregister_all(&self) {
        let mut slots = self.slots();
        for (_, handle) in slots.drain() {
            self.release(&handle);
        }
    }

    fn release(&self, handle: &RegistrationHandle) {
        match self.backend.unregister(handle.id) {
            Ok(()) => info!(slot = %handle.slot, combo = %handle.combo, "hotkey unregistered"),
            Err(e) => warn!(slot = %handle.slot, combo = %handle.combo, "failed to unregister hotkey: {e}"),
        }
    }

    pub fn registration(&self, slot: HotkeySlot) -> Option<RegistrationHandle> {
        self.slots().get(&slot).cloned()
    }

    pub fn is_registered(&self, slot: HotkeySlot) -> bool {
        self.slots().contains_key(&slot)
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.unregister_all();
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.dispatcher.take() {
            if handle.join().is_err() {
                error!("hotkey dispatcher panicked");
            }
        }
    }
}

fn dispatch_presses(
    presses: Receiver<HotkeyId>,
    slots: Arc<Mutex<HashMap<HotkeySlot, RegistrationHandle>>>,
    stop_flag: Arc<AtomicBool>,
    events: mpsc::Sender<HotkeyEvent>,
) {
    while !stop_flag.load(Ordering::SeqCst) {
        let id = match presses.recv_timeout(DISPATCH_TIMEOUT) {
            Ok(id) => id,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let slot = slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|r| r.id == id)
            .map(|r| r.slot);
        let Some(slot) = slot else {
            debug!(id, "press for unknown hotkey ignored");
            continue;
        };

        debug!(%slot, "hotkey pressed");
        match events.try_send(slot.event()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "engine is busy, hotkey press dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }
    debug!("hotkey dispatcher exited");
}

enum Request {
    Register(HotKey, String, Sender<Result<HotkeyId>>),
    Unregister(HotkeyId, Sender<Result<()>>),
    Shutdown,
}

/// Backend over the `global_hotkey` crate.
///
/// The manager lives on one dedicated thread, which also pumps the Windows
/// message queue; other threads talk to it through request channels.
pub struct GlobalHotkeyBackend {
    requests: Sender<Request>,
    presses: Receiver<HotkeyId>,
    worker: Option<JoinHandle<()>>,
}

impl GlobalHotkeyBackend {
    pub fn new() -> Result<Self> {
        let (requests, request_rx) = unbounded();
        let (press_tx, presses) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        let worker = thread::Builder::new()
            .name("hotkey-backend".into())
            .spawn(move || run_backend(request_rx, press_tx, ready_tx))?;

        match ready_rx.recv_timeout(REQUEST_TIMEOUT) {
            Ok(Ok(())) => Ok(Self {
                requests,
                presses,
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => Err(RepeaterError::hotkey("hotkey backend did not start")),
        }
    }

    fn call<T>(&self, build: impl FnOnce(Sender<Result<T>>) -> Request) -> Result<T> {
        let (reply_tx, reply_rx) = bounded(1);
        self.requests
            .send(build(reply_tx))
            .map_err(|_| RepeaterError::hotkey("hotkey backend has stopped"))?;
        reply_rx
            .recv_timeout(REQUEST_TIMEOUT)
            .map_err(|_| RepeaterError::hotkey("hotkey backend did not respond"))?
    }
}

impl HotkeyBackend for GlobalHotkeyBackend {
    fn register(&self, combo: &KeyCombo) -> Result<HotkeyId> {
        let hotkey = combo.to_hotkey();
        let text = combo.to_string();
        self.call(|reply| Request::Register(hotkey, text, reply))
    }

    fn unregister(&self, id: HotkeyId) -> Result<()> {
        self.call(|reply| Request::Unregister(id, reply))
    }

    fn presses(&self) -> Receiver<HotkeyId> {
        self.presses.clone()
    }
}

impl Drop for GlobalHotkeyBackend {
    fn drop(&mut self) {
        let _ = self.requests.send(Request::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_backend(
    requests: Receiver<Request>,
    presses: Sender<HotkeyId>,
    ready: Sender<Result<()>>,
) {
    let manager = match GlobalHotKeyManager::new() {
        Ok(manager) => {
            let _ = ready.send(Ok(()));
            manager
        }
        Err(e) => {
            let _ = ready.send(Err(RepeaterError::hotkey(format!(
                "failed to create hotkey manager: {e}"
            ))));
            return;
        }
    };
    let events = GlobalHotKeyEvent::receiver();
    let mut registered: HashMap<HotkeyId, HotKey> = HashMap::new();
    info!("hotkey backend started");

    'outer: loop {
        #[cfg(windows)]
        pump_messages();

        loop {
            match requests.try_recv() {
                Ok(Request::Register(hotkey, text, reply)) => {
                    let result = manager
                        .register(hotkey)
                        .map(|()| {
                            registered.insert(hotkey.id(), hotkey);
                            hotkey.id()
                        })
                        .map_err(|e| map_register_error(&text, e));
                    let _ = reply.send(result);
                }
                Ok(Request::Unregister(id, reply)) => {
                    let result = match registered.remove(&id) {
                        Some(hotkey) => manager
                            .unregister(hotkey)
                            .map_err(|e| RepeaterError::hotkey(format!("unregister failed: {e}"))),
                        None => Ok(()),
                    };
                    let _ = reply.send(result);
                }
                Ok(Request::Shutdown) | Err(TryRecvError::Disconnected) => break 'outer,
                Err(TryRecvError::Empty) => break,
            }
        }

        while let Ok(event) = events.try_recv() {
            if event.state == HotKeyState::Pressed
                && registered.contains_key(&event.id())
                && presses.send(event.id()).is_err()
            {
                break 'outer;
            }
        }

        thread::sleep(POLL_INTERVAL);
    }

    for (_, hotkey) in registered.drain() {
        if let Err(e) = manager.unregister(hotkey) {
            warn!("failed to release hotkey on shutdown: {e}");
        }
    }
    info!("hotkey backend stopped");
}

fn map_register_error(combo: &str, err: global_hotkey::Error) -> RepeaterError {
    match err {
        e @ (global_hotkey::Error::AlreadyRegistered(_)
        | global_hotkey::Error::FailedToRegister(_)) => {
            RepeaterError::hotkey_conflict(combo, e.to_string())
        }
        other => RepeaterError::hotkey(format!("failed to register '{combo}': {other}")),
    }
}

#[cfg(windows)]
fn pump_messages() {
    use winapi::um::winuser::{DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE};

    unsafe {
        let mut msg: MSG = std::mem::zeroed();
        while PeekMessageW(&mut msg, std::ptr::null_mut(), 0, 0, PM_REMOVE) != 0 {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}
