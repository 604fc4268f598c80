//! The automation engine: configuration owner and run/stop state machine.
//!
//! All commands (hotkey presses, explicit start/stop, config saves) are
//! serialized by one async lock around [`EngineState`]. The key loop runs as
//! its own tokio task with a snapshot of the configuration it was started
//! with, and only ever touches the status channel, never the engine lock.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigStore, Configuration, JsonFileStore, KeyMode};
use crate::error::{RepeaterError, Result};
use crate::hotkey::{GlobalHotkeyBackend, HotkeyBackend, HotkeyEvent, HotkeyListener, HotkeySlot};
use crate::injector::{InputInjector, NativeInjector};
use crate::keys::KeyCode;
use crate::status::{Status, StatusChannel, StatusStream};
use crate::window::{NativeWindowRegistry, WindowHandle, WindowRegistry};

/// `last_error` reported when a window-mode target disappears.
pub const TARGET_CLOSED: &str = "target window closed";

/// Tunables for the key loop.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Upper bound on a single injection call; exceeding it counts as a failure.
    pub injection_timeout: Duration,
    /// Consecutive injection failures after which the loop gives up.
    pub max_consecutive_failures: u32,
    /// Capacity of the hotkey event queue.
    pub event_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            injection_timeout: Duration::from_millis(300),
            max_consecutive_failures: 10,
            event_buffer: 32,
        }
    }
}

/// The collaborators an engine is built from.
pub struct EngineParts {
    /// Hotkey backend, or the reason none is available.
    pub hotkeys: Result<Arc<dyn HotkeyBackend>>,
    pub injector: Arc<dyn InputInjector>,
    pub windows: Arc<dyn WindowRegistry>,
    pub store: Arc<dyn ConfigStore>,
}

impl EngineParts {
    /// OS-backed parts persisting to `store`.
    pub fn native(store: JsonFileStore) -> Self {
        let hotkeys = GlobalHotkeyBackend::new().map(|b| Arc::new(b) as Arc<dyn HotkeyBackend>);
        if let Err(e) = &hotkeys {
            warn!("global hotkeys unavailable: {e}");
        }
        Self {
            hotkeys,
            injector: Arc::new(NativeInjector::new()),
            windows: Arc::new(NativeWindowRegistry::new()),
            store: Arc::new(store),
        }
    }
}

struct Runner {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Runner {
    fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the loop and wait for it. The loop checks the signal before
    /// every tick, so this waits at most one in-flight injection.
    async fn stop_and_join(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                error!("key loop panicked: {e}");
            }
        }
    }
}

struct EngineState {
    config: Configuration,
    runner: Option<Runner>,
}

struct Shared {
    state: tokio::sync::Mutex<EngineState>,
    status: Arc<StatusChannel>,
    listener: Option<HotkeyListener>,
    hotkeys_unavailable: Option<String>,
    injector: Arc<dyn InputInjector>,
    windows: Arc<dyn WindowRegistry>,
    store: Arc<dyn ConfigStore>,
    settings: EngineSettings,
    events: Mutex<Option<mpsc::Receiver<HotkeyEvent>>>,
}

impl Shared {
    fn claim_hotkeys(&self, start: &str, stop: &str) -> Result<()> {
        let Some(listener) = &self.listener else {
            let reason = self
                .hotkeys_unavailable
                .clone()
                .unwrap_or_else(|| "hotkey backend unavailable".to_string());
            return Err(RepeaterError::hotkey(reason));
        };

        listener.unregister_all();
        let result = listener
            .register_text(HotkeySlot::Start, start)
            .and_then(|_| listener.register_text(HotkeySlot::Stop, stop));
        if result.is_err() {
            listener.unregister_all();
        }
        result.map(|_| ())
    }
}

/// Handle to the engine. Cheap to clone; all clones drive the same engine.
#[derive(Clone)]
pub struct AutomationEngine {
    shared: Arc<Shared>,
}

impl AutomationEngine {
    /// Build an idle, unregistered engine. Call [`AutomationEngine::init`]
    /// and [`AutomationEngine::spawn_hotkey_loop`] next.
    pub fn new(parts: EngineParts, settings: EngineSettings) -> Self {
        let (events_tx, events_rx) = mpsc::channel(settings.event_buffer.max(1));
        let (listener, hotkeys_unavailable) = match parts.hotkeys {
            Ok(backend) => (Some(HotkeyListener::new(backend, events_tx)), None),
            Err(e) => (None, Some(e.to_string())),
        };

        Self {
            shared: Arc::new(Shared {
                state: tokio::sync::Mutex::new(EngineState {
                    config: Configuration::default(),
                    runner: None,
                }),
                status: Arc::new(StatusChannel::default()),
                listener,
                hotkeys_unavailable,
                injector: parts.injector,
                windows: parts.windows,
                store: parts.store,
                settings,
                events: Mutex::new(Some(events_rx)),
            }),
        }
    }

    /// Adopt `config` and claim its hotkeys.
    ///
    /// Registration failures are reported through the status, never as an
    /// error: the engine stays usable and a later save retries.
    pub async fn init(&self, config: Configuration) {
        let mut state = self.shared.state.lock().await;
        if let Some(runner) = state.runner.take() {
            runner.stop_and_join().await;
        }
        state.config = config;

        let registration = self.register_hotkeys(&state.config).await;
        if let Err(e) = &registration {
            warn!("hotkey registration failed: {e}");
        }
        self.shared.status.publish(Status {
            running: false,
            registered: registration.is_ok(),
            last_error: registration.err().map(|e| e.to_string()),
        });
        info!(
            trigger = %state.config.trigger_key,
            start = %state.config.start_hotkey,
            stop = %state.config.stop_hotkey,
            "engine initialized"
        );
    }

    /// Load the stored configuration (defaults if unreadable) and `init` with it.
    pub async fn init_from_store(&self) {
        let config = match self.shared.store.load() {
            Ok(config) => config,
            Err(e) => {
                warn!("failed to load configuration, using defaults: {e}");
                Configuration::default()
            }
        };
        self.init(config).await;
    }

    /// Drain hotkey presses in arrival order on a dedicated task.
    ///
    /// Returns `None` if the loop was already spawned. The task ends once
    /// every engine handle has been dropped.
    pub fn spawn_hotkey_loop(&self) -> Option<JoinHandle<()>> {
        let mut events = self
            .shared
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);

        Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                AutomationEngine { shared }.handle_hotkey(event).await;
            }
            debug!("hotkey command loop exited");
        }))
    }

    /// Apply one hotkey press.
    pub async fn handle_hotkey(&self, event: HotkeyEvent) {
        match event {
            HotkeyEvent::StartPressed => self.start_task().await,
            HotkeyEvent::StopPressed => self.stop_task().await,
        }
    }

    pub async fn get_config(&self) -> Configuration {
        self.shared.state.lock().await.config.clone()
    }

    pub fn get_status(&self) -> Status {
        self.shared.status.current()
    }

    /// Status stream: the current value first, then every transition.
    pub fn subscribe(&self) -> StatusStream {
        self.shared.status.subscribe()
    }

    /// Begin emitting the trigger key. No-op while already running.
    pub async fn start_task(&self) {
        let mut state = self.shared.state.lock().await;

        if let Some(runner) = &state.runner {
            if runner.is_active() && self.shared.status.current().running {
                debug!("start ignored, key loop already running");
                return;
            }
        }
        // A loop that stopped itself is reaped before starting a new one.
        if let Some(runner) = state.runner.take() {
            runner.stop_and_join().await;
        }

        let (key, target) = match self.check_startable(&state.config) {
            Ok(ready) => ready,
            Err(e) => {
                warn!("cannot start key loop: {e}");
                self.shared
                    .status
                    .update(|s| s.last_error = Some(e.to_string()));
                return;
            }
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        self.shared.status.update(|s| {
            s.running = true;
            s.last_error = None;
        });

        let context = LoopContext {
            status: Arc::clone(&self.shared.status),
            injector: Arc::clone(&self.shared.injector),
            windows: Arc::clone(&self.shared.windows),
            settings: self.shared.settings.clone(),
        };
        info!(
            %key,
            interval_ms = state.config.interval_ms,
            target = ?target.as_ref().map(|w| w.id),
            "key loop started"
        );
        let handle = tokio::spawn(run_key_loop(
            context,
            key,
            target,
            state.config.interval(),
            stop_rx,
        ));
        state.runner = Some(Runner {
            stop: stop_tx,
            handle,
        });
    }

    /// Stop the key loop. No-op while idle; safe to race with a hotkey stop.
    pub async fn stop_task(&self) {
        let mut state = self.shared.state.lock().await;
        let Some(runner) = state.runner.take() else {
            debug!("stop ignored, key loop not running");
            return;
        };
        runner.stop_and_join().await;
        if self.shared.status.update(|s| s.running = false) {
            info!("key loop stopped");
        }
    }

    /// Validate and apply a new configuration.
    ///
    /// Invalid input is rejected with [`RepeaterError::Validation`] before
    /// anything changes. Otherwise the loop is stopped, hotkeys are swapped
    /// and one combined status is published. The configuration is kept even
    /// if its hotkeys cannot be registered.
    pub async fn save_config(&self, next: Configuration) -> Result<Configuration> {
        next.validate()?;

        let mut state = self.shared.state.lock().await;
        if let Some(runner) = state.runner.take() {
            runner.stop_and_join().await;
            info!("key loop stopped for configuration change");
        }
        self.release_hotkeys().await;

        let (stored, persist_error) = match self.shared.store.save(&next) {
            Ok(stored) => (stored, None),
            Err(e) => {
                warn!("failed to persist configuration: {e}");
                (next, Some(e.to_string()))
            }
        };
        state.config = stored.clone();

        let registration = self.register_hotkeys(&state.config).await;
        let registered = registration.is_ok();
        let last_error = match registration {
            Err(e) => {
                warn!("hotkey registration failed: {e}");
                Some(e.to_string())
            }
            Ok(()) => persist_error,
        };
        self.shared.status.publish(Status {
            running: false,
            registered,
            last_error,
        });
        info!(
            trigger = %stored.trigger_key,
            interval_ms = stored.interval_ms,
            mode = ?stored.key_mode,
            "configuration applied"
        );
        Ok(stored)
    }

    pub fn list_windows(&self, filter: Option<&str>) -> Result<Vec<WindowHandle>> {
        self.shared.windows.list_windows(filter)
    }

    pub fn check_window_valid(&self, handle: &WindowHandle) -> bool {
        self.shared.windows.is_valid(handle)
    }

    /// Stop the loop and release both hotkeys.
    pub async fn shutdown(&self) {
        let mut state = self.shared.state.lock().await;
        if let Some(runner) = state.runner.take() {
            runner.stop_and_join().await;
        }
        self.release_hotkeys().await;
        self.shared.status.update(|s| {
            s.running = false;
            s.registered = false;
        });
        info!("engine shut down");
    }

    /// Claim both hotkeys or neither. Backend calls block, so they run on
    /// the blocking pool.
    async fn register_hotkeys(&self, config: &Configuration) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let start = config.start_hotkey.clone();
        let stop = config.stop_hotkey.clone();
        tokio::task::spawn_blocking(move || shared.claim_hotkeys(&start, &stop))
            .await
            .map_err(|e| RepeaterError::hotkey(format!("hotkey registration task failed: {e}")))?
    }

    async fn release_hotkeys(&self) {
        let shared = Arc::clone(&self.shared);
        let released = tokio::task::spawn_blocking(move || {
            if let Some(listener) = &shared.listener {
                listener.unregister_all();
            }
        })
        .await;
        if let Err(e) = released {
            error!("hotkey release task failed: {e}");
        }
    }

    fn check_startable(&self, config: &Configuration) -> Result<(KeyCode, Option<WindowHandle>)> {
        config.validate_runtime()?;
        let key = config.trigger()?;

        let target = config.window_target().cloned();
        match &target {
            None if config.key_mode == KeyMode::Window => {
                return Err(RepeaterError::validation(
                    "window mode requires a target window",
                ));
            }
            Some(window) if !self.shared.windows.is_valid(window) => {
                return Err(RepeaterError::TargetGone(window.id));
            }
            _ => {}
        }
        Ok((key, target))
    }
}

/// Everything the key loop touches.
struct LoopContext {
    status: Arc<StatusChannel>,
    injector: Arc<dyn InputInjector>,
    windows: Arc<dyn WindowRegistry>,
    settings: EngineSettings,
}

async fn run_key_loop(
    context: LoopContext,
    key: KeyCode,
    target: Option<WindowHandle>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures: u32 = 0;
    let mut in_flight: Option<InFlight> = None;

    let gave_up = loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    debug!("key loop received stop");
                    break None;
                }
            }
            _ = ticker.tick() => {
                match press_once(&context, key, target.as_ref(), &mut in_flight).await {
                    Ok(()) => {
                        if failures > 0 {
                            info!(failures, "key injection recovered");
                        }
                        failures = 0;
                        context.status.update(|s| s.last_error = None);
                    }
                    Err(RepeaterError::TargetGone(id)) => {
                        warn!(window = id, "target window closed, stopping key loop");
                        break Some(TARGET_CLOSED.to_string());
                    }
                    Err(e) => {
                        failures += 1;
                        warn!(failures, "key injection failed: {e}");
                        if failures >= context.settings.max_consecutive_failures {
                            error!(failures, "too many injection failures, stopping key loop");
                            break Some(format!(
                                "stopped after {failures} consecutive injection failures: {e}"
                            ));
                        }
                        context.status.update(|s| s.last_error = Some(e.to_string()));
                    }
                }
            }
        }
    };

    // The loop is not done until a timed-out press has landed or failed.
    if let Some(pending) = in_flight.take() {
        debug!("waiting for in-flight key press");
        if let Err(e) = pending.await {
            warn!("in-flight key press failed: {e}");
        }
    }
    if let Some(reason) = gave_up {
        context.status.update(|s| {
            s.running = false;
            s.last_error = Some(reason);
        });
    }
}

type InFlight = JoinHandle<Result<()>>;

/// One press, bounded by the injection timeout. A press that times out keeps
/// running in `in_flight`, and no new press starts until it has finished.
async fn press_once(
    context: &LoopContext,
    key: KeyCode,
    target: Option<&WindowHandle>,
    in_flight: &mut Option<InFlight>,
) -> Result<()> {
    if let Some(window) = target {
        if !context.windows.is_valid(window) {
            return Err(RepeaterError::TargetGone(window.id));
        }
    }
    if in_flight.as_ref().is_some_and(|pending| !pending.is_finished()) {
        return Err(RepeaterError::injection_failed(
            "previous press still in progress",
        ));
    }
    *in_flight = None;

    let injector = Arc::clone(&context.injector);
    let target = target.cloned();
    let mut call = tokio::task::spawn_blocking(move || match &target {
        Some(window) => injector.press_to_window(window, key),
        None => injector.press_global(key),
    });

    match tokio::time::timeout(context.settings.injection_timeout, &mut call).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(RepeaterError::injection_failed(format!(
            "injector task failed: {join}"
        ))),
        Err(_) => {
            *in_flight = Some(call);
            Err(RepeaterError::injection_failed(format!(
                "timed out after {} ms",
                context.settings.injection_timeout.as_millis()
            )))
        }
    }
}
