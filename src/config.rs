//! Automation configuration, validation and persistence.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RepeaterError, Result};
use crate::keys::{parse_key, parse_key_combo, KeyCode};
use crate::window::WindowHandle;

/// Lowest accepted interval; guards against flooding the input queue.
pub const MIN_INTERVAL_MS: u64 = 20;
/// Highest accepted interval (one hour).
pub const MAX_INTERVAL_MS: u64 = 3_600_000;

pub const CONFIG_FILE_NAME: &str = "hotkey_config.json";

/// Where presses are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyMode {
    /// Whatever window has focus.
    #[default]
    Global,
    /// One chosen window, regardless of focus.
    Window,
}

/// Everything the engine needs to run. Replaced wholesale on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default)]
    pub trigger_key: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_start_hotkey")]
    pub start_hotkey: String,
    #[serde(default = "default_stop_hotkey")]
    pub stop_hotkey: String,
    #[serde(default)]
    pub key_mode: KeyMode,
    #[serde(default)]
    pub target_window: Option<WindowHandle>,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_start_hotkey() -> String {
    "F11".to_string()
}

fn default_stop_hotkey() -> String {
    "F12".to_string()
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            trigger_key: String::new(),
            interval_ms: default_interval_ms(),
            start_hotkey: default_start_hotkey(),
            stop_hotkey: default_stop_hotkey(),
            key_mode: KeyMode::Global,
            target_window: None,
        }
    }
}

impl Configuration {
    /// Full validation, run before a configuration is accepted.
    ///
    /// `Window` mode without a target is rejected rather than downgraded.
    pub fn validate(&self) -> Result<()> {
        self.validate_runtime()?;

        if self.start_hotkey.trim().is_empty() {
            return Err(RepeaterError::validation("start hotkey cannot be empty"));
        }
        if self.stop_hotkey.trim().is_empty() {
            return Err(RepeaterError::validation("stop hotkey cannot be empty"));
        }
        let start = parse_key_combo(&self.start_hotkey)
            .map_err(|e| RepeaterError::validation(format!("start hotkey: {e}")))?;
        let stop = parse_key_combo(&self.stop_hotkey)
            .map_err(|e| RepeaterError::validation(format!("stop hotkey: {e}")))?;
        if start == stop {
            return Err(RepeaterError::validation(
                "start and stop hotkeys must be different",
            ));
        }

        if self.key_mode == KeyMode::Window && self.target_window.is_none() {
            return Err(RepeaterError::validation(
                "window mode requires a target window",
            ));
        }

        Ok(())
    }

    /// Checks needed to start the key loop: a resolvable trigger key and a
    /// sane interval.
    pub fn validate_runtime(&self) -> Result<()> {
        self.trigger()?;
        if self.interval_ms < MIN_INTERVAL_MS {
            return Err(RepeaterError::validation(format!(
                "interval must be at least {MIN_INTERVAL_MS} ms"
            )));
        }
        if self.interval_ms > MAX_INTERVAL_MS {
            return Err(RepeaterError::validation(format!(
                "interval must be at most {MAX_INTERVAL_MS} ms"
            )));
        }
        Ok(())
    }

    /// The trigger key resolved to a [`KeyCode`].
    pub fn trigger(&self) -> Result<KeyCode> {
        if self.trigger_key.trim().is_empty() {
            return Err(RepeaterError::validation("trigger key cannot be empty"));
        }
        parse_key(&self.trigger_key)
            .map_err(|e| RepeaterError::validation(format!("trigger key: {e}")))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// The window presses go to, if any. `Global` mode ignores the target.
    pub fn window_target(&self) -> Option<&WindowHandle> {
        match self.key_mode {
            KeyMode::Global => None,
            KeyMode::Window => self.target_window.as_ref(),
        }
    }
}

/// Parse `500ms`, `2s`, `1m` or a bare millisecond count.
pub fn parse_duration(text: &str) -> Result<Duration> {
    let value = text.trim().to_lowercase();
    if value.is_empty() {
        return Err(RepeaterError::invalid_duration(text, "empty duration"));
    }

    let (number, unit_ms) = if let Some(n) = value.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = value.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = value.strip_suffix('m') {
        (n, 60_000)
    } else {
        (value.as_str(), 1)
    };

    let amount: u64 = number
        .trim()
        .parse()
        .map_err(|_| RepeaterError::invalid_duration(text, "expected a non-negative integer"))?;
    let millis = amount
        .checked_mul(unit_ms)
        .ok_or_else(|| RepeaterError::invalid_duration(text, "duration too large"))?;
    Ok(Duration::from_millis(millis))
}

/// Persistence collaborator. `save` returns the value as stored.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Configuration>;
    fn save(&self, config: &Configuration) -> Result<Configuration>;
}

/// Stores the configuration as pretty-printed JSON in one file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<user config dir>/hotkey-repeater/hotkey_config.json`.
    pub fn default_location() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "hotkey-repeater")
            .ok_or_else(|| RepeaterError::config_load(CONFIG_FILE_NAME, "no home directory"))?;
        Ok(Self::new(dirs.config_dir().join(CONFIG_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

impl ConfigStore for JsonFileStore {
    /// A missing file yields the default configuration.
    fn load(&self) -> Result<Configuration> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no config file, using defaults");
            return Ok(Configuration::default());
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| RepeaterError::config_load(self.display_path(), e.to_string()))?;
        serde_json::from_str(&content)
            .map_err(|e| RepeaterError::config_load(self.display_path(), e.to_string()))
    }

    fn save(&self, config: &Configuration) -> Result<Configuration> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| RepeaterError::config_save(self.display_path(), e.to_string()))?;
        }
        let data = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, data)
            .map_err(|e| RepeaterError::config_save(self.display_path(), e.to_string()))?;
        debug!(path = %self.path.display(), "config saved");
        Ok(config.clone())
    }
}
