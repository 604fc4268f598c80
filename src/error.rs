//! Error types for hotkey-repeater.
//!
//! Every component returns [`RepeaterError`]. The engine catches component
//! failures and folds them into `Status::last_error`; only configuration
//! validation reaches callers of `save_config` directly.

use std::io;
use thiserror::Error;

/// Main error type for hotkey-repeater operations.
#[derive(Error, Debug)]
pub enum RepeaterError {
    /// Key name or key combination text could not be parsed.
    #[error("invalid key format '{input}': {reason}")]
    InvalidKeyFormat { input: String, reason: String },

    /// The OS refused a hotkey because something else already holds it.
    #[error("hotkey '{combo}' is already in use: {reason}")]
    HotkeyConflict { combo: String, reason: String },

    /// Synthetic input was rejected or did not complete in time.
    #[error("key injection failed: {0}")]
    InjectionFailed(String),

    /// The target window no longer exists.
    #[error("target window {0:#x} is gone")]
    TargetGone(u64),

    /// A configuration was rejected before anything was applied.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// Hotkey subsystem failure other than a conflict.
    #[error("hotkey error: {0}")]
    Hotkey(String),

    /// Error reading or parsing a configuration file.
    #[error("failed to load config from '{path}': {reason}")]
    ConfigLoad { path: String, reason: String },

    /// Error writing a configuration file.
    #[error("failed to save config to '{path}': {reason}")]
    ConfigSave { path: String, reason: String },

    /// Error parsing duration string.
    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// Platform-specific operation is not supported.
    #[error("operation not supported on this platform: {0}")]
    UnsupportedPlatform(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for hotkey-repeater operations.
pub type Result<T> = std::result::Result<T, RepeaterError>;

impl RepeaterError {
    pub fn invalid_key_format(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKeyFormat {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn hotkey_conflict(combo: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HotkeyConflict {
            combo: combo.into(),
            reason: reason.into(),
        }
    }

    pub fn injection_failed(message: impl Into<String>) -> Self {
        Self::InjectionFailed(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn hotkey(message: impl Into<String>) -> Self {
        Self::Hotkey(message.into())
    }

    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config_save(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigSave {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_duration(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported_platform(message: impl Into<String>) -> Self {
        Self::UnsupportedPlatform(message.into())
    }

    /// Stable code for the hosting application to branch on.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidKeyFormat { .. } => "INVALID_KEY_FORMAT",
            Self::HotkeyConflict { .. } => "HOTKEY_CONFLICT",
            Self::InjectionFailed(_) => "INJECTION_FAILED",
            Self::TargetGone(_) => "TARGET_GONE",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Hotkey(_) => "HOTKEY_ERROR",
            Self::ConfigLoad { .. } => "CONFIG_LOAD_ERROR",
            Self::ConfigSave { .. } => "CONFIG_SAVE_ERROR",
            Self::InvalidDuration { .. } => "INVALID_DURATION",
            Self::UnsupportedPlatform(_) => "UNSUPPORTED_PLATFORM",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }
}
