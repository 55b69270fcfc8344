//! Framework-level bootstrap settings.
//!
//! This is distinct from `ferrite_configadmin::Configuration` — those are
//! the per-PID records §4.F delivers to managed services. This schema only
//! covers *this process's* framework instance: its log level, where §4.F's
//! one-file-per-PID store lives, and the default dispatch mode new
//! listeners get when a caller doesn't say otherwise.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root settings structure for bootstrapping a [`crate::FerriteRuntime`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkSettings {
    pub logging: LoggingSettings,

    /// Directory under which `ferrite-configadmin` stores one file per PID.
    /// Defaults to a subdirectory of the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// Default dispatch mode for listeners registered without an explicit
    /// preference.
    pub dispatch: DispatchMode,

    /// Bounded wait applied to `Framework::stop`'s queue drain and to
    /// config-admin's delivery-queue flush during shutdown.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for FrameworkSettings {
    fn default() -> Self {
        Self {
            logging: LoggingSettings::default(),
            data_dir: None,
            dispatch: DispatchMode::default(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

/// Logging configuration loaded from the framework settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub format: LogFormat,
    pub with_target: bool,
    pub with_thread_ids: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            with_target: false,
            with_thread_ids: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Default delivery mode for service/plugin listeners that don't request
/// one explicitly (§4.D: "some listeners receive events on the current
/// thread ... others via a framework-wide queue").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    #[default]
    Synchronous,
    Queued,
}

impl DispatchMode {
    pub fn is_queued(self) -> bool {
        matches!(self, DispatchMode::Queued)
    }
}
