//! Error taxonomy for configuration administration and metatype parsing.

use std::sync::Arc;

use ferrite_core::CoreError;
use ferrite_registry::RegistryError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConfigAdminError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Raised by a managed service rejecting a dictionary. Logged at error
    /// severity and never propagated back to the caller that triggered the
    /// update — only surfaced through a `ConfigurationListener`/framework
    /// event, never as a `Result` to `update`/`delete`.
    #[error("configuration rejected for pid {pid}: {reason}")]
    Configuration { pid: String, reason: String },

    /// A `<Designate>`/`<OCD>`/`<AD>` element failed the metatype grammar's
    /// required-field or type-class rules. The offending file is skipped in
    /// its entirety; other files still parse.
    #[error("metatype parse error in {file}: {reason}")]
    MetatypeParse { file: String, reason: String },

    #[error("I/O error for pid {pid}: {source}")]
    Io {
        pid: String,
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl ConfigAdminError {
    pub fn configuration(pid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            pid: pid.into(),
            reason: reason.into(),
        }
    }

    pub fn metatype_parse(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MetatypeParse {
            file: file.into(),
            reason: reason.into(),
        }
    }

    pub fn io(pid: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            pid: pid.into(),
            source: Arc::new(source),
        }
    }
}

pub type ConfigAdminResult<T> = Result<T, ConfigAdminError>;
