//! Errors raised by the bootstrap/orchestration layer itself, as opposed
//! to the framework/registry/config-admin errors it wraps and surfaces.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    ConfigAdmin(#[from] ferrite_configadmin::ConfigAdminError),

    #[error("logging already initialized")]
    LoggingAlreadyInitialized,
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
