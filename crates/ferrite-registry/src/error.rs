//! Error taxonomy for the service registry and tracker layer.

use ferrite_core::CoreError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A tracker's `get_reference`/`get_service` found nothing tracked.
    #[error("no matching service")]
    NoSuchService,
}

impl RegistryError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::Core(CoreError::invalid_argument(msg))
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::Core(CoreError::illegal_state(msg))
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
