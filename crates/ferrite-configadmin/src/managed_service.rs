//! Callback interfaces a service implements to receive configuration.

use async_trait::async_trait;
use ferrite_core::Properties;

use crate::error::ConfigAdminError;

/// Implemented by a service registered under a singleton PID. `updated`
/// receives `None` when the configuration has been deleted.
#[async_trait]
pub trait ManagedService: Send + Sync {
    async fn updated(&self, properties: Option<Properties>) -> Result<(), ConfigAdminError>;
}

/// Implemented by a service registered under a factory PID, handling every
/// instance spawned from it. `pid` is the generated per-instance
/// identifier, not the factory PID itself.
#[async_trait]
pub trait ManagedServiceFactory: Send + Sync {
    async fn updated(&self, pid: &str, properties: Option<Properties>) -> Result<(), ConfigAdminError>;
    async fn deleted(&self, pid: &str);
}
