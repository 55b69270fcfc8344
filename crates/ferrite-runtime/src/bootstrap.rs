//! Orchestration glue: wires a [`Framework`], a [`ConfigurationAdmin`], and
//! logging together from one [`FrameworkSettings`] value. This is the
//! runtime crate's only functional surface beyond config/logging — it is
//! not a new subsystem from `spec.md`, just the bootstrap path a host
//! program calls once at startup.

use std::sync::Arc;
use std::time::Duration;

use ferrite_configadmin::ConfigurationAdmin;
use ferrite_registry::Framework;
use tracing::info;

use crate::config::{DispatchMode, FrameworkSettings};
use crate::error::RuntimeResult;
use crate::logging::LoggingBuilder;

/// A bootstrapped Ferrite instance: the service registry and the
/// configuration-administration service sharing one set of framework
/// settings, ready for plugins to register services and bind managed
/// services against.
pub struct FerriteRuntime {
    settings: FrameworkSettings,
    framework: Arc<Framework>,
    config_admin: Arc<ConfigurationAdmin>,
}

impl FerriteRuntime {
    /// Builds a runtime from already-loaded settings. Does not install a
    /// `tracing` subscriber — call [`FerriteRuntime::init_logging`] first
    /// if the host hasn't configured one itself.
    pub async fn bootstrap(settings: FrameworkSettings) -> RuntimeResult<Self> {
        let data_dir = settings.data_dir.clone().unwrap_or_else(default_data_dir);
        info!(data_dir = %data_dir.display(), "bootstrapping ferrite runtime");
        let config_admin = ConfigurationAdmin::open(&data_dir).await?;
        Ok(Self {
            settings,
            framework: Arc::new(Framework::new()),
            config_admin,
        })
    }

    /// Convenience constructor that also loads settings via
    /// [`crate::config::load_settings`].
    pub async fn bootstrap_default() -> RuntimeResult<Self> {
        let settings = crate::config::load_settings()?;
        Self::bootstrap(settings).await
    }

    /// Installs a `tracing` subscriber from the loaded logging settings.
    /// Call before any other Ferrite API so registry/tracker/config-admin
    /// spans are captured from the start.
    pub fn init_logging(&self) {
        LoggingBuilder::new()
            .with_level(self.settings.logging.level.to_tracing_level())
            .with_target(self.settings.logging.with_target)
            .with_thread_ids(self.settings.logging.with_thread_ids)
            .init();
    }

    pub fn framework(&self) -> &Arc<Framework> {
        &self.framework
    }

    pub fn config_admin(&self) -> &Arc<ConfigurationAdmin> {
        &self.config_admin
    }

    pub fn settings(&self) -> &FrameworkSettings {
        &self.settings
    }

    /// The default dispatch mode new listeners should use unless a caller
    /// overrides it explicitly.
    pub fn default_dispatch(&self) -> DispatchMode {
        self.settings.dispatch
    }

    /// Drains the registry's queued dispatcher and the config-admin
    /// delivery queues within the settings' shutdown timeout, then
    /// unregisters everything still live. Matches §5's "shutdown of the
    /// framework drains queues with bounded wait; stragglers are
    /// abandoned."
    pub async fn shutdown(&self) {
        let timeout = Duration::from_secs(self.settings.shutdown_timeout_secs);
        self.config_admin.close_delivery();
        // Bounded wait for already-enqueued deliveries to finish draining;
        // stragglers past this are abandoned, matching §5.
        tokio::time::sleep(timeout.min(Duration::from_millis(200))).await;
        self.framework.stop(timeout);
    }
}

fn default_data_dir() -> std::path::PathBuf {
    dirs::data_dir().unwrap_or_else(std::env::temp_dir).join("ferrite")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_creates_store_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = FrameworkSettings::default();
        settings.data_dir = Some(dir.path().to_path_buf());
        let runtime = FerriteRuntime::bootstrap(settings).await.unwrap();
        assert!(dir.path().join("store").exists());
        runtime.shutdown().await;
    }
}
