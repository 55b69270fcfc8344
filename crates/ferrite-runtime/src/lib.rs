//! Bootstrap layer for the Ferrite plugin framework.
//!
//! This crate provides:
//! - Structured logging setup (`logging`)
//! - Framework-level configuration loading (`config`) — log level/format,
//!   the data directory root for config-admin's store, default dispatch
//!   mode
//! - [`FerriteRuntime`]: the orchestration glue that bootstraps a
//!   [`ferrite_registry::Framework`] and a
//!   [`ferrite_configadmin::ConfigurationAdmin`] from one settings value
//!
//! None of this is a new subsystem from the specification — it's the
//! ambient stack every crate in this shape carries, plus the handful of
//! lines needed to wire the functional crates together at process
//! startup.
//!
//! ```ignore
//! use ferrite_runtime::FerriteRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = FerriteRuntime::bootstrap_default().await?;
//!     runtime.init_logging();
//!
//!     let framework = runtime.framework();
//!     let _reference = framework.register("my-plugin", vec!["MyService".into()], MyService, Default::default())?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;

pub use bootstrap::FerriteRuntime;
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};

// Re-export for downstream convenience, matching the teacher's runtime
// crate re-exporting `tracing`/`tracing_subscriber`.
pub use tracing;
pub use tracing_subscriber;

/// Convenience re-exports for a host program wiring up a Ferrite instance.
pub mod prelude {
    pub use crate::FerriteRuntime;
    pub use crate::config::{DispatchMode, FrameworkSettings};
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
