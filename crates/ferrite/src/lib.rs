//! # Ferrite
//!
//! A dynamic plugin/service framework modelled on the OSGi service-registry
//! contract: a concurrent service registry with ranked lookup and filtered
//! event dispatch, service trackers, and a configuration-administration
//! service with metatype-described schemas.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐     ┌───────────────┐     ┌────────────────────┐
//! │ ferrite-core│───▶│ferrite-registry│───▶│ferrite-configadmin │
//! │  Version    │     │  Framework     │     │ ConfigurationAdmin │
//! │  Filter     │     │  ServiceTracker│     │ Metatype           │
//! │  Properties │     │                │     │                    │
//! └────────────┘     └───────────────┘     └────────────────────┘
//!                              ▲
//!                              │
//!                     ┌────────┴────────┐
//!                     │ ferrite-runtime │
//!                     │  FerriteRuntime  │
//!                     └─────────────────┘
//! ```
//!
//! - **ferrite-core**: [`Version`], [`Filter`] (RFC 1960 LDAP-style
//!   filters), [`Properties`] (the case-insensitive typed property map),
//!   and the shared error/event taxonomy.
//! - **ferrite-registry**: [`Framework`], the service registry and
//!   filtered listener dispatch; [`ServiceTracker`] for a dynamic
//!   high-ranked view over matching services.
//! - **ferrite-configadmin**: [`ConfigurationAdmin`], persistent
//!   singleton/factory configuration records delivered asynchronously to
//!   managed services, plus metatype XML parsing.
//! - **ferrite-runtime**: [`FerriteRuntime`], the bootstrap glue tying the
//!   above together with structured logging and settings loading.
//!
//! ## Quick start
//!
//! ```ignore
//! use ferrite::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = FerriteRuntime::bootstrap_default().await?;
//!     runtime.init_logging();
//!
//!     let framework = runtime.framework();
//!     let reference = framework.register(
//!         "my-plugin",
//!         vec!["com.example.Greeter".into()],
//!         MyGreeter,
//!         Properties::new(),
//!     )?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub use ferrite_core;
pub use ferrite_registry;
pub use ferrite_configadmin;
pub use ferrite_runtime;

/// Convenience re-exports covering the common path through all four
/// crates: bootstrap the runtime, register/track services, and wire up
/// configuration.
pub mod prelude {
    pub use ferrite_core::{
        CoreError, CoreResult, Filter, FrameworkEvent, FrameworkEventKind, PluginEvent, PluginEventKind, Properties,
        ServiceEvent, ServiceEventKind, Version,
    };
    pub use ferrite_registry::{
        Criterion, DefaultCustomizer, Framework, RegistryError, RegistryResult, ServiceReference, ServiceTracker,
        TrackerCustomizer,
    };
    pub use ferrite_configadmin::{
        AttributeDefinition, AttributeOption, AttributeType, ConfigAdminError, ConfigAdminEvent, ConfigAdminResult,
        Configuration, ConfigurationAdmin, ConfigurationAdminFacade, ConfigurationListener, ConfigurationPlugin,
        Designate, ManagedService, ManagedServiceFactory, MetaData, ObjectClassDefinition,
    };
    pub use ferrite_runtime::{FerriteRuntime, RuntimeError, RuntimeResult};
    pub use ferrite_runtime::config::{DispatchMode, FrameworkSettings};

    pub use tracing::{debug, error, info, instrument, span, trace, warn};
}
