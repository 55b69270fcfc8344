//! Configuration Administration and Metatype for the Ferrite plugin
//! framework: persistent per-PID configuration records, ordered
//! asynchronous delivery to managed services, and XML-described attribute
//! metadata.

mod admin;
mod configuration;
mod delivery;
mod error;
mod managed_service;
mod metatype;
mod plugin;
mod store;

pub use admin::{ConfigAdminEvent, ConfigAdminEventKind, ConfigurationAdmin, ConfigurationAdminFacade, ConfigurationListener};
pub use configuration::Configuration;
pub use error::{ConfigAdminError, ConfigAdminResult};
pub use managed_service::{ManagedService, ManagedServiceFactory};
pub use metatype::{AttributeDefinition, AttributeOption, AttributeType, Designate, MetaData, ObjectClassDefinition};
pub use plugin::{ConfigurationPlugin, ConfigurationPluginChain};
pub use store::ConfigurationStore;
