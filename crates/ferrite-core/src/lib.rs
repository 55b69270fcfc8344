//! Foundation types for the Ferrite plugin/service framework.
//!
//! This crate has no dependency on the registry or config-admin layers: it
//! defines the vocabulary they share. [`Version`] and [`Filter`] are
//! standalone value/grammar types; [`Properties`] is the dictionary type
//! that both service registrations and configuration records use; the
//! `event` module defines the sum types dispatched by every higher layer.

pub mod error;
pub mod event;
pub mod filter;
pub mod properties;
pub mod version;

pub use error::{CoreError, CoreResult};
pub use event::{FrameworkEvent, FrameworkEventKind, PluginEvent, PluginEventKind, ServiceEvent, ServiceEventKind};
pub use filter::Filter;
pub use properties::Properties;
pub use version::Version;
