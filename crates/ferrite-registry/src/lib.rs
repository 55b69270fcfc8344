//! Service registry, reference/lifecycle management, filtered event
//! dispatch, and service trackers.
//!
//! [`Framework`] is the first-class value: it owns the registration
//! indices, the service-id counter, the listener tables, and the queued
//! dispatcher. Everything here runs on plain OS threads behind
//! `parking_lot` locks — no async runtime — matching the "many
//! plugin-controlled threads simultaneously" scheduling model.

pub mod dispatch;
pub mod error;
pub mod listener;
pub mod registration;
pub mod registry;
pub mod tracker;

pub use error::{RegistryError, RegistryResult};
pub use listener::ListenerCallback;
pub use registration::{AnyService, ServiceReference};
pub use registry::Framework;
pub use tracker::{Criterion, DefaultCustomizer, ServiceTracker, TrackerCustomizer};
