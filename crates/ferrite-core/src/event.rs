//! Event sum types dispatched by the registry, trackers, and config-admin.
//!
//! One enum per event family rather than an inheritance hierarchy: a
//! `ServiceEvent` always carries the affected reference's `service.id` and
//! the snapshot of its properties at dispatch time, a `PluginEvent` carries
//! the plugin symbolic name, and a `FrameworkEvent` carries an optional
//! originating plugin for error attribution.

use crate::properties::Properties;

/// The kind of change a [`ServiceEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEventKind {
    /// A service became observable via lookup. Delivered after the
    /// registration is inserted into the registry's indices.
    Registered,
    /// The registration's properties changed and the listener's filter
    /// matches the new properties.
    Modified,
    /// The registration's properties changed and the listener's filter
    /// matched the old properties but no longer matches the new ones.
    ModifiedEndmatch,
    /// The service is being unregistered. The service object remains
    /// obtainable via `get_service` for the duration of this event, but
    /// filtered lookups will no longer return the reference.
    Unregistering,
}

/// A change in a service registration's observable state.
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    pub kind: ServiceEventKind,
    pub service_id: u64,
    pub properties: Properties,
}

impl ServiceEvent {
    pub fn new(kind: ServiceEventKind, service_id: u64, properties: Properties) -> Self {
        ServiceEvent {
            kind,
            service_id,
            properties,
        }
    }
}

/// Lifecycle transition kind for a [`PluginEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginEventKind {
    Installed,
    Resolved,
    Starting,
    Started,
    Stopping,
    Stopped,
    Uninstalled,
}

/// A plugin lifecycle transition.
#[derive(Debug, Clone)]
pub struct PluginEvent {
    pub kind: PluginEventKind,
    pub plugin: String,
}

impl PluginEvent {
    pub fn new(kind: PluginEventKind, plugin: impl Into<String>) -> Self {
        PluginEvent {
            kind,
            plugin: plugin.into(),
        }
    }
}

/// The kind of condition a [`FrameworkEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameworkEventKind {
    /// The framework finished starting.
    Started,
    /// A listener, tracker customizer, configuration-plugin interceptor,
    /// or managed-service callback raised an error. Isolated from sibling
    /// callbacks; never propagated back to the caller that triggered the
    /// originating event.
    PluginError,
    /// A non-fatal condition worth surfacing without aborting the
    /// triggering operation, e.g. a dropped invalid metatype `<Option>`.
    Warning,
    /// An informational notice, e.g. a corrupt configuration file deleted
    /// on load.
    Info,
}

/// A framework-wide condition not tied to a single service or plugin
/// transition, or an error attributed to a specific plugin.
#[derive(Debug, Clone)]
pub struct FrameworkEvent {
    pub kind: FrameworkEventKind,
    pub plugin: Option<String>,
    pub message: String,
}

impl FrameworkEvent {
    pub fn new(kind: FrameworkEventKind, message: impl Into<String>) -> Self {
        FrameworkEvent {
            kind,
            plugin: None,
            message: message.into(),
        }
    }

    pub fn for_plugin(kind: FrameworkEventKind, plugin: impl Into<String>, message: impl Into<String>) -> Self {
        FrameworkEvent {
            kind,
            plugin: Some(plugin.into()),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_error_carries_originating_plugin() {
        let event = FrameworkEvent::for_plugin(
            FrameworkEventKind::PluginError,
            "com.example.listener",
            "listener panicked",
        );
        assert_eq!(event.plugin.as_deref(), Some("com.example.listener"));
    }
}
