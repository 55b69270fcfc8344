//! A persistent configuration record: singleton or factory, bound to at
//! most one plugin location.
//!
//! Grounded on the reentrant per-record locking used by the original
//! configuration-admin implementation: a listener invoked while a record
//! is being updated may call back into that same record (to read its
//! current properties, say) on the same thread, so the record's lock must
//! tolerate recursive acquisition. `parking_lot::ReentrantMutex` gives us
//! that directly, in place of the original's hand-rolled
//! thread-id-tracking mutex.

use std::cell::RefCell;

use ferrite_core::Properties;
use parking_lot::ReentrantMutex;
use serde_json::Value;

use crate::error::{ConfigAdminError, ConfigAdminResult};

struct ConfigurationState {
    dictionary: Properties,
    plugin_location: Option<String>,
    bound_plugin: Option<String>,
    deleted: bool,
}

/// One configuration record. `pid` is stable for the record's lifetime;
/// for a factory instance it is the generated `<factory-pid>-<timestamp>-
/// <counter>` identifier, and `factory_pid` names the template it was
/// minted from.
pub struct Configuration {
    pid: String,
    factory_pid: Option<String>,
    state: ReentrantMutex<RefCell<ConfigurationState>>,
}

impl Configuration {
    pub fn new(pid: impl Into<String>, factory_pid: Option<String>, plugin_location: Option<String>) -> Self {
        Configuration {
            pid: pid.into(),
            factory_pid,
            state: ReentrantMutex::new(RefCell::new(ConfigurationState {
                dictionary: Properties::new(),
                plugin_location,
                bound_plugin: None,
                deleted: false,
            })),
        }
    }

    /// Reconstructs a record from its serialized form (pid/factory-pid/
    /// location are carried inline in the dictionary on disk and stripped
    /// back out here).
    pub fn from_stored(pid: String, factory_pid: Option<String>, mut dictionary: Properties) -> Self {
        let plugin_location = dictionary
            .get("service.pluginLocation")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        dictionary = dictionary
            .without("service.pid")
            .without("service.factoryPid")
            .without("service.pluginLocation");
        Configuration {
            pid,
            factory_pid,
            state: ReentrantMutex::new(RefCell::new(ConfigurationState {
                dictionary,
                plugin_location,
                bound_plugin: None,
                deleted: false,
            })),
        }
    }

    pub fn pid(&self) -> &str {
        &self.pid
    }

    pub fn factory_pid(&self) -> Option<&str> {
        self.factory_pid.as_deref()
    }

    fn check_deleted(&self) -> ConfigAdminResult<()> {
        let guard = self.state.lock();
        if guard.borrow().deleted {
            Err(ConfigAdminError::Core(ferrite_core::CoreError::illegal_state(
                "configuration is deleted",
            )))
        } else {
            Ok(())
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.state.lock().borrow().deleted
    }

    /// User-visible dictionary: the stored keys plus `service.pid` and, if
    /// this is a factory instance, `service.factoryPid`.
    pub fn properties(&self) -> ConfigAdminResult<Properties> {
        self.check_deleted()?;
        let guard = self.state.lock();
        let state = guard.borrow();
        let mut props = state.dictionary.with("service.pid", Value::String(self.pid.clone()));
        if let Some(fpid) = &self.factory_pid {
            props = props.with("service.factoryPid", Value::String(fpid.clone()));
        }
        Ok(props)
    }

    /// As [`Configuration::properties`], plus `service.pluginLocation` when
    /// bound — used internally for delivery and serialization, never
    /// handed to a managed service directly.
    pub fn all_properties(&self) -> ConfigAdminResult<Properties> {
        let mut props = self.properties()?;
        let guard = self.state.lock();
        let state = guard.borrow();
        if let Some(bound) = &state.bound_plugin {
            props = props.with("service.pluginLocation", Value::String(bound.clone()));
        }
        Ok(props)
    }

    pub fn plugin_location(&self) -> Option<String> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.plugin_location.clone().or_else(|| state.bound_plugin.clone())
    }

    pub fn set_plugin_location(&self, location: Option<String>) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.plugin_location = location;
        state.bound_plugin = None;
    }

    /// Binds the record to `plugin` if unbound or already bound to it, and
    /// if the record's declared location (if any) matches. Returns whether
    /// the record is now bound to `plugin`.
    pub fn bind(&self, plugin: &str) -> bool {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if let Some(declared) = &state.plugin_location {
            if declared != plugin {
                return false;
            }
        }
        match &state.bound_plugin {
            Some(bound) => bound == plugin,
            None => {
                state.bound_plugin = Some(plugin.to_string());
                true
            }
        }
    }

    pub fn unbind(&self) {
        self.state.lock().borrow_mut().bound_plugin = None;
    }

    pub fn is_bound_to(&self, plugin: &str) -> bool {
        self.state.lock().borrow().bound_plugin.as_deref() == Some(plugin)
    }

    /// Replaces the record's dictionary, stripping any inline identity
    /// keys the caller might have supplied (those are always derived, never
    /// user-settable).
    pub fn update(&self, new_dictionary: Properties) -> ConfigAdminResult<()> {
        self.check_deleted()?;
        let cleaned = new_dictionary
            .without("service.pid")
            .without("service.factoryPid")
            .without("service.pluginLocation");
        let guard = self.state.lock();
        guard.borrow_mut().dictionary = cleaned;
        Ok(())
    }

    pub fn delete(&self) -> ConfigAdminResult<()> {
        self.check_deleted()?;
        self.state.lock().borrow_mut().deleted = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn properties_carries_pid_and_factory_pid() {
        let config = Configuration::new("P", Some("F".to_string()), None);
        config
            .update(Properties::from_pairs([("k".to_string(), json!("v"))]).unwrap())
            .unwrap();
        let props = config.properties().unwrap();
        assert_eq!(props.get("service.pid"), Some(&json!("P")));
        assert_eq!(props.get("service.factoryPid"), Some(&json!("F")));
        assert_eq!(props.get("k"), Some(&json!("v")));
    }

    #[test]
    fn bind_requires_declared_location_match() {
        let config = Configuration::new("P", None, Some("loc.a".to_string()));
        assert!(!config.bind("loc.b"));
        assert!(config.bind("loc.a"));
        assert!(config.bind("loc.a"));
    }

    #[test]
    fn delete_marks_deleted_and_rejects_further_updates() {
        let config = Configuration::new("P", None, None);
        config.delete().unwrap();
        assert!(config.is_deleted());
        assert!(config.update(Properties::new()).is_err());
    }

    #[test]
    fn from_stored_strips_inline_identity_keys() {
        let dict = Properties::from_pairs([
            ("service.pid".to_string(), json!("P")),
            ("service.pluginLocation".to_string(), json!("loc")),
            ("k".to_string(), json!("v")),
        ])
        .unwrap();
        let config = Configuration::from_stored("P".to_string(), None, dict);
        let props = config.properties().unwrap();
        assert_eq!(props.get("k"), Some(&json!("v")));
        assert_eq!(config.plugin_location(), Some("loc".to_string()));
    }
}
