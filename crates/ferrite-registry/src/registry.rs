//! The framework: the first-class value owning indices, the service-id
//! counter, listener tables, the queued dispatcher, and (through `stop`)
//! the shutdown sequence. One instance per framework; nothing here is
//! process-global.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ferrite_core::{Filter, FrameworkEvent, FrameworkEventKind, PluginEvent, PluginEventKind, Properties, ServiceEvent, ServiceEventKind};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use crate::dispatch::QueuedDispatcher;
use crate::error::{RegistryError, RegistryResult};
use crate::listener::{ListenerCallback, ListenerTable};
use crate::registration::{AnyService, Registration, ServiceReference};

type FrameworkListenerCallback = Arc<dyn Fn(&FrameworkEvent) + Send + Sync>;
type PluginListenerCallback = Arc<dyn Fn(&PluginEvent) + Send + Sync>;

struct FrameworkListenerEntry {
    id: u64,
    callback: FrameworkListenerCallback,
}

struct PluginListenerEntry {
    id: u64,
    queued: bool,
    callback: PluginListenerCallback,
}

#[derive(Default)]
struct Indices {
    all: std::collections::BTreeMap<u64, Arc<Registration>>,
    by_class: HashMap<String, HashSet<u64>>,
    by_plugin: HashMap<String, HashSet<u64>>,
}

/// A single framework instance: the service registry plus its event
/// dispatch machinery. Create one per application; every registration,
/// listener, and counter lives and dies with it.
pub struct Framework {
    indices: Mutex<Indices>,
    service_listeners: Mutex<ListenerTable>,
    plugin_listeners: Mutex<Vec<Arc<PluginListenerEntry>>>,
    framework_listeners: Arc<Mutex<Vec<Arc<FrameworkListenerEntry>>>>,
    queued: Arc<QueuedDispatcher>,
    next_service_id: AtomicU64,
    next_listener_id: AtomicU64,
    stopped: AtomicBool,
}

impl Default for Framework {
    fn default() -> Self {
        Self::new()
    }
}

impl Framework {
    pub fn new() -> Self {
        Framework {
            indices: Mutex::new(Indices::default()),
            service_listeners: Mutex::new(ListenerTable::new()),
            plugin_listeners: Mutex::new(Vec::new()),
            framework_listeners: Arc::new(Mutex::new(Vec::new())),
            queued: QueuedDispatcher::new(),
            next_service_id: AtomicU64::new(1),
            next_listener_id: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
        }
    }

    fn check_running(&self) -> RegistryResult<()> {
        if self.stopped.load(Ordering::Acquire) {
            Err(RegistryError::illegal_state("framework is stopped"))
        } else {
            Ok(())
        }
    }

    /// Publishes `service` under `classes` with the given properties.
    /// `service.id` and `objectclass` are assigned/overwritten; the caller's
    /// properties must not already fail construction-time duplicate-key
    /// validation (enforced by [`Properties::from_pairs`] upstream).
    pub fn register<T: Any + Send + Sync + 'static>(
        &self,
        plugin: &str,
        classes: Vec<String>,
        service: T,
        properties: Properties,
    ) -> RegistryResult<ServiceReference> {
        self.check_running()?;
        if classes.is_empty() {
            return Err(RegistryError::invalid_argument(
                "a service must publish at least one class",
            ));
        }

        let service_id = self.next_service_id.fetch_add(1, Ordering::SeqCst);
        let merged = properties
            .with("service.id", Value::from(service_id))
            .with(
                "objectclass",
                Value::Array(classes.iter().cloned().map(Value::String).collect()),
            );

        let registration = Registration::new(service_id, plugin.to_string(), merged.clone(), Arc::new(service));

        {
            let mut indices = self.indices.lock();
            indices.all.insert(service_id, Arc::clone(&registration));
            for class in &classes {
                indices.by_class.entry(class.clone()).or_default().insert(service_id);
            }
            indices.by_plugin.entry(plugin.to_string()).or_default().insert(service_id);
        }

        let reference = ServiceReference::new(registration);
        let event = ServiceEvent::new(ServiceEventKind::Registered, service_id, merged);
        self.dispatch_uniform(&event, &reference);
        Ok(reference)
    }

    /// Runs the two-phase unregistration: dispatch `UNREGISTERING` while the
    /// service is still obtainable via `get_service`, then remove it from
    /// every index. The underlying [`Registration`] stays alive as long as
    /// any handed-out [`ServiceReference`] keeps it referenced.
    pub fn unregister(&self, reference: &ServiceReference) -> RegistryResult<()> {
        if reference.registration.is_unregistering() {
            return Err(RegistryError::illegal_state("already unregistering"));
        }
        let properties = reference.registration.begin_unregister();
        let event = ServiceEvent::new(ServiceEventKind::Unregistering, reference.service_id(), properties);
        self.dispatch_uniform(&event, reference);

        let mut indices = self.indices.lock();
        indices.all.remove(&reference.service_id());
        for class in reference.classes() {
            if let Some(set) = indices.by_class.get_mut(&class) {
                set.remove(&reference.service_id());
            }
        }
        if let Some(set) = indices.by_plugin.get_mut(reference.owner()) {
            set.remove(&reference.service_id());
        }
        drop(indices);

        let dangling = reference.registration.drain_refcounts();
        if !dangling.is_empty() {
            warn!(service_id = reference.service_id(), ?dangling, "service unregistered with outstanding references");
        }
        Ok(())
    }

    /// Replaces the registration's property dictionary. Emits `MODIFIED` to
    /// listeners whose filter matches the new properties, and
    /// `MODIFIED_ENDMATCH` to listeners whose filter matched the old
    /// properties but not the new ones.
    pub fn set_properties(&self, reference: &ServiceReference, new_properties: Properties) -> RegistryResult<()> {
        if !reference.registration.is_available() {
            return Err(RegistryError::illegal_state("registration is unavailable"));
        }
        let (old, new) = reference.registration.set_properties(new_properties);

        let candidates = {
            let table = self.service_listeners.lock();
            table.candidates(&reference.classes())
        };

        for entry in candidates {
            let matched_old = entry.filter.as_ref().map(|f| f.matches(&old, false)).unwrap_or(true);
            let matched_new = entry.filter.as_ref().map(|f| f.matches(&new, false)).unwrap_or(true);
            let kind = if matched_new {
                Some(ServiceEventKind::Modified)
            } else if matched_old {
                Some(ServiceEventKind::ModifiedEndmatch)
            } else {
                None
            };
            if let Some(kind) = kind {
                let event = ServiceEvent::new(kind, reference.service_id(), new.clone());
                self.invoke_listener(entry, event, reference.clone());
            }
        }
        Ok(())
    }

    /// Highest-ranked visible reference publishing `class`, tie-broken by
    /// lowest `service.id`. Excludes unregistering registrations.
    pub fn get_reference(&self, class: &str) -> Option<ServiceReference> {
        self.get_references(Some(class), None).into_iter().next()
    }

    /// All visible references matching `class` (if given) and `filter` (if
    /// given), ordered by ranking/id.
    pub fn get_references(&self, class: Option<&str>, filter: Option<&Filter>) -> Vec<ServiceReference> {
        let indices = self.indices.lock();
        let candidate_ids: Box<dyn Iterator<Item = u64>> = match class {
            Some(class) => Box::new(indices.by_class.get(class).cloned().unwrap_or_default().into_iter()),
            None => Box::new(indices.all.keys().copied().collect::<Vec<_>>().into_iter()),
        };

        let mut refs: Vec<ServiceReference> = candidate_ids
            .filter_map(|id| indices.all.get(&id).cloned())
            .filter(|reg| reg.is_available() && !reg.is_unregistering())
            .filter(|reg| filter.map(|f| f.matches(&reg.properties(), false)).unwrap_or(true))
            .map(ServiceReference::new)
            .collect();
        drop(indices);
        refs.sort();
        refs
    }

    /// Acquires the service object, incrementing `plugin`'s reference
    /// count. Valid for the duration of an `UNREGISTERING` dispatch even
    /// though the reference is no longer returned by lookups.
    pub fn get_service<T: Any + Send + Sync + 'static>(&self, plugin: &str, reference: &ServiceReference) -> Option<Arc<T>> {
        let any: AnyService = reference.registration.get_service_for(plugin);
        any.downcast::<T>().ok()
    }

    /// Decrements `plugin`'s reference count for this registration.
    /// Returns whether an outstanding reference existed.
    pub fn unget_service(&self, plugin: &str, reference: &ServiceReference) -> bool {
        reference.registration.unget_service_for(plugin)
    }

    /// Registers a service listener. `filter` is parsed and classified
    /// (bucketed by `objectClass` where possible); delivery runs on the
    /// caller's thread unless `queued` is set.
    pub fn add_service_listener(&self, filter: Option<&str>, queued: bool, callback: ListenerCallback) -> RegistryResult<u64> {
        let filter = filter.map(Filter::parse).transpose()?;
        let mut table = self.service_listeners.lock();
        Ok(table.add(filter, queued, callback))
    }

    pub fn remove_service_listener(&self, id: u64) {
        self.service_listeners.lock().remove(id);
    }

    pub fn add_plugin_listener(&self, queued: bool, callback: PluginListenerCallback) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.plugin_listeners.lock().push(Arc::new(PluginListenerEntry { id, queued, callback }));
        id
    }

    pub fn remove_plugin_listener(&self, id: u64) {
        self.plugin_listeners.lock().retain(|e| e.id != id);
    }

    pub fn add_framework_listener(&self, callback: FrameworkListenerCallback) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.framework_listeners.lock().push(Arc::new(FrameworkListenerEntry { id, callback }));
        id
    }

    pub fn remove_framework_listener(&self, id: u64) {
        self.framework_listeners.lock().retain(|e| e.id != id);
    }

    /// Dispatches a plugin lifecycle event. `STARTING`/`STOPPING` are
    /// always delivered synchronously regardless of a listener's queued
    /// preference, matching the concurrency model's carve-out.
    pub fn dispatch_plugin_event(&self, event: PluginEvent) {
        let force_sync = matches!(event.kind, PluginEventKind::Starting | PluginEventKind::Stopping);
        let listeners = self.plugin_listeners.lock().clone();
        for entry in listeners {
            let event = event.clone();
            let run = move || (entry.callback)(&event);
            if !force_sync && entry.queued {
                self.queued.enqueue(run);
            } else {
                run();
            }
        }
    }

    /// Emits a framework-level condition (e.g. a dropped invalid metatype
    /// option) directly, bypassing the per-listener error-isolation path
    /// used for callback failures.
    pub fn emit_framework_event(&self, event: FrameworkEvent) {
        for entry in self.framework_listeners.lock().iter() {
            (entry.callback)(&event);
        }
    }

    fn dispatch_uniform(&self, event: &ServiceEvent, reference: &ServiceReference) {
        let candidates = {
            let table = self.service_listeners.lock();
            table.candidates(&reference.classes())
        };
        for entry in candidates {
            let matches = entry.filter.as_ref().map(|f| f.matches(&event.properties, false)).unwrap_or(true);
            if matches {
                self.invoke_listener(entry, event.clone(), reference.clone());
            }
        }
    }

    fn invoke_listener(&self, entry: Arc<crate::listener::ListenerEntry>, event: ServiceEvent, reference: ServiceReference) {
        let framework_listeners = Arc::clone(&self.framework_listeners);
        let run = move || {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                (entry.callback)(&event, &reference);
            }));
            if outcome.is_err() {
                let owner = reference.owner().to_string();
                let fw_event = FrameworkEvent::for_plugin(FrameworkEventKind::PluginError, owner, "service listener panicked");
                for fl in framework_listeners.lock().iter() {
                    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (fl.callback)(&fw_event)));
                }
            }
        };
        if entry.queued {
            self.queued.enqueue(run);
        } else {
            run();
        }
    }

    /// Cease accepting new registrations, unregister everything still
    /// live, and drain the queued dispatcher within `timeout`. Tracker
    /// closing and configuration flushing are the responsibility of the
    /// layers that own those objects.
    pub fn stop(&self, timeout: Duration) {
        self.stopped.store(true, Ordering::Release);
        let live: Vec<ServiceReference> = {
            let indices = self.indices.lock();
            indices.all.values().cloned().map(ServiceReference::new).collect()
        };
        for reference in live {
            let _ = self.unregister(&reference);
        }
        self.queued.drain(timeout);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn props(pairs: &[(&str, Value)]) -> Properties {
        Properties::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.clone()))).unwrap()
    }

    #[test]
    fn service_ids_strictly_increase() {
        let framework = Framework::new();
        let r1 = framework.register("p", vec!["Foo".into()], 1i32, Properties::new()).unwrap();
        let r2 = framework.register("p", vec!["Foo".into()], 2i32, Properties::new()).unwrap();
        assert!(r2.service_id() > r1.service_id());
    }

    #[test]
    fn unregister_removes_from_lookup_but_reference_keeps_reading_properties() {
        let framework = Framework::new();
        let r = framework
            .register("p", vec!["Foo".into()], 1i32, props(&[("service.ranking", json!(5))]))
            .unwrap();
        framework.unregister(&r).unwrap();
        assert!(framework.get_reference("Foo").is_none());
        assert_eq!(r.properties().get("service.ranking"), Some(&json!(5)));
    }

    #[test]
    fn registered_event_fires_after_lookup_is_observable() {
        let framework = Framework::new();
        let observed_available = Arc::new(AtomicUsize::new(0));
        let observed_clone = Arc::clone(&observed_available);
        framework
            .add_service_listener(None, false, Arc::new(move |_e, _r| {
                observed_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        framework.register("p", vec!["Foo".into()], 1i32, Properties::new()).unwrap();
        assert_eq!(observed_available.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistering_listener_sees_service_but_not_in_lookup() {
        let framework = Framework::new();
        let framework = Arc::new(framework);
        let fw_for_listener = Arc::clone(&framework);
        let r = framework.register("p", vec!["Foo".into()], 99i32, Properties::new()).unwrap();
        let service_id = r.service_id();
        let saw_service = Arc::new(AtomicUsize::new(0));
        let saw_service_clone = Arc::clone(&saw_service);
        framework
            .add_service_listener(None, false, Arc::new(move |event, reference| {
                if event.kind == ferrite_core::ServiceEventKind::Unregistering {
                    let got: Option<Arc<i32>> = fw_for_listener.get_service("consumer", reference);
                    if got.is_some() {
                        saw_service_clone.fetch_add(1, Ordering::SeqCst);
                    }
                    assert!(fw_for_listener
                        .get_references(Some("Foo"), Some(&Filter::parse(&format!("(service.id={service_id})")).unwrap()))
                        .is_empty());
                }
            }))
            .unwrap();
        framework.unregister(&r).unwrap();
        assert_eq!(saw_service.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_properties_emits_modified_and_endmatch() {
        let framework = Framework::new();
        let r = framework
            .register("p", vec!["Foo".into()], 1i32, props(&[("flag", json!(true))]))
            .unwrap();
        let events: Arc<Mutex<Vec<ferrite_core::ServiceEventKind>>> = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        framework
            .add_service_listener(Some("(flag=true)"), false, Arc::new(move |event, _r| {
                events_clone.lock().push(event.kind);
            }))
            .unwrap();
        framework
            .set_properties(&r, props(&[("flag", json!(false))]))
            .unwrap();
        assert_eq!(*events.lock(), vec![ferrite_core::ServiceEventKind::ModifiedEndmatch]);
    }

    #[test]
    fn ranking_order_matches_invariant_5() {
        let framework = Framework::new();
        let a = framework
            .register("p", vec!["S".into()], 1i32, props(&[("service.ranking", json!(1))]))
            .unwrap();
        let b = framework
            .register("p", vec!["S".into()], 2i32, props(&[("service.ranking", json!(7))]))
            .unwrap();
        let refs = framework.get_references(Some("S"), None);
        assert_eq!(refs[0].service_id(), b.service_id());
        assert_eq!(refs[1].service_id(), a.service_id());
    }
}
