//! Registration internals and the shareable [`ServiceReference`] handle.
//!
//! A registration outlives `unregister`: the published index drops its
//! strong reference on removal, but any [`ServiceReference`] handed out
//! earlier keeps the record alive so listeners notified during the
//! `UNREGISTERING` event — and any caller still holding a reference after
//! that — can keep reading its last-known properties.

use std::any::Any;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use ferrite_core::Properties;
use parking_lot::ReentrantMutex;
use serde_json::Value;

/// The service object itself, type-erased. Consumers downcast through
/// [`ServiceReference::get_service`] on the typed façade in `registry.rs`.
pub type AnyService = Arc<dyn Any + Send + Sync>;

pub(crate) struct RegistrationState {
    pub properties: Properties,
    pub available: bool,
    pub unregistering: bool,
    pub refcounts: HashMap<String, u32>,
    pub service: AnyService,
}

/// The registry's internal record for one published service.
///
/// Guarded by a single reentrant lock, per the concurrency model: a
/// listener invoked synchronously from `setProperties` or `unregister` may
/// call back into `get_service`/`unget_service` on the very registration
/// whose event it is handling, on the same thread, without deadlocking.
pub struct Registration {
    pub service_id: u64,
    pub owner: String,
    state: ReentrantMutex<RefCell<RegistrationState>>,
}

impl Registration {
    pub(crate) fn new(
        service_id: u64,
        owner: String,
        properties: Properties,
        service: AnyService,
    ) -> Arc<Self> {
        Arc::new(Registration {
            service_id,
            owner,
            state: ReentrantMutex::new(RefCell::new(RegistrationState {
                properties,
                available: true,
                unregistering: false,
                refcounts: HashMap::new(),
                service,
            })),
        })
    }

    pub fn is_available(&self) -> bool {
        let guard = self.state.lock();
        guard.borrow().available
    }

    pub fn is_unregistering(&self) -> bool {
        let guard = self.state.lock();
        guard.borrow().unregistering
    }

    pub fn properties(&self) -> Properties {
        let guard = self.state.lock();
        guard.borrow().properties.clone()
    }

    pub fn classes(&self) -> Vec<String> {
        self.properties()
            .get("objectclass")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn ranking(&self) -> i64 {
        self.properties()
            .get("service.ranking")
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }

    /// Begins unregistration: clears `available` and sets `unregistering`
    /// atomically under the lock. Returns the property snapshot at that
    /// instant, used to build the `UNREGISTERING` event.
    pub(crate) fn begin_unregister(&self) -> Properties {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.available = false;
        state.unregistering = true;
        state.properties.clone()
    }

    /// Replaces the dictionary, re-asserting `service.id` and `objectclass`.
    /// Returns the old and new snapshots for event comparison.
    pub(crate) fn set_properties(&self, new_props: Properties) -> (Properties, Properties) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let old = state.properties.clone();
        let objectclass = old.get("objectclass").cloned().unwrap_or(Value::Array(vec![]));
        let merged = new_props
            .with("service.id", Value::from(self.service_id))
            .with("objectclass", objectclass);
        state.properties = merged.clone();
        (old, merged)
    }

    pub(crate) fn get_service_for(&self, plugin: &str) -> AnyService {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        *state.refcounts.entry(plugin.to_string()).or_insert(0) += 1;
        Arc::clone(&state.service)
    }

    pub(crate) fn unget_service_for(&self, plugin: &str) -> bool {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        match state.refcounts.get_mut(plugin) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    state.refcounts.remove(plugin);
                }
                true
            }
            _ => false,
        }
    }

    pub(crate) fn drain_refcounts(&self) -> HashMap<String, u32> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        std::mem::take(&mut state.refcounts)
    }
}

/// A shareable handle to a [`Registration`]. Two references compare equal
/// iff they refer to the same registration. Ordering is descending
/// `service.ranking`, then ascending `service.id`.
#[derive(Clone)]
pub struct ServiceReference {
    pub(crate) registration: Arc<Registration>,
}

impl ServiceReference {
    pub(crate) fn new(registration: Arc<Registration>) -> Self {
        ServiceReference { registration }
    }

    pub fn service_id(&self) -> u64 {
        self.registration.service_id
    }

    pub fn ranking(&self) -> i64 {
        self.registration.ranking()
    }

    /// Current property snapshot. Remains available after unregistration.
    pub fn properties(&self) -> Properties {
        self.registration.properties()
    }

    pub fn classes(&self) -> Vec<String> {
        self.registration.classes()
    }

    pub fn is_unregistering(&self) -> bool {
        self.registration.is_unregistering()
    }

    pub fn owner(&self) -> &str {
        &self.registration.owner
    }
}

impl PartialEq for ServiceReference {
    fn eq(&self, other: &Self) -> bool {
        self.registration.service_id == other.registration.service_id
    }
}

impl Eq for ServiceReference {}

impl PartialOrd for ServiceReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServiceReference {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .ranking()
            .cmp(&self.ranking())
            .then_with(|| self.service_id().cmp(&other.service_id()))
    }
}

impl std::hash::Hash for ServiceReference {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.registration.service_id.hash(state);
    }
}

impl std::fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceReference")
            .field("service_id", &self.service_id())
            .field("ranking", &self.ranking())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_core::Properties;
    use serde_json::json;

    fn make_ref(id: u64, ranking: i64) -> ServiceReference {
        let props = Properties::from_pairs([
            ("service.id".to_string(), json!(id)),
            ("service.ranking".to_string(), json!(ranking)),
            ("objectclass".to_string(), json!(["Foo"])),
        ])
        .unwrap();
        let registration = Registration::new(id, "owner".to_string(), props, Arc::new(()));
        ServiceReference::new(registration)
    }

    #[test]
    fn orders_by_ranking_desc_then_id_asc() {
        let mut refs = vec![make_ref(1, 1), make_ref(2, 7), make_ref(3, 7), make_ref(4, 2)];
        refs.sort();
        let ids: Vec<u64> = refs.iter().map(|r| r.service_id()).collect();
        assert_eq!(ids, vec![2, 3, 4, 1]);
    }

    #[test]
    fn equality_is_by_registration_identity() {
        let a = make_ref(1, 0);
        let b = a.clone();
        let c = make_ref(2, 0);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
