//! Dynamic view over the registry for one service reference, class,
//! filter, or the empty criterion (track everything).
//!
//! Grounded on the same event semantics the registry documents:
//! `REGISTERED`/`MODIFIED` with a matching reference triggers `adding` (if
//! untracked) or `modified` (if already tracked); `MODIFIED_ENDMATCH`/
//! `UNREGISTERING` triggers `removed`. A tracker's own lock only ever
//! guards bookkeeping — the tracked map, the cached highest-ranked
//! reference, and the modification counter — never a customizer callback,
//! which may block indefinitely.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ferrite_core::{Filter, ServiceEventKind};
use parking_lot::{Condvar, Mutex};

use crate::error::{RegistryError, RegistryResult};
use crate::registration::ServiceReference;
use crate::registry::Framework;

/// What a tracker follows.
#[derive(Clone)]
pub enum Criterion {
    Reference(ServiceReference),
    Class(String),
    Filter(Filter),
    /// Tracks every visible service.
    Any,
}

impl Criterion {
    fn listener_filter(&self) -> Option<Filter> {
        match self {
            Criterion::Reference(r) => Filter::parse(&format!("(service.id={})", r.service_id())).ok(),
            Criterion::Class(class) => Filter::parse(&format!("(objectClass={class})")).ok(),
            Criterion::Filter(f) => Some(f.clone()),
            Criterion::Any => None,
        }
    }

    fn lookup_class(&self) -> Option<String> {
        match self {
            Criterion::Class(class) => Some(class.clone()),
            _ => None,
        }
    }

    fn lookup_filter(&self) -> Option<Filter> {
        match self {
            Criterion::Filter(f) => Some(f.clone()),
            _ => None,
        }
    }
}

/// Callbacks invoked as the tracker's view changes. Default behavior
/// matches the registry's conventional customizer: `adding` acquires the
/// service object, `removed` releases it, `modified` does nothing.
pub trait TrackerCustomizer<T>: Send + Sync {
    fn adding(&self, reference: &ServiceReference) -> Option<Arc<T>>;
    fn modified(&self, _reference: &ServiceReference, _tracked: &Arc<T>) {}
    fn removed(&self, _reference: &ServiceReference, _tracked: &Arc<T>) {}
}

/// The customizer used when a tracker is opened without one: get/unget the
/// service on behalf of `plugin`.
pub struct DefaultCustomizer<T> {
    framework: Arc<Framework>,
    plugin: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DefaultCustomizer<T> {
    pub fn new(framework: Arc<Framework>, plugin: impl Into<String>) -> Self {
        DefaultCustomizer {
            framework,
            plugin: plugin.into(),
            _marker: PhantomData,
        }
    }
}

impl<T: Any + Send + Sync + 'static> TrackerCustomizer<T> for DefaultCustomizer<T> {
    fn adding(&self, reference: &ServiceReference) -> Option<Arc<T>> {
        self.framework.get_service::<T>(&self.plugin, reference)
    }

    fn removed(&self, reference: &ServiceReference, _tracked: &Arc<T>) {
        self.framework.unget_service(&self.plugin, reference);
    }
}

struct TrackerState<T> {
    tracked: HashMap<u64, (ServiceReference, Arc<T>)>,
    cached_highest: Option<ServiceReference>,
    cache_valid: bool,
}

/// A live, customizer-driven view over the registrations matching a
/// [`Criterion`]. Must be wrapped in `Arc` to `open()`, since the listener
/// subscribed on `open()` holds a weak back-reference to dispatch events.
pub struct ServiceTracker<T> {
    framework: Arc<Framework>,
    criterion: Criterion,
    customizer: Arc<dyn TrackerCustomizer<T>>,
    state: Mutex<TrackerState<T>>,
    condvar: Condvar,
    listener_id: Mutex<Option<u64>>,
    tracking_count: AtomicI64,
}

impl<T: Any + Send + Sync + 'static> ServiceTracker<T> {
    pub fn new(framework: Arc<Framework>, criterion: Criterion, customizer: Arc<dyn TrackerCustomizer<T>>) -> Arc<Self> {
        Arc::new(ServiceTracker {
            framework,
            criterion,
            customizer,
            state: Mutex::new(TrackerState {
                tracked: HashMap::new(),
                cached_highest: None,
                cache_valid: false,
            }),
            condvar: Condvar::new(),
            listener_id: Mutex::new(None),
            tracking_count: AtomicI64::new(0),
        })
    }

    /// Subscribes to matching service events, then performs an initial
    /// query so already-registered matches are tracked immediately. Events
    /// delivered concurrently with the initial scan are naturally
    /// deduplicated by the tracked-map check in `handle_event`, so neither
    /// path can lose or double-count a reference's terminal state.
    pub fn open(self: &Arc<Self>) -> RegistryResult<()> {
        let mut listener_guard = self.listener_id.lock();
        if listener_guard.is_some() {
            return Err(RegistryError::illegal_state("tracker is already open"));
        }

        let weak = Arc::downgrade(self);
        let filter_string = self.criterion.listener_filter().map(|f| f.to_string());
        let id = self.framework.add_service_listener(
            filter_string.as_deref(),
            false,
            Arc::new(move |event, reference| {
                if let Some(tracker) = weak.upgrade() {
                    tracker.handle_event(event.kind, reference);
                }
            }),
        )?;
        *listener_guard = Some(id);
        drop(listener_guard);

        let class = self.criterion.lookup_class();
        let filter = self.criterion.lookup_filter();
        let mut refs = self.framework.get_references(class.as_deref(), filter.as_ref());
        if let Criterion::Reference(wanted) = &self.criterion {
            refs.retain(|r| r == wanted);
        }
        for reference in refs {
            self.handle_event(ServiceEventKind::Registered, &reference);
        }
        Ok(())
    }

    /// Unsubscribes and invokes `removed` for every currently tracked
    /// reference. `tracking_count()` reports `-1` once closed.
    pub fn close(self: &Arc<Self>) {
        if let Some(id) = self.listener_id.lock().take() {
            self.framework.remove_service_listener(id);
        }
        let tracked: Vec<(ServiceReference, Arc<T>)> = {
            let mut state = self.state.lock();
            std::mem::take(&mut state.tracked).into_values().collect()
        };
        for (reference, obj) in &tracked {
            self.customizer.removed(reference, obj);
        }
        self.condvar.notify_all();
    }

    /// Eagerly untracks `reference`, invoking `removed` if it was tracked.
    pub fn remove(&self, reference: &ServiceReference) {
        let removed = self.state.lock().tracked.remove(&reference.service_id());
        if let Some((_, obj)) = removed {
            self.customizer.removed(reference, &obj);
            self.bump_and_invalidate();
        }
    }

    pub fn size(&self) -> usize {
        self.state.lock().tracked.len()
    }

    /// `-1` once `close()` has run; otherwise the number of add/modify/
    /// remove applications observed.
    pub fn tracking_count(&self) -> i64 {
        if self.listener_id.lock().is_none() {
            -1
        } else {
            self.tracking_count.load(Ordering::SeqCst)
        }
    }

    /// The cached highest-ranked tracked reference. Fails with
    /// [`RegistryError::NoSuchService`] when nothing is tracked.
    pub fn get_reference(&self) -> RegistryResult<ServiceReference> {
        let mut state = self.state.lock();
        if !state.cache_valid {
            state.cached_highest = state.tracked.values().map(|(r, _)| r.clone()).min();
            state.cache_valid = true;
        }
        state.cached_highest.clone().ok_or(RegistryError::NoSuchService)
    }

    /// The tracked object for `reference`, or — with no argument — the
    /// cached highest-ranked tracked object.
    pub fn get_service(&self, reference: Option<&ServiceReference>) -> Option<Arc<T>> {
        match reference {
            Some(r) => self.state.lock().tracked.get(&r.service_id()).map(|(_, o)| Arc::clone(o)),
            None => {
                let top = self.get_reference().ok()?;
                self.state.lock().tracked.get(&top.service_id()).map(|(_, o)| Arc::clone(o))
            }
        }
    }

    /// Blocks until `size() > 0` or `timeout` elapses (`timeout == 0` means
    /// wait indefinitely), then returns `get_service(None)`.
    pub fn wait_for_service(&self, timeout: Duration) -> Option<Arc<T>> {
        let mut state = self.state.lock();
        if timeout.is_zero() {
            while state.tracked.is_empty() {
                self.condvar.wait(&mut state);
            }
        } else {
            let deadline = Instant::now() + timeout;
            while state.tracked.is_empty() {
                if self.condvar.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
        }
        let empty = state.tracked.is_empty();
        drop(state);
        if empty {
            None
        } else {
            self.get_service(None)
        }
    }

    fn handle_event(&self, kind: ServiceEventKind, reference: &ServiceReference) {
        match kind {
            ServiceEventKind::Registered | ServiceEventKind::Modified => {
                let existing = self.state.lock().tracked.get(&reference.service_id()).cloned();
                if let Some((_, tracked_obj)) = existing {
                    self.customizer.modified(reference, &tracked_obj);
                    self.state
                        .lock()
                        .tracked
                        .insert(reference.service_id(), (reference.clone(), tracked_obj));
                    self.bump_and_invalidate();
                } else if let Some(obj) = self.customizer.adding(reference) {
                    self.state
                        .lock()
                        .tracked
                        .insert(reference.service_id(), (reference.clone(), obj));
                    self.bump_and_invalidate();
                }
            }
            ServiceEventKind::ModifiedEndmatch | ServiceEventKind::Unregistering => {
                let removed = self.state.lock().tracked.remove(&reference.service_id());
                if let Some((_, obj)) = removed {
                    self.customizer.removed(reference, &obj);
                    self.bump_and_invalidate();
                }
            }
        }
    }

    fn bump_and_invalidate(&self) {
        self.state.lock().cache_valid = false;
        self.tracking_count.fetch_add(1, Ordering::SeqCst);
        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_core::Properties;
    use serde_json::json;

    struct Counting;
    impl TrackerCustomizer<i32> for Counting {
        fn adding(&self, reference: &ServiceReference) -> Option<Arc<i32>> {
            reference.properties().get("value").and_then(|v| v.as_i64()).map(|v| Arc::new(v as i32))
        }
    }

    fn props(ranking: i64) -> Properties {
        Properties::from_pairs([
            ("service.ranking".to_string(), json!(ranking)),
            ("value".to_string(), json!(ranking)),
        ])
        .unwrap()
    }

    #[test]
    fn open_tracks_already_registered_matches() {
        let framework = Arc::new(Framework::new());
        framework.register("p", vec!["S".into()], 1i32, props(7)).unwrap();
        framework.register("p", vec!["S".into()], 2i32, props(1)).unwrap();

        let tracker = ServiceTracker::new(
            Arc::clone(&framework),
            Criterion::Class("S".into()),
            Arc::new(Counting),
        );
        tracker.open().unwrap();
        assert_eq!(tracker.size(), 2);
        assert!(tracker.tracking_count() >= 2);
    }

    #[test]
    fn highest_ranked_wins_ties_broken_by_lower_id() {
        let framework = Arc::new(Framework::new());
        let _low = framework.register("p", vec!["S".into()], 1i32, props(1)).unwrap();
        let _mid = framework.register("p", vec!["S".into()], 2i32, props(2)).unwrap();
        let first_seven = framework.register("p", vec!["S".into()], 3i32, props(7)).unwrap();

        let tracker = ServiceTracker::new(
            Arc::clone(&framework),
            Criterion::Class("S".into()),
            Arc::new(Counting),
        );
        tracker.open().unwrap();
        assert_eq!(tracker.get_reference().unwrap().service_id(), first_seven.service_id());

        framework.unregister(&first_seven).unwrap();
        let second_seven = framework.register("p", vec!["S".into()], 4i32, props(7)).unwrap();
        assert_eq!(tracker.get_reference().unwrap().service_id(), second_seven.service_id());
    }

    #[test]
    fn close_removes_everything_and_reports_negative_one() {
        let framework = Arc::new(Framework::new());
        framework.register("p", vec!["S".into()], 1i32, props(0)).unwrap();
        let tracker = ServiceTracker::new(
            Arc::clone(&framework),
            Criterion::Class("S".into()),
            Arc::new(Counting),
        );
        tracker.open().unwrap();
        tracker.close();
        assert_eq!(tracker.tracking_count(), -1);
        assert!(tracker.get_reference().is_err());
    }

    #[test]
    fn wait_for_service_returns_once_something_is_tracked() {
        let framework = Arc::new(Framework::new());
        let tracker = ServiceTracker::new(
            Arc::clone(&framework),
            Criterion::Class("S".into()),
            Arc::new(Counting),
        );
        tracker.open().unwrap();
        assert!(tracker.wait_for_service(Duration::from_millis(50)).is_none());
        framework.register("p", vec!["S".into()], 1i32, props(5)).unwrap();
        assert_eq!(tracker.wait_for_service(Duration::from_millis(50)).unwrap().as_ref(), &5);
    }
}
