//! Service listener registration and filtered dispatch routing.
//!
//! Each listener's filter is classified once, at registration time, using
//! the object-class extraction in `ferrite_core::filter`: a filter that
//! reduces to a finite `objectclass` set is indexed into per-class
//! buckets so dispatch can skip straight to the listeners that could
//! possibly match; everything else (including "no filter") falls into a
//! fallback list evaluated on every dispatch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ferrite_core::{Filter, ServiceEvent};

use crate::registration::ServiceReference;

/// A registered service-event callback. Matches what the registry keeps
/// alive for the life of the subscription.
pub type ListenerCallback = Arc<dyn Fn(&ServiceEvent, &ServiceReference) + Send + Sync>;

pub(crate) struct ListenerEntry {
    pub id: u64,
    pub filter: Option<Filter>,
    pub queued: bool,
    pub callback: ListenerCallback,
}

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// The registry's listener table for service events: per-`objectClass`
/// buckets plus a fallback list for anything not reducible to one.
#[derive(Default)]
pub(crate) struct ListenerTable {
    buckets: HashMap<String, Vec<Arc<ListenerEntry>>>,
    fallback: Vec<Arc<ListenerEntry>>,
    /// Every bucket (`Some(class)`) or the fallback list (`None`) an entry
    /// was filed under, so `remove` can retract it from all of them — a
    /// filter like `(|(objectClass=Foo)(objectClass=Bar))` files into both
    /// `Foo` and `Bar`.
    by_id: HashMap<u64, Vec<Option<String>>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener, returning its id for later removal.
    pub fn add(&mut self, filter: Option<Filter>, queued: bool, callback: ListenerCallback) -> u64 {
        let id = NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(ListenerEntry {
            id,
            filter: filter.clone(),
            queued,
            callback,
        });

        let classes = filter.as_ref().and_then(|f| f.matched_object_classes());
        match classes {
            Some(classes) if !classes.is_empty() => {
                let mut filed_under = Vec::with_capacity(classes.len());
                for class in classes {
                    self.buckets.entry(class.clone()).or_default().push(Arc::clone(&entry));
                    filed_under.push(Some(class));
                }
                self.by_id.insert(id, filed_under);
            }
            _ => {
                self.fallback.push(Arc::clone(&entry));
                self.by_id.insert(id, vec![None]);
            }
        }
        id
    }

    pub fn remove(&mut self, id: u64) {
        if let Some(filed_under) = self.by_id.remove(&id) {
            for class in filed_under {
                match class {
                    Some(class) => {
                        if let Some(bucket) = self.buckets.get_mut(&class) {
                            bucket.retain(|e| e.id != id);
                        }
                    }
                    None => self.fallback.retain(|e| e.id != id),
                }
            }
        }
    }

    /// Every listener entry whose filter could possibly match a reference
    /// publishing `classes`: the union of the relevant buckets plus the
    /// fallback list. Filter evaluation against the reference's actual
    /// properties happens in the caller.
    pub fn candidates(&self, classes: &[String]) -> Vec<Arc<ListenerEntry>> {
        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::new();
        for class in classes {
            if let Some(bucket) = self.buckets.get(class) {
                for entry in bucket {
                    if seen.insert(entry.id) {
                        result.push(Arc::clone(entry));
                    }
                }
            }
        }
        for entry in &self.fallback {
            if seen.insert(entry.id) {
                result.push(Arc::clone(entry));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_core::{Properties, ServiceEventKind};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn make_reference(id: u64, classes: &[&str]) -> ServiceReference {
        let props = Properties::from_pairs([
            ("service.id".to_string(), json!(id)),
            (
                "objectclass".to_string(),
                json!(classes.iter().map(|c| c.to_string()).collect::<Vec<_>>()),
            ),
        ])
        .unwrap();
        let registration = crate::registration::Registration::new(id, "owner".into(), props, Arc::new(()));
        ServiceReference::new(registration)
    }

    #[test]
    fn classified_filter_only_reaches_matching_bucket() {
        let mut table = ListenerTable::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        table.add(
            Some(Filter::parse("(objectClass=Foo)").unwrap()),
            false,
            Arc::new(move |_event, _ref| {
                hits_clone.fetch_add(1, Ordering::Relaxed);
            }),
        );

        let foo_ref = make_reference(1, &["Foo"]);
        let bar_ref = make_reference(2, &["Bar"]);

        assert_eq!(table.candidates(&foo_ref.classes()).len(), 1);
        assert_eq!(table.candidates(&bar_ref.classes()).len(), 0);
    }

    #[test]
    fn no_filter_listener_is_universal() {
        let mut table = ListenerTable::new();
        table.add(None, false, Arc::new(|_e: &ServiceEvent, _r| {}));
        let class_a = make_reference(1, &["A"]);
        let class_b = make_reference(2, &["B"]);
        assert_eq!(table.candidates(&class_a.classes()).len(), 1);
        assert_eq!(table.candidates(&class_b.classes()).len(), 1);
    }

    #[test]
    fn remove_drops_from_its_bucket() {
        let mut table = ListenerTable::new();
        let id = table.add(
            Some(Filter::parse("(objectClass=Foo)").unwrap()),
            false,
            Arc::new(|_e: &ServiceEvent, _r| {}),
        );
        table.remove(id);
        let foo_ref = make_reference(1, &["Foo"]);
        assert_eq!(table.candidates(&foo_ref.classes()).len(), 0);
    }

    #[test]
    fn remove_drops_from_every_bucket_it_was_filed_under() {
        let mut table = ListenerTable::new();
        let id = table.add(
            Some(Filter::parse("(|(objectClass=Foo)(objectClass=Bar))").unwrap()),
            false,
            Arc::new(|_e: &ServiceEvent, _r| {}),
        );
        table.remove(id);

        let foo_ref = make_reference(1, &["Foo"]);
        let bar_ref = make_reference(2, &["Bar"]);
        assert_eq!(table.candidates(&foo_ref.classes()).len(), 0);
        assert_eq!(table.candidates(&bar_ref.classes()).len(), 0);
    }

    #[test]
    fn kind_is_carried_through_event() {
        let event = ServiceEvent::new(ServiceEventKind::Registered, 1, Properties::new());
        assert_eq!(event.kind, ServiceEventKind::Registered);
    }
}
