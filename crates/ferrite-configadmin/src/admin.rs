//! The Configuration Administration service: persistent records, binding
//! to the plugin that owns a managed service, and ordered asynchronous
//! delivery.
//!
//! Managed services are attached to this service directly — through
//! [`ConfigurationAdmin::bind_managed_service`]/
//! [`ConfigurationAdmin::bind_managed_service_factory`] — rather than
//! discovered implicitly through a registry tracker. A layer that already
//! tracks managed-service registrations in `ferrite_registry` (by
//! `service.pid`) is expected to call these on `adding`/`removed`; keeping
//! the binding surface explicit here avoids threading the registry's
//! generic tracker through a trait-object service type.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use ferrite_core::{Filter, Properties};
use parking_lot::Mutex;
use tracing::error;

use crate::configuration::Configuration;
use crate::error::{ConfigAdminError, ConfigAdminResult};
use crate::delivery::DeliveryQueues;
use crate::managed_service::{ManagedService, ManagedServiceFactory};
use crate::plugin::{ConfigurationPlugin, ConfigurationPluginChain};
use crate::store::ConfigurationStore;

const EVENTS_QUEUE_KEY: &str = "\0events";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAdminEventKind {
    Updated,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct ConfigAdminEvent {
    pub kind: ConfigAdminEventKind,
    pub pid: String,
    pub factory_pid: Option<String>,
}

#[async_trait]
pub trait ConfigurationListener: Send + Sync {
    async fn configuration_event(&self, event: &ConfigAdminEvent);
}

struct ManagedServiceBinding {
    location: String,
    service: Arc<dyn ManagedService>,
}

struct FactoryBinding {
    location: String,
    factory: Arc<dyn ManagedServiceFactory>,
}

pub struct ConfigurationAdmin {
    store: Arc<ConfigurationStore>,
    configurations: Mutex<HashMap<String, Arc<Configuration>>>,
    plugin_chain: Mutex<ConfigurationPluginChain>,
    listeners: Mutex<Vec<Arc<dyn ConfigurationListener>>>,
    delivery: Arc<DeliveryQueues>,
    managed_services: Mutex<HashMap<String, ManagedServiceBinding>>,
    managed_factories: Mutex<HashMap<String, FactoryBinding>>,
    next_instance: AtomicU64,
}

impl ConfigurationAdmin {
    pub async fn open(base_dir: impl AsRef<std::path::Path>) -> ConfigAdminResult<Arc<Self>> {
        let store = Arc::new(ConfigurationStore::open(base_dir).await?);
        let recovered = store.load_all().await?;
        let mut configurations = HashMap::new();
        for config in recovered {
            configurations.insert(config.pid().to_string(), Arc::new(config));
        }
        Ok(Arc::new(ConfigurationAdmin {
            store,
            configurations: Mutex::new(configurations),
            plugin_chain: Mutex::new(ConfigurationPluginChain::new()),
            listeners: Mutex::new(Vec::new()),
            delivery: DeliveryQueues::new(),
            managed_services: Mutex::new(HashMap::new()),
            managed_factories: Mutex::new(HashMap::new()),
            next_instance: AtomicU64::new(0),
        }))
    }

    pub fn add_configuration_listener(&self, listener: Arc<dyn ConfigurationListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn register_configuration_plugin(&self, ranking: i64, targets: Option<Vec<String>>, plugin: Arc<dyn ConfigurationPlugin>) {
        self.plugin_chain.lock().register(ranking, targets, plugin);
    }

    /// Attaches the managed service owning `pid`, at `location`, and
    /// delivers the current configuration immediately if one exists.
    pub fn bind_managed_service(&self, pid: &str, location: &str, service: Arc<dyn ManagedService>) {
        self.managed_services.lock().insert(
            pid.to_string(),
            ManagedServiceBinding {
                location: location.to_string(),
                service,
            },
        );
        self.deliver_singleton(pid);
    }

    pub fn unbind_managed_service(&self, pid: &str) {
        self.managed_services.lock().remove(pid);
    }

    pub fn bind_managed_service_factory(&self, factory_pid: &str, location: &str, factory: Arc<dyn ManagedServiceFactory>) {
        self.managed_factories.lock().insert(
            factory_pid.to_string(),
            FactoryBinding {
                location: location.to_string(),
                factory,
            },
        );
        let instances: Vec<String> = {
            let configs = self.configurations.lock();
            configs
                .values()
                .filter(|c| c.factory_pid() == Some(factory_pid))
                .map(|c| c.pid().to_string())
                .collect()
        };
        for pid in instances {
            self.deliver_factory(factory_pid, &pid);
        }
    }

    pub fn unbind_managed_service_factory(&self, factory_pid: &str) {
        self.managed_factories.lock().remove(factory_pid);
    }

    fn facade_get_or_create(&self, pid: &str, factory_pid: Option<String>, declared_location: Option<String>) -> Arc<Configuration> {
        let mut configs = self.configurations.lock();
        Arc::clone(
            configs
                .entry(pid.to_string())
                .or_insert_with(|| Arc::new(Configuration::new(pid.to_string(), factory_pid, declared_location))),
        )
    }

    /// Per-plugin entry point, imprinting `requester`'s identity on every
    /// call per the service-factory semantics.
    pub fn facade(self: &Arc<Self>, requester: impl Into<String>) -> ConfigurationAdminFacade {
        ConfigurationAdminFacade {
            admin: Arc::clone(self),
            requester: requester.into(),
        }
    }

    /// Applies `properties` to `pid` (creating a singleton record if none
    /// exists), persists, applies configuration plugins, and enqueues
    /// delivery plus a `CM_UPDATED` event.
    pub async fn update_configuration(&self, pid: &str, properties: Properties) -> ConfigAdminResult<()> {
        let config = self.facade_get_or_create(pid, None, None);
        config.update(properties)?;
        self.store.save(&config).await?;
        if let Some(factory_pid) = config.factory_pid().map(str::to_string) {
            self.deliver_factory(&factory_pid, pid);
        } else {
            self.deliver_singleton(pid);
        }
        self.emit_event(ConfigAdminEventKind::Updated, pid.to_string(), config.factory_pid().map(str::to_string));
        Ok(())
    }

    /// Deletes `pid`: marks the record, persists removal, notifies the
    /// bound managed service with `None`, and emits `CM_DELETED`.
    pub async fn delete_configuration(&self, pid: &str) -> ConfigAdminResult<()> {
        let config = {
            let mut configs = self.configurations.lock();
            configs.remove(pid)
        };
        let Some(config) = config else {
            return Ok(());
        };
        let factory_pid = config.factory_pid().map(str::to_string);
        config.delete()?;
        self.store.delete(pid).await?;

        if let Some(binding) = self.managed_services.lock().get(pid) {
            let service = Arc::clone(&binding.service);
            self.delivery.enqueue(
                pid,
                Box::pin({
                    let pid = pid.to_string();
                    async move {
                        if let Err(e) = service.updated(None).await {
                            error!(%pid, error = %e, "managed service rejected deletion notice");
                        }
                    }
                }),
            );
        }
        if let Some(fpid) = &factory_pid {
            if let Some(binding) = self.managed_factories.lock().get(fpid) {
                let factory = Arc::clone(&binding.factory);
                let pid_owned = pid.to_string();
                self.delivery.enqueue(pid, Box::pin(async move { factory.deleted(&pid_owned).await }));
            }
        }

        self.emit_event(ConfigAdminEventKind::Deleted, pid.to_string(), factory_pid);
        Ok(())
    }

    fn deliver_singleton(&self, pid: &str) {
        let config = { self.configurations.lock().get(pid).cloned() };
        let Some(config) = config else { return };
        if config.is_deleted() {
            return;
        }
        let location = { self.managed_services.lock().get(pid).map(|b| b.location.clone()) };
        let Some(location) = location else { return };
        if !config.bind(&location) {
            return;
        }
        let Ok(properties) = config.properties() else { return };
        let applied = self.plugin_chain.lock().apply(pid, properties);
        let service = { self.managed_services.lock().get(pid).map(|b| Arc::clone(&b.service)) };
        let Some(service) = service else { return };
        let pid_owned = pid.to_string();
        self.delivery.enqueue(
            pid,
            Box::pin(async move {
                if let Err(e) = service.updated(Some(applied)).await {
                    error!(pid = %pid_owned, error = %e, "managed service rejected configuration");
                }
            }),
        );
    }

    fn deliver_factory(&self, factory_pid: &str, pid: &str) {
        let config = { self.configurations.lock().get(pid).cloned() };
        let Some(config) = config else { return };
        if config.is_deleted() {
            return;
        }
        let location = { self.managed_factories.lock().get(factory_pid).map(|b| b.location.clone()) };
        let Some(location) = location else { return };
        if !config.bind(&location) {
            return;
        }
        let Ok(properties) = config.properties() else { return };
        let applied = self.plugin_chain.lock().apply(pid, properties);
        let factory = { self.managed_factories.lock().get(factory_pid).map(|b| Arc::clone(&b.factory)) };
        let Some(factory) = factory else { return };
        let pid_owned = pid.to_string();
        self.delivery.enqueue(
            pid,
            Box::pin(async move {
                if let Err(e) = factory.updated(&pid_owned, Some(applied)).await {
                    error!(pid = %pid_owned, error = %e, "managed service factory rejected configuration");
                }
            }),
        );
    }

    fn emit_event(&self, kind: ConfigAdminEventKind, pid: String, factory_pid: Option<String>) {
        let listeners = self.listeners.lock().clone();
        self.delivery.enqueue(
            EVENTS_QUEUE_KEY,
            Box::pin(async move {
                let event = ConfigAdminEvent { kind, pid, factory_pid };
                for listener in listeners {
                    listener.configuration_event(&event).await;
                }
            }),
        );
    }

    pub fn close_delivery(&self) {
        self.delivery.close_all();
    }
}

/// Per-plugin façade returned by [`ConfigurationAdmin::facade`].
pub struct ConfigurationAdminFacade {
    admin: Arc<ConfigurationAdmin>,
    requester: String,
}

impl ConfigurationAdminFacade {
    /// Binds the record to the requester's location on first touch.
    pub fn get_configuration(&self, pid: &str) -> ConfigAdminResult<Arc<Configuration>> {
        let config = self.admin.facade_get_or_create(pid, None, None);
        config.bind(&self.requester);
        Ok(config)
    }

    /// Privileged variant: requires the caller to already be trusted with
    /// `location`. Does not bind.
    pub fn get_configuration_at(&self, pid: &str, location: &str) -> ConfigAdminResult<Arc<Configuration>> {
        Ok(self.admin.facade_get_or_create(pid, None, Some(location.to_string())))
    }

    pub fn create_factory_configuration(&self, factory_pid: &str, location: Option<&str>) -> Arc<Configuration> {
        let counter = self.admin.next_instance.fetch_add(1, Ordering::SeqCst);
        let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        let pid = format!("{factory_pid}-{millis}-{counter}");
        self.admin.facade_get_or_create(
            &pid,
            Some(factory_pid.to_string()),
            location.map(str::to_string).or_else(|| Some(self.requester.clone())),
        )
    }

    /// Filters over every known record. Without an explicit location
    /// check, an implicit `service.pluginLocation = <requester>` clause is
    /// appended.
    pub fn list_configurations(&self, filter: Option<&Filter>) -> ConfigAdminResult<Vec<Arc<Configuration>>> {
        let requester_filter = Filter::parse(&format!("(service.pluginLocation={})", self.requester))?;
        let configs = self.admin.configurations.lock();
        let mut result = Vec::new();
        for config in configs.values() {
            if config.is_deleted() {
                continue;
            }
            let all_props = match config.all_properties() {
                Ok(p) => p,
                Err(_) => continue,
            };
            if !requester_filter.matches(&all_props, false) {
                continue;
            }
            if let Some(filter) = filter {
                if !filter.matches(&all_props, false) {
                    continue;
                }
            }
            result.push(Arc::clone(config));
        }
        Ok(result)
    }

    pub async fn update(&self, pid: &str, properties: Properties) -> ConfigAdminResult<()> {
        self.admin.update_configuration(pid, properties).await
    }

    pub async fn delete(&self, pid: &str) -> ConfigAdminResult<()> {
        self.admin.delete_configuration(pid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct Recording {
        calls: Arc<Mutex<Vec<Option<Properties>>>>,
    }

    #[async_trait]
    impl ManagedService for Recording {
        async fn updated(&self, properties: Option<Properties>) -> Result<(), ConfigAdminError> {
            self.calls.lock().push(properties);
            Ok(())
        }
    }

    #[tokio::test]
    async fn s6_config_delivery_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let admin = ConfigurationAdmin::open(dir.path()).await.unwrap();
        let facade = admin.facade("test.plugin");
        facade
            .update("P", Properties::from_pairs([("k".to_string(), json!("v"))]).unwrap())
            .await
            .unwrap();

        let calls = Arc::new(Mutex::new(Vec::new()));
        let service = Arc::new(Recording { calls: Arc::clone(&calls) });
        admin.bind_managed_service("P", "test.plugin", service);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(calls.lock()[0].as_ref().unwrap().get("k"), Some(&json!("v")));

        facade
            .update("P", Properties::from_pairs([("k".to_string(), json!("w"))]).unwrap())
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(calls.lock().len(), 2);
        assert_eq!(calls.lock()[1].as_ref().unwrap().get("k"), Some(&json!("w")));

        facade.delete("P").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(calls.lock().len(), 3);
        assert!(calls.lock()[2].is_none());
    }

    #[tokio::test]
    async fn list_configurations_implicitly_scopes_to_requester() {
        let dir = tempfile::tempdir().unwrap();
        let admin = ConfigurationAdmin::open(dir.path()).await.unwrap();
        admin.facade("owner.a").update("P1", Properties::new()).await.unwrap();
        admin.facade("owner.b").update("P2", Properties::new()).await.unwrap();

        let seen_by_a = admin.facade("owner.a").list_configurations(None).unwrap();
        assert_eq!(seen_by_a.len(), 1);
        assert_eq!(seen_by_a[0].pid(), "P1");
    }

    #[tokio::test]
    async fn configuration_plugins_modify_dictionary_before_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let admin = ConfigurationAdmin::open(dir.path()).await.unwrap();
        struct AddMarker;
        impl ConfigurationPlugin for AddMarker {
            fn modify(&self, _pid: &str, props: Properties) -> Properties {
                props.with("marked", json!(true))
            }
        }
        admin.register_configuration_plugin(0, None, Arc::new(AddMarker));

        let calls = Arc::new(Mutex::new(Vec::new()));
        let service = Arc::new(Recording { calls: Arc::clone(&calls) });
        admin.bind_managed_service("P", "owner", service);
        admin.facade("owner").update("P", Properties::new()).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(calls.lock()[0].as_ref().unwrap().get("marked"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn corrupt_store_entries_are_gone_after_open() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("store")).await.unwrap();
        tokio::fs::write(dir.path().join("store").join("BAD.pid"), b"{not json")
            .await
            .unwrap();
        let _admin = ConfigurationAdmin::open(dir.path()).await.unwrap();
        assert!(!dir.path().join("store").join("BAD.pid").exists());
    }

    #[test]
    fn event_kind_distinguishes_updated_and_deleted() {
        let _unused = AtomicUsize::new(0);
        assert_ne!(ConfigAdminEventKind::Updated, ConfigAdminEventKind::Deleted);
    }
}
