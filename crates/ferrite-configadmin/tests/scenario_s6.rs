//! End-to-end scenario S6 from spec.md §8: configuration delivery
//! lifecycle exercised through the public facade and managed-service
//! binding surface, not the crate's internal test module.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ferrite_configadmin::{ConfigAdminError, ConfigurationAdmin, ManagedService, ManagedServiceFactory};
use ferrite_core::Properties;
use parking_lot::Mutex;
use serde_json::json;

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

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn s6_singleton_configuration_delivers_exactly_once_per_transition() {
    let dir = tempfile::tempdir().unwrap();
    let admin = ConfigurationAdmin::open(dir.path()).await.unwrap();
    let facade = admin.facade("demo.plugin");

    let calls = Arc::new(Mutex::new(Vec::new()));
    let service = Arc::new(Recording { calls: Arc::clone(&calls) });
    admin.bind_managed_service("demo.pid", "demo.plugin", service);

    facade
        .update("demo.pid", Properties::from_pairs([("k".to_string(), json!("v"))]).unwrap())
        .await
        .unwrap();
    settle().await;
    assert_eq!(calls.lock().len(), 1);
    assert_eq!(calls.lock()[0].as_ref().unwrap().get("k"), Some(&json!("v")));
    assert_eq!(calls.lock()[0].as_ref().unwrap().get("service.pid"), Some(&json!("demo.pid")));

    facade
        .update("demo.pid", Properties::from_pairs([("k".to_string(), json!("w"))]).unwrap())
        .await
        .unwrap();
    settle().await;
    assert_eq!(calls.lock().len(), 2);
    assert_eq!(calls.lock()[1].as_ref().unwrap().get("k"), Some(&json!("w")));

    facade.delete("demo.pid").await.unwrap();
    settle().await;
    assert_eq!(calls.lock().len(), 3);
    assert!(calls.lock()[2].is_none());
}

struct RecordingFactory {
    calls: Arc<Mutex<Vec<(String, Option<Properties>)>>>,
}

#[async_trait]
impl ManagedServiceFactory for RecordingFactory {
    async fn updated(&self, pid: &str, properties: Option<Properties>) -> Result<(), ConfigAdminError> {
        self.calls.lock().push((pid.to_string(), properties));
        Ok(())
    }

    async fn deleted(&self, pid: &str) {
        self.calls.lock().push((pid.to_string(), None));
    }
}

#[tokio::test]
async fn s6_factory_configuration_instances_each_deliver_independently() {
    let dir = tempfile::tempdir().unwrap();
    let admin = ConfigurationAdmin::open(dir.path()).await.unwrap();
    let facade = admin.facade("demo.plugin");

    let calls = Arc::new(Mutex::new(Vec::new()));
    let factory = Arc::new(RecordingFactory { calls: Arc::clone(&calls) });
    admin.bind_managed_service_factory("demo.factory", "demo.plugin", factory);

    let first = facade.create_factory_configuration("demo.factory", None);
    let second = facade.create_factory_configuration("demo.factory", None);
    assert_ne!(first.pid(), second.pid());

    facade
        .update(first.pid(), Properties::from_pairs([("n".to_string(), json!(1))]).unwrap())
        .await
        .unwrap();
    facade
        .update(second.pid(), Properties::from_pairs([("n".to_string(), json!(2))]).unwrap())
        .await
        .unwrap();
    settle().await;

    let delivered = calls.lock().clone();
    assert_eq!(delivered.len(), 2);
    assert!(delivered.iter().any(|(pid, props)| pid == first.pid() && props.as_ref().unwrap().get("n") == Some(&json!(1))));
    assert!(delivered.iter().any(|(pid, props)| pid == second.pid() && props.as_ref().unwrap().get("n") == Some(&json!(2))));
}
