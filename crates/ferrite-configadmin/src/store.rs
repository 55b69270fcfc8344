//! File-per-PID configuration persistence.
//!
//! Each record is serialized as its full dictionary (including the inline
//! `service.pid`/`service.factoryPid`/`service.pluginLocation` keys) under
//! `<base_dir>/store/<pid>.pid`. A file that fails to deserialize is
//! logged and deleted — not merely skipped — so a later run doesn't keep
//! retrying it.

use std::path::{Path, PathBuf};

use ferrite_core::Properties;
use tracing::warn;

use crate::configuration::Configuration;
use crate::error::{ConfigAdminError, ConfigAdminResult};

pub struct ConfigurationStore {
    dir: PathBuf,
}

impl ConfigurationStore {
    pub async fn open(base_dir: impl AsRef<Path>) -> ConfigAdminResult<Self> {
        let dir = base_dir.as_ref().join("store");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ConfigAdminError::io("<store>", e))?;
        Ok(ConfigurationStore { dir })
    }

    fn path_for(&self, pid: &str) -> PathBuf {
        self.dir.join(format!("{pid}.pid"))
    }

    pub async fn save(&self, configuration: &Configuration) -> ConfigAdminResult<()> {
        let props = configuration.all_properties()?;
        let map: serde_json::Map<String, serde_json::Value> = props.into();
        let body = serde_json::to_vec_pretty(&map).map_err(|e| {
            ConfigAdminError::io(configuration.pid(), std::io::Error::new(std::io::ErrorKind::Other, e))
        })?;
        tokio::fs::write(self.path_for(configuration.pid()), body)
            .await
            .map_err(|e| ConfigAdminError::io(configuration.pid(), e))
    }

    pub async fn delete(&self, pid: &str) -> ConfigAdminResult<()> {
        match tokio::fs::remove_file(self.path_for(pid)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConfigAdminError::io(pid, e)),
        }
    }

    /// Recovers every record under the store directory. A file that isn't
    /// valid JSON, or whose top-level shape isn't an object, is deleted and
    /// omitted from the result — satisfying "any configuration file that
    /// fails to deserialize at startup is removed from storage by the time
    /// initialization completes."
    pub async fn load_all(&self) -> ConfigAdminResult<Vec<Configuration>> {
        let mut configurations = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| ConfigAdminError::io("<store>", e))?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| ConfigAdminError::io("<store>", e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("pid") {
                continue;
            }
            let pid = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("<unknown>")
                .to_string();

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(%pid, error = %e, "failed to read configuration file, deleting");
                    let _ = tokio::fs::remove_file(&path).await;
                    continue;
                }
            };

            match serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&bytes) {
                Ok(map) => {
                    let properties = match Properties::from_pairs(map.into_iter()) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(%pid, error = %e, "corrupt configuration file, deleting");
                            let _ = tokio::fs::remove_file(&path).await;
                            continue;
                        }
                    };
                    let factory_pid = properties
                        .get("service.factoryPid")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    configurations.push(Configuration::from_stored(pid, factory_pid, properties));
                }
                Err(e) => {
                    warn!(%pid, error = %e, "corrupt configuration file, deleting");
                    let _ = tokio::fs::remove_file(&path).await;
                }
            }
        }
        Ok(configurations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigurationStore::open(dir.path()).await.unwrap();
        let config = Configuration::new("P", None, None);
        config
            .update(Properties::from_pairs([("k".to_string(), serde_json::json!("v"))]).unwrap())
            .unwrap();
        store.save(&config).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].pid(), "P");
        assert_eq!(loaded[0].properties().unwrap().get("k"), Some(&serde_json::json!("v")));
    }

    #[tokio::test]
    async fn corrupt_file_is_deleted_not_just_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigurationStore::open(dir.path()).await.unwrap();
        let bad_path = dir.path().join("store").join("BAD.pid");
        tokio::fs::write(&bad_path, b"not json").await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert!(loaded.is_empty());
        assert!(!bad_path.exists());
    }

    #[tokio::test]
    async fn delete_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigurationStore::open(dir.path()).await.unwrap();
        let config = Configuration::new("P", None, None);
        store.save(&config).await.unwrap();
        store.delete("P").await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }
}
