//! Loads [`FrameworkSettings`] from a YAML file plus `FERRITE_`-prefixed
//! environment overrides, the way the teacher's `alloy-runtime` loads
//! `alloy.yaml` through `figment`.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::Env;
use tracing::{debug, info};

use super::error::ConfigResult;
use super::schema::FrameworkSettings;
use super::validation::validate_settings;

const ENV_PREFIX: &str = "FERRITE_";
const FILE_NAMES: &[&str] = &["ferrite.yaml", "ferrite.yml", ".ferrite.yaml"];

/// Locates and loads framework settings, falling back to defaults plus
/// environment overrides when no file is found.
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { search_paths: Vec::new() }
    }

    pub fn add_search_path(mut self, path: impl AsRef<Path>) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.add_search_path(cwd),
            Err(_) => self,
        }
    }

    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.add_search_path(dir.join("ferrite")),
            None => self,
        }
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        for search_path in &self.search_paths {
            for name in FILE_NAMES {
                let path = search_path.join(name);
                if path.exists() {
                    info!(path = %path.display(), "found framework settings file");
                    return Some(path);
                }
            }
        }
        None
    }

    /// Loads settings from the first discovered file (if any) plus
    /// environment overrides, validating the result.
    pub fn load(&self) -> ConfigResult<FrameworkSettings> {
        let figment = Figment::from(figment::providers::Serialized::defaults(FrameworkSettings::default()));
        let figment = match self.find_config_file() {
            Some(path) => self.merge_file(figment, &path),
            None => {
                debug!("no framework settings file found, using defaults plus environment overrides");
                figment
            }
        };
        let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("_"));
        let settings: FrameworkSettings = figment.extract()?;
        validate_settings(&settings)?;
        Ok(settings)
    }

    pub fn load_from_file(&self, path: impl AsRef<Path>) -> ConfigResult<FrameworkSettings> {
        let figment = Figment::from(figment::providers::Serialized::defaults(FrameworkSettings::default()));
        let figment = self.merge_file(figment, path.as_ref());
        let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("_"));
        let settings: FrameworkSettings = figment.extract()?;
        validate_settings(&settings)?;
        Ok(settings)
    }

    #[cfg(feature = "yaml-config")]
    fn merge_file(&self, figment: Figment, path: &Path) -> Figment {
        figment.merge(figment::providers::Yaml::file(path))
    }

    #[cfg(not(feature = "yaml-config"))]
    fn merge_file(&self, figment: Figment, _path: &Path) -> Figment {
        figment
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new().with_current_dir().with_user_config_dir()
    }
}

/// Convenience function mirroring `ConfigLoader::default().load()`.
pub fn load_settings() -> ConfigResult<FrameworkSettings> {
    ConfigLoader::default().load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file() {
        let loader = ConfigLoader::new();
        let settings = loader.load().unwrap();
        assert_eq!(settings.shutdown_timeout_secs, 5);
    }

    #[cfg(feature = "yaml-config")]
    #[test]
    fn loads_overrides_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferrite.yaml");
        std::fs::write(&path, "shutdown_timeout_secs: 30\n").unwrap();
        let settings = ConfigLoader::new().load_from_file(&path).unwrap();
        assert_eq!(settings.shutdown_timeout_secs, 30);
    }
}
