//! Validation pass over loaded [`FrameworkSettings`].

use super::error::{ConfigError, ConfigResult};
use super::schema::FrameworkSettings;

pub fn validate_settings(settings: &FrameworkSettings) -> ConfigResult<()> {
    if settings.shutdown_timeout_secs == 0 {
        return Err(ConfigError::validation("shutdown_timeout_secs must be greater than 0"));
    }
    if let Some(dir) = &settings.data_dir {
        if dir.as_os_str().is_empty() {
            return Err(ConfigError::validation("data_dir must not be an empty path"));
        }
    }
    Ok(())
}
