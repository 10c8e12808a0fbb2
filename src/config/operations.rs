//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::error::{JobsError, Result};
use crate::store::is_safe_key;
use std::collections::HashSet;
use std::path::Path;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            JobsError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load config if the file exists, otherwise use defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| JobsError::UserError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| JobsError::UserError(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `lock_lease_minutes`, `reaper_interval_secs` and `max_batch_size` must be positive
    /// - every resource class name must be a safe record key
    /// - no two job kinds may share a resource class
    pub fn validate(&self) -> Result<()> {
        if self.lock_lease_minutes == 0 {
            return Err(JobsError::UserError(
                "config validation failed: lock_lease_minutes must be greater than 0".to_string(),
            ));
        }

        if self.reaper_interval_secs == 0 {
            return Err(JobsError::UserError(
                "config validation failed: reaper_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.max_batch_size == 0 {
            return Err(JobsError::UserError(
                "config validation failed: max_batch_size must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (kind, resource) in self.resource_classes.entries() {
            if !is_safe_key(resource) {
                return Err(JobsError::UserError(format!(
                    "config validation failed: resource_classes.{} '{}' must be non-empty and use only letters, digits, '.', '_' or '-'",
                    kind, resource
                )));
            }
            if !seen.insert(resource) {
                return Err(JobsError::UserError(format!(
                    "config validation failed: resource_classes.{} reuses '{}', which another job kind already locks on",
                    kind, resource
                )));
            }
        }

        Ok(())
    }

    /// Lease length as a chrono duration.
    pub fn lease_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.lock_lease_minutes))
    }

    /// Reaper interval as a std duration.
    pub fn reaper_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reaper_interval_secs)
    }
}
