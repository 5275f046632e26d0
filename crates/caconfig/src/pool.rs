use caconfig_core::{describe, ConfigError, Result};
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use crate::ca_config::{CaConfig, LoadOptions};

/// Named registry of CA configurations. Read-only once built.
///
/// Entries keep the order they were supplied in; that order carries through
/// to [`iter`](Self::iter), [`all`](Self::all) and serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaConfigPool {
    configs: IndexMap<String, CaConfig>,
}

impl CaConfigPool {
    /// Pool over the given configs, stored as supplied
    #[must_use]
    pub const fn new(configs: IndexMap<String, CaConfig>) -> Self {
        Self { configs }
    }

    /// Config registered under `name`, if any
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CaConfig> {
        self.configs.get(name)
    }

    /// Every config, without names, in stored order
    #[must_use]
    pub fn all(&self) -> Vec<&CaConfig> {
        self.configs.values().collect()
    }

    /// Every registered name
    #[must_use]
    pub fn names(&self) -> BTreeSet<&str> {
        self.configs.keys().map(String::as_str).collect()
    }

    /// Number of registered CAs
    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Returns true if no CA is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// `(name, config)` pairs in stored order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CaConfig)> {
        self.configs.iter().map(|(name, config)| (name.as_str(), config))
    }

    /// Load every CA under `document[key]`, keeping document order.
    ///
    /// All entries share `options`; the first one that fails aborts the load.
    pub fn load(key: &str, document: &Value, options: &LoadOptions) -> Result<Self> {
        let entries = match document.get(key) {
            Some(Value::Mapping(entries)) => entries,
            Some(other) => {
                return Err(ConfigError::Argument(format!(
                    "'{key}' must be a mapping of CA name to configuration, got {}",
                    describe(other)
                )))
            }
            None => {
                return Err(ConfigError::Argument(format!(
                    "no CA configurations found under '{key}'"
                )))
            }
        };

        let mut configs = IndexMap::with_capacity(entries.len());
        for (name, entry) in entries {
            let name = name.as_str().ok_or_else(|| {
                ConfigError::Argument(format!("CA names must be strings, got {}", describe(name)))
            })?;
            debug!(ca = name, "loading pool entry");
            configs.insert(name.to_string(), CaConfig::load_from_value(entry, options)?);
        }

        info!(key, count = configs.len(), "loaded CA pool");
        Ok(Self::new(configs))
    }

    /// Parse YAML text and load every CA under `key`.
    pub fn from_yaml(key: &str, yaml: &str, options: &LoadOptions) -> Result<Self> {
        let document: Value = serde_yaml::from_str(yaml)?;
        Self::load(key, &document, options)
    }

    /// Read a YAML file and load every CA under `key`.
    pub fn load_yaml(key: &str, path: impl AsRef<Path>, options: &LoadOptions) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::from_yaml(key, &yaml, options)
    }

    /// Name to [`CaConfig::serialize`] output, in stored order
    pub fn serialize(&self) -> Result<Value> {
        let mut doc = Mapping::new();
        for (name, config) in &self.configs {
            doc.insert(name.as_str().into(), config.serialize()?);
        }
        Ok(Value::Mapping(doc))
    }

    /// [`serialize`](Self::serialize) rendered as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.serialize()?)?)
    }
}

impl FromIterator<(String, CaConfig)> for CaConfigPool {
    fn from_iter<I: IntoIterator<Item = (String, CaConfig)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
