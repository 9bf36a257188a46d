//! Compiler configuration.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cosmetic::SelectorLimits;

/// Rule ids reserved per list and pass.
pub const PASS_ID_RANGE: u32 = 1_000_000;

/// Highest namespace whose id range still fits in a `u32`.
pub const MAX_NAMESPACE: u16 = 2146;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("validation: {0}")]
    Validation(String),
}

/// One remote filter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSpec {
    pub name: String,
    pub url: String,
    /// Selects the disjoint id range the list's rules are numbered from
    pub namespace: u16,
}

impl ListSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>, namespace: u16) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            namespace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub lists: Vec<ListSpec>,
    pub max_rules_per_list: usize,
    pub max_total_rules: usize,
    pub max_url_filter_len: usize,
    pub min_selector_len: usize,
    pub max_selector_len: usize,
    pub css_chunk_size: usize,
    pub cache_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            lists: vec![
                ListSpec::new("easylist", "https://easylist.to/easylist/easylist.txt", 0),
                ListSpec::new(
                    "fanboy-annoyance",
                    "https://easylist.to/easylist/fanboy-annoyance.txt",
                    1,
                ),
            ],
            max_rules_per_list: 25_000,
            max_total_rules: 30_000,
            max_url_filter_len: 2048,
            min_selector_len: 2,
            max_selector_len: 500,
            css_chunk_size: 100,
            cache_ttl_secs: 7 * 24 * 60 * 60,
            fetch_timeout_secs: 30,
        }
    }
}

impl CompilerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rules_per_list as u64 > PASS_ID_RANGE as u64 {
            return Err(ConfigError::Validation(format!(
                "max_rules_per_list must be <= {PASS_ID_RANGE}"
            )));
        }
        if self.css_chunk_size == 0 {
            return Err(ConfigError::Validation("css_chunk_size must be > 0".into()));
        }
        if self.min_selector_len > self.max_selector_len {
            return Err(ConfigError::Validation(
                "min_selector_len cannot be greater than max_selector_len".into(),
            ));
        }
        if self.max_url_filter_len == 0 {
            return Err(ConfigError::Validation("max_url_filter_len must be > 0".into()));
        }

        let mut namespaces = HashSet::new();
        for list in &self.lists {
            if list.namespace > MAX_NAMESPACE {
                return Err(ConfigError::Validation(format!(
                    "list '{}': namespace must be <= {MAX_NAMESPACE}",
                    list.name
                )));
            }
            if !namespaces.insert(list.namespace) {
                return Err(ConfigError::Validation(format!(
                    "list '{}' reuses namespace {}",
                    list.name, list.namespace
                )));
            }
        }

        Ok(())
    }

    pub fn selector_limits(&self) -> SelectorLimits {
        SelectorLimits {
            min_len: self.min_selector_len,
            max_len: self.max_selector_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = CompilerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lists.len(), 2);
        assert_eq!(config.cache_ttl_secs, 604_800);
    }

    #[test]
    fn test_rejects_duplicate_namespace() {
        let mut config = CompilerConfig::default();
        config.lists[1].namespace = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let mut config = CompilerConfig {
            max_rules_per_list: 1_000_001,
            ..CompilerConfig::default()
        };
        assert!(config.validate().is_err());

        config.max_rules_per_list = 10;
        config.css_chunk_size = 0;
        assert!(config.validate().is_err());

        config.css_chunk_size = 100;
        config.min_selector_len = 600;
        assert!(config.validate().is_err());

        config.min_selector_len = 2;
        config.lists[0].namespace = MAX_NAMESPACE + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_total_rules": 5000, "lists": [{{"name": "local", "url": "https://x.test/l.txt", "namespace": 3}}]}}"#).unwrap();

        let config = CompilerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_total_rules, 5000);
        assert_eq!(config.max_rules_per_list, 25_000);
        assert_eq!(config.lists, vec![ListSpec::new("local", "https://x.test/l.txt", 3)]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = CompilerConfig::from_json_file("/nonexistent/ep.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
