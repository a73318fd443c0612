//! Hierarchy provider configuration
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration:
//!
//! ```yaml
//! query_concurrency: 4
//! cache_size: 50
//! localized_strings:
//!   other: "Other"
//!   unspecified: "N/A"
//! ```

use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};

/// Default number of queries allowed to execute at the same time
pub const DEFAULT_QUERY_CONCURRENCY: usize = 10;

/// Default number of hierarchy levels kept in the level-result cache
pub const DEFAULT_CACHE_SIZE: usize = 1;

/// Default minimum number of same-label nodes for threshold label grouping
pub const DEFAULT_LABEL_GROUPING_THRESHOLD: usize = 2;

/// Labels of the synthetic property grouping buckets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizedStrings {
    /// Label of the "values outside of every range" grouping node
    pub other: String,
    /// Label of the "value not set" grouping node
    pub unspecified: String,
}

impl Default for LocalizedStrings {
    fn default() -> Self {
        Self {
            other: "Other".to_string(),
            unspecified: "Not specified".to_string(),
        }
    }
}

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyProviderConfig {
    /// Max number of queries executing against the data source at once
    pub query_concurrency: usize,

    /// Max number of cached hierarchy levels; `0` disables caching
    pub cache_size: usize,

    pub localized_strings: LocalizedStrings,

    /// Minimum group size for label grouping marked `only_if_shared`
    pub label_grouping_threshold: usize,

    /// Identity of the data source, stamped on produced node keys so merged
    /// providers can route child requests back to their owner
    pub source_key: Option<String>,
}

impl Default for HierarchyProviderConfig {
    fn default() -> Self {
        Self {
            query_concurrency: DEFAULT_QUERY_CONCURRENCY,
            cache_size: DEFAULT_CACHE_SIZE,
            localized_strings: LocalizedStrings::default(),
            label_grouping_threshold: DEFAULT_LABEL_GROUPING_THRESHOLD,
            source_key: None,
        }
    }
}

const TOP_LEVEL_FIELDS: &[&str] = &[
    "query_concurrency",
    "cache_size",
    "localized_strings",
    "label_grouping_threshold",
    "source_key",
];

const LOCALIZED_STRINGS_FIELDS: &[&str] = &["other", "unspecified"];

impl HierarchyProviderConfig {
    /// Parse and validate a YAML configuration document
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        check_fields(&raw, TOP_LEVEL_FIELDS, "root")?;
        if let Some(strings) = raw.get("localized_strings") {
            check_fields(strings, LOCALIZED_STRINGS_FIELDS, "localized_strings")?;
        }

        let config: Self = if raw.is_null() {
            Self::default()
        } else {
            serde_yaml::from_value(raw)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_query_concurrency(mut self, query_concurrency: usize) -> Self {
        self.query_concurrency = query_concurrency;
        self
    }

    pub fn with_source_key(mut self, source_key: impl Into<String>) -> Self {
        self.source_key = Some(source_key.into());
        self
    }

    pub fn with_localized_strings(mut self, strings: LocalizedStrings) -> Self {
        self.localized_strings = strings;
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.query_concurrency == 0 {
            return Err(ConfigError::range_with_hint(
                "query_concurrency",
                self.query_concurrency,
                1,
                usize::MAX,
                "At least one query must be allowed to run",
            ));
        }
        if self.label_grouping_threshold == 0 {
            return Err(ConfigError::range_with_hint(
                "label_grouping_threshold",
                self.label_grouping_threshold,
                1,
                usize::MAX,
                "Use 1 to group every label",
            ));
        }
        Ok(())
    }
}

fn check_fields(value: &serde_yaml::Value, valid: &[&str], section: &str) -> ConfigResult<()> {
    let Some(mapping) = value.as_mapping() else {
        return Ok(());
    };
    for key in mapping.keys() {
        let Some(key) = key.as_str() else {
            return Err(ConfigError::NonStringKey {
                section: section.to_string(),
            });
        };
        if !valid.contains(&key) {
            return Err(ConfigError::unknown_field(key, section, valid));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HierarchyProviderConfig::default();
        assert_eq!(config.query_concurrency, 10);
        assert_eq!(config.cache_size, 1);
        assert_eq!(config.label_grouping_threshold, 2);
        assert_eq!(config.localized_strings.other, "Other");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_partial() {
        let config = HierarchyProviderConfig::from_yaml_str(
            "cache_size: 0\nlocalized_strings:\n  unspecified: \"N/A\"\n",
        )
        .unwrap();
        assert_eq!(config.cache_size, 0);
        assert_eq!(config.query_concurrency, 10);
        assert_eq!(config.localized_strings.unspecified, "N/A");
        assert_eq!(config.localized_strings.other, "Other");
    }

    #[test]
    fn test_from_yaml_empty() {
        let config = HierarchyProviderConfig::from_yaml_str("").unwrap();
        assert_eq!(config, HierarchyProviderConfig::default());
    }

    #[test]
    fn test_from_yaml_unknown_field() {
        let err = HierarchyProviderConfig::from_yaml_str("cache_sise: 3").unwrap_err();
        match err {
            ConfigError::UnknownField { suggestion, .. } => {
                assert!(suggestion.contains("cache_size"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = HierarchyProviderConfig::from_yaml_str("query_concurrency: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Range { .. }));
    }
}
