//! Configuration
//!
//! Provider-wide settings: query concurrency, cache size, localized grouping
//! labels and label grouping threshold. Loadable from YAML.
//!
//! # Examples
//!
//! ```rust
//! use hierarchy_core::config::HierarchyProviderConfig;
//!
//! let config = HierarchyProviderConfig::from_yaml_str("cache_size: 20").unwrap();
//! assert_eq!(config.cache_size, 20);
//! assert_eq!(config.query_concurrency, 10);
//! ```

pub mod error;
pub mod provider_config;

// Re-exports
pub use error::{ConfigError, ConfigResult};
pub use provider_config::{
    HierarchyProviderConfig, LocalizedStrings, DEFAULT_CACHE_SIZE, DEFAULT_LABEL_GROUPING_THRESHOLD,
    DEFAULT_QUERY_CONCURRENCY,
};
