//! Caller-owned provider counters
//!
//! Counters live in an explicit object handed to the provider through its
//! props, so several providers can share one set or keep separate ones.
//! With the `metrics` feature the same counters can be exported through a
//! prometheus registry.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter_with_registry, IntCounter, Opts, Registry};

#[cfg(feature = "metrics")]
#[derive(Clone)]
struct ExportedCounters {
    levels_requested: IntCounter,
    queries_executed: IntCounter,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
}

#[derive(Default)]
pub struct ProviderMetrics {
    levels_requested: AtomicU64,
    queries_executed: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    #[cfg(feature = "metrics")]
    exported: Option<ExportedCounters>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub levels_requested: u64,
    pub queries_executed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl MetricsSnapshot {
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total > 0 {
            self.cache_hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

impl ProviderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters that are additionally exported through `registry`
    #[cfg(feature = "metrics")]
    pub fn with_registry(registry: &Registry) -> prometheus::Result<Self> {
        let exported = ExportedCounters {
            levels_requested: register_int_counter_with_registry!(
                Opts::new("hierarchy_levels_requested_total", "Hierarchy levels requested"),
                registry
            )?,
            queries_executed: register_int_counter_with_registry!(
                Opts::new("hierarchy_queries_executed_total", "Instance queries executed"),
                registry
            )?,
            cache_hits: register_int_counter_with_registry!(
                Opts::new("hierarchy_level_cache_hits_total", "Level cache hits"),
                registry
            )?,
            cache_misses: register_int_counter_with_registry!(
                Opts::new("hierarchy_level_cache_misses_total", "Level cache misses"),
                registry
            )?,
        };
        Ok(Self {
            exported: Some(exported),
            ..Self::default()
        })
    }

    pub fn record_level_request(&self) {
        self.levels_requested.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if let Some(exported) = &self.exported {
            exported.levels_requested.inc();
        }
    }

    pub fn record_query(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if let Some(exported) = &self.exported {
            exported.queries_executed.inc();
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if let Some(exported) = &self.exported {
            exported.cache_hits.inc();
        }
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if let Some(exported) = &self.exported {
            exported.cache_misses.inc();
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            levels_requested: self.levels_requested.load(Ordering::Relaxed),
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = ProviderMetrics::new();
        metrics.record_level_request();
        metrics.record_query();
        metrics.record_query();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_cache_miss();
        metrics.record_cache_miss();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.levels_requested, 1);
        assert_eq!(snapshot.queries_executed, 2);
        assert_eq!(snapshot.cache_hit_rate(), 0.25);
    }

    #[test]
    fn test_empty_hit_rate() {
        assert_eq!(MetricsSnapshot::default().cache_hit_rate(), 0.0);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_exported_counters() {
        let registry = Registry::new();
        let metrics = ProviderMetrics::with_registry(&registry).unwrap();
        metrics.record_cache_hit();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "hierarchy_level_cache_hits_total"));
    }
}
