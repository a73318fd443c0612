//! Class-hierarchy inspection port
//!
//! Used by base-class grouping to decide whether a node's class derives from
//! a requested base class. Answers are cached in a caller-owned
//! [`CachingClassHierarchyInspector`] whose lifetime follows the data source.

use async_trait::async_trait;
use moka::sync::Cache;
use std::sync::Arc;

use crate::errors::Result;

#[async_trait]
pub trait ClassHierarchyInspector: Send + Sync {
    /// Whether `derived` is `base` or a (polymorphic) subclass of it
    async fn derives_from(&self, derived: &str, base: &str) -> Result<bool>;
}

/// Inspector that only knows class identity
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactClassInspector;

#[async_trait]
impl ClassHierarchyInspector for ExactClassInspector {
    async fn derives_from(&self, derived: &str, base: &str) -> Result<bool> {
        Ok(derived == base)
    }
}

/// Memoizing wrapper around another inspector
pub struct CachingClassHierarchyInspector {
    inner: Arc<dyn ClassHierarchyInspector>,
    answers: Cache<(String, String), bool>,
}

impl CachingClassHierarchyInspector {
    pub fn new(inner: Arc<dyn ClassHierarchyInspector>, capacity: u64) -> Self {
        Self {
            inner,
            answers: Cache::builder().max_capacity(capacity).build(),
        }
    }

    /// Forget everything, e.g. after a schema change
    pub fn clear(&self) {
        self.answers.invalidate_all();
    }

    pub fn cached_entries(&self) -> u64 {
        self.answers.run_pending_tasks();
        self.answers.entry_count()
    }
}

#[async_trait]
impl ClassHierarchyInspector for CachingClassHierarchyInspector {
    async fn derives_from(&self, derived: &str, base: &str) -> Result<bool> {
        if derived == base {
            return Ok(true);
        }
        let key = (derived.to_string(), base.to_string());
        if let Some(answer) = self.answers.get(&key) {
            return Ok(answer);
        }
        let answer = self.inner.derives_from(derived, base).await?;
        self.answers.insert(key, answer);
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingInspector {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ClassHierarchyInspector for CountingInspector {
        async fn derives_from(&self, derived: &str, base: &str) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(derived.starts_with(base))
        }
    }

    #[tokio::test]
    async fn test_answers_are_cached() {
        let inner = Arc::new(CountingInspector {
            calls: AtomicUsize::new(0),
        });
        let inspector = CachingClassHierarchyInspector::new(inner.clone(), 100);

        assert!(inspector.derives_from("Bis.DoorType", "Bis.Door").await.unwrap());
        assert!(inspector.derives_from("Bis.DoorType", "Bis.Door").await.unwrap());
        assert!(!inspector.derives_from("Bis.Wall", "Bis.Door").await.unwrap());
        assert!(inspector.derives_from("Bis.Wall", "Bis.Wall").await.unwrap());

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(inspector.cached_entries(), 2);

        inspector.clear();
        assert!(inspector.derives_from("Bis.DoorType", "Bis.Door").await.unwrap());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }
}
