//! Level-result cache
//!
//! Size-bounded LRU of per-level node streams keyed by parent identity and
//! request variation. Size `0` disables caching: lookups always miss and
//! inserts are dropped.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use tracing::{debug, trace};

use super::shared_stream::SharedStream;
use crate::shared::models::{
    GroupingNodeKey, HierarchyNode, HierarchyNodeKey, InstanceKey, ProcessedGroupingNode,
    ProcessedHierarchyNode,
};

/// Parent identity part of a cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentKey {
    Root,
    /// Non-grouping parent, identified by its key path from the root
    Node(Vec<HierarchyNodeKey>),
    /// Grouping parent, normalized to its closest non-grouping ancestor and
    /// the instance keys it groups
    Grouping {
        ancestor: Option<Vec<HierarchyNodeKey>>,
        grouping: GroupingNodeKey,
        instance_keys: Vec<InstanceKey>,
    },
}

impl ParentKey {
    pub fn for_parent(parent: Option<&HierarchyNode>) -> Self {
        let Some(parent) = parent else {
            return ParentKey::Root;
        };
        match (&parent.key, &parent.grouping) {
            (HierarchyNodeKey::Grouping(grouping), info) => {
                let (ancestor, mut instance_keys) = match info {
                    Some(info) => (
                        info.non_grouping_ancestor.as_ref().map(|a| a.key_path()),
                        info.grouped_instance_keys.clone(),
                    ),
                    None => (None, Vec::new()),
                };
                instance_keys.sort();
                instance_keys.dedup();
                ParentKey::Grouping {
                    ancestor,
                    grouping: grouping.clone(),
                    instance_keys,
                }
            }
            _ => ParentKey::Node(parent.key_path()),
        }
    }

    /// Same key as [`ParentKey::for_parent`] yields for the finalized node
    pub fn for_grouping_node(node: &ProcessedGroupingNode) -> Self {
        let mut instance_keys = node.grouped_instance_keys.clone();
        instance_keys.sort();
        instance_keys.dedup();
        ParentKey::Grouping {
            ancestor: node.non_grouping_ancestor.as_ref().map(|a| a.key_path()),
            grouping: node.key.clone(),
            instance_keys,
        }
    }
}

/// Request parameters that change a level's content
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelVariation {
    pub instance_filter: Option<serde_json::Value>,
    pub size_limit: Option<usize>,
}

impl LevelVariation {
    fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LevelCacheKey {
    pub parent: ParentKey,
    variation: String,
}

impl LevelCacheKey {
    pub fn new(parent: Option<&HierarchyNode>, variation: &LevelVariation) -> Self {
        Self::with_parent(ParentKey::for_parent(parent), variation)
    }

    pub fn with_parent(parent: ParentKey, variation: &LevelVariation) -> Self {
        Self {
            parent,
            variation: variation.fingerprint(),
        }
    }
}

/// How far a cached level got through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelStage {
    /// Initialized nodes, hide rules not applied yet
    Unprocessed,
    /// Hide rules and pre-processing applied, not grouped
    PreProcessed,
}

#[derive(Clone)]
pub struct CachedLevel {
    pub stage: LevelStage,
    pub nodes: SharedStream<ProcessedHierarchyNode>,
    /// Unprocessed stream a pre-processed level was built from. Lets an
    /// abandoned pre-processed level be rebuilt without re-running queries.
    pub unprocessed: Option<SharedStream<ProcessedHierarchyNode>>,
}

impl CachedLevel {
    pub fn new(stage: LevelStage, nodes: SharedStream<ProcessedHierarchyNode>) -> Self {
        Self {
            stage,
            nodes,
            unprocessed: None,
        }
    }

    pub fn pre_processed(
        nodes: SharedStream<ProcessedHierarchyNode>,
        unprocessed: SharedStream<ProcessedHierarchyNode>,
    ) -> Self {
        Self {
            stage: LevelStage::PreProcessed,
            nodes,
            unprocessed: Some(unprocessed),
        }
    }
}

pub struct LevelCache {
    entries: Mutex<Option<LruCache<LevelCacheKey, CachedLevel>>>,
}

impl LevelCache {
    pub fn new(size: usize) -> Self {
        Self {
            entries: Mutex::new(NonZeroUsize::new(size).map(LruCache::new)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.lock().is_some()
    }

    pub fn get(&self, key: &LevelCacheKey) -> Option<CachedLevel> {
        let mut entries = self.entries.lock();
        let entries = entries.as_mut()?;
        let cached = entries.peek(key)?;
        if !cached.nodes.is_abandoned() {
            return entries.get(key).cloned();
        }
        match cached.unprocessed.clone().filter(|u| !u.is_abandoned()) {
            Some(unprocessed) => {
                trace!(parent = ?key.parent, "falling back to unprocessed level");
                let level = CachedLevel::new(LevelStage::Unprocessed, unprocessed);
                entries.put(key.clone(), level.clone());
                Some(level)
            }
            None => {
                trace!(parent = ?key.parent, "dropping abandoned level");
                entries.pop(key);
                None
            }
        }
    }

    /// Insert or replace (e.g. promote to a later stage)
    pub fn insert(&self, key: LevelCacheKey, level: CachedLevel) {
        if let Some(entries) = self.entries.lock().as_mut() {
            trace!(parent = ?key.parent, stage = ?level.stage, "caching level");
            entries.put(key, level);
        }
    }

    pub fn clear(&self) {
        if let Some(entries) = self.entries.lock().as_mut() {
            debug!(entries = entries.len(), "clearing level cache");
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().as_ref().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
