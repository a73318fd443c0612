//! Level pipeline
//!
//! Composes the stages into per-level node sequences:
//!
//! ```text
//! source → initialize ──(cached: Unprocessed)──→ pre-process ──(cached: PreProcessed)──→ grouping → finalize
//! ```
//!
//! Children of a grouping node are never queried directly: the grouping
//! node's non-grouping ancestor level is grouped again (usually a cache hit)
//! and the grouping node's partition is picked out of it.

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

use hierarchy_core::config::HierarchyProviderConfig;
use hierarchy_core::errors::{HierarchyError, Result};
use hierarchy_core::features::cache::{
    CachedLevel, LevelCache, LevelCacheKey, LevelStage, LevelVariation, SharedStream,
};
use hierarchy_core::features::definition::HierarchyDefinitionRef;
use hierarchy_core::features::formatting::{ClassHierarchyInspector, ValueFormatter};
use hierarchy_core::features::grouping::find_grouping_node;
use hierarchy_core::features::query::QueryScheduler;
use hierarchy_core::shared::models::{
    GroupingNodeKey, HierarchyNode, HierarchyNodeKey, InstanceKey, ProcessedHierarchyNode,
    ProcessedNonGroupingNode,
};

use crate::metrics::ProviderMetrics;
use crate::stages;

/// Snapshot of provider state a request runs against
///
/// Captured once per request: swapping the definition, formatter or cache
/// on the provider doesn't affect requests already in flight.
#[derive(Clone)]
pub struct PipelineContext {
    pub request_id: Uuid,
    pub definition: HierarchyDefinitionRef,
    pub formatter: Arc<dyn ValueFormatter>,
    pub inspector: Arc<dyn ClassHierarchyInspector>,
    pub scheduler: QueryScheduler,
    pub cache: Arc<LevelCache>,
    pub config: Arc<HierarchyProviderConfig>,
    pub metrics: Arc<ProviderMetrics>,
    /// Skip cache reads (writes still happen)
    pub ignore_cache: bool,
}

/// Pre-processed (hidden nodes replaced, not grouped) nodes of a level.
/// For a grouping parent these are its already-grouped children.
pub fn preprocessed_level(
    ctx: &PipelineContext,
    parent: Option<HierarchyNode>,
    variation: LevelVariation,
) -> SharedStream<ProcessedHierarchyNode> {
    let key = LevelCacheKey::new(parent.as_ref(), &variation);
    if !ctx.ignore_cache {
        if let Some(level) = ctx.cache.get(&key) {
            ctx.metrics.record_cache_hit();
            debug!(request = %ctx.request_id, parent = ?key.parent, stage = ?level.stage, "level cache hit");
            return match level.stage {
                LevelStage::PreProcessed => level.nodes,
                LevelStage::Unprocessed => promote(ctx, key, variation, level.nodes),
            };
        }
    }
    ctx.metrics.record_cache_miss();
    trace!(request = %ctx.request_id, parent = ?key.parent, "level cache miss");

    match parent {
        Some(parent) if parent.is_grouping_node() => grouping_children(ctx, parent, variation),
        parent => {
            let sourced = stages::source(ctx, parent.clone(), variation.clone());
            // queries are drained before the first node comes out, so a
            // partially read level holds no query slots and can be resumed
            let unprocessed =
                SharedStream::resumable(stages::initialize(ctx, sourced, parent.as_ref()));
            ctx.cache.insert(
                key.clone(),
                CachedLevel::new(LevelStage::Unprocessed, unprocessed.clone()),
            );
            promote(ctx, key, variation, unprocessed)
        }
    }
}

/// Run hide rules and pre-processing over an unprocessed level and replace
/// its cache entry
fn promote(
    ctx: &PipelineContext,
    key: LevelCacheKey,
    variation: LevelVariation,
    unprocessed: SharedStream<ProcessedHierarchyNode>,
) -> SharedStream<ProcessedHierarchyNode> {
    let preprocessed =
        SharedStream::new(stages::pre_process(ctx, unprocessed.subscribe(), variation));
    ctx.cache
        .insert(key, CachedLevel::pre_processed(preprocessed.clone(), unprocessed));
    preprocessed
}

fn grouping_children(
    ctx: &PipelineContext,
    parent: HierarchyNode,
    variation: LevelVariation,
) -> SharedStream<ProcessedHierarchyNode> {
    let ctx = ctx.clone();
    let children = stream::once(async move {
        let children = resolve_grouping_children(&ctx, &parent, variation).await?;
        Ok::<_, HierarchyError>(stream::iter(children.into_iter().map(Ok)))
    })
    .try_flatten()
    .boxed();
    SharedStream::new(children)
}

async fn resolve_grouping_children(
    ctx: &PipelineContext,
    parent: &HierarchyNode,
    variation: LevelVariation,
) -> Result<Vec<ProcessedHierarchyNode>> {
    let (Some(grouping_key), Some(info)) = (parent.key.as_grouping(), parent.grouping.as_ref())
    else {
        return Err(HierarchyError::internal(format!(
            "grouping node {} carries no grouping info",
            parent.key
        )));
    };

    let ancestor = info.non_grouping_ancestor.as_deref().cloned();
    let ancestor_depth = ancestor.as_ref().map(|a| a.key_path().len()).unwrap_or(0);
    let mut path: Vec<GroupingNodeKey> = parent
        .parent_keys
        .iter()
        .skip(ancestor_depth)
        .filter_map(|k| k.as_grouping().cloned())
        .collect();
    path.push(grouping_key.clone());

    debug!(request = %ctx.request_id, node = %parent.key, depth = path.len(), "regrouping ancestor level");
    let level = grouped_level(ctx, ancestor, variation).await?;
    find_grouping_node(level, &path)
        .map(|node| node.children)
        .ok_or_else(|| {
            HierarchyError::internal(format!(
                "grouping node {} not found under its non-grouping ancestor",
                parent.key
            ))
        })
}

/// Pre-processed and grouped nodes of a level, unsorted
pub fn grouped_level(
    ctx: &PipelineContext,
    parent: Option<HierarchyNode>,
    variation: LevelVariation,
) -> BoxFuture<'static, Result<Vec<ProcessedHierarchyNode>>> {
    let ctx = ctx.clone();
    async move {
        let nodes: Vec<ProcessedHierarchyNode> =
            preprocessed_level(&ctx, parent.clone(), variation.clone())
                .subscribe()
                .try_collect()
                .await?;
        if parent.as_ref().is_some_and(|p| p.is_grouping_node()) {
            return Ok(nodes);
        }
        Ok(stages::group(&ctx, nodes, parent.as_ref(), &variation))
    }
    .boxed()
}

/// Whether a node has children: the hint if the source provided one,
/// otherwise a read of the first node of its child level
pub fn has_children(
    ctx: &PipelineContext,
    node: &ProcessedNonGroupingNode,
) -> BoxFuture<'static, Result<bool>> {
    match node.children {
        Some(children) => futures::future::ready(Ok(children)).boxed(),
        None => check_children(ctx, node.to_parent_node()),
    }
}

/// Take the first pre-processed node of the parent's child level
///
/// Children checks never carry an instance filter or size limit. A size-limit
/// failure still proves that children exist.
pub fn check_children(
    ctx: &PipelineContext,
    parent: HierarchyNode,
) -> BoxFuture<'static, Result<bool>> {
    let ctx = ctx.clone();
    async move {
        let mut children =
            preprocessed_level(&ctx, Some(parent), LevelVariation::default()).subscribe();
        match children.next().await {
            None => Ok(false),
            Some(Ok(_)) => Ok(true),
            Some(Err(e)) if e.is_rows_limit_exceeded() => Ok(true),
            Some(Err(e)) => Err(e),
        }
    }
    .boxed()
}

/// Instance keys of a level; generic nodes are descended into and hidden
/// nodes are already replaced by their children
pub fn level_instance_keys(
    ctx: &PipelineContext,
    parent: Option<HierarchyNode>,
    variation: LevelVariation,
) -> BoxStream<'static, Result<InstanceKey>> {
    if let Some(info) = parent.as_ref().and_then(|p| p.grouping.as_ref()) {
        return stream::iter(info.grouped_instance_keys.clone().into_iter().map(Ok)).boxed();
    }

    let ctx = ctx.clone();
    preprocessed_level(&ctx, parent, variation.clone())
        .subscribe()
        .map_ok(move |node| match node {
            ProcessedHierarchyNode::NonGrouping(node) => match &node.key {
                HierarchyNodeKey::Instances(keys) => {
                    stream::iter(keys.clone().into_iter().map(Ok)).boxed()
                }
                HierarchyNodeKey::Generic(_) => {
                    level_instance_keys(&ctx, Some(node.to_parent_node()), variation.clone())
                }
                HierarchyNodeKey::Grouping(_) => stream::empty().boxed(),
            },
            ProcessedHierarchyNode::Grouping(group) => {
                stream::iter(group.grouped_instance_keys.into_iter().map(Ok)).boxed()
            }
        })
        .try_flatten()
        .boxed()
}
