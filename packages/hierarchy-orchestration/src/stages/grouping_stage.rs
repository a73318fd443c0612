//! Grouping stage
//!
//! Groups a pre-processed level and registers every created grouping node's
//! children in the level cache, so expanding a grouping node later doesn't
//! regroup its ancestor level.

use tracing::debug;

use hierarchy_core::features::cache::{
    CachedLevel, LevelCacheKey, LevelStage, LevelVariation, ParentKey, SharedStream,
};
use hierarchy_core::features::grouping::{group_nodes, grouping_nodes, GroupingContext};
use hierarchy_core::shared::models::{HierarchyNode, ProcessedHierarchyNode};

use crate::pipeline::PipelineContext;

pub fn group(
    ctx: &PipelineContext,
    nodes: Vec<ProcessedHierarchyNode>,
    parent: Option<&HierarchyNode>,
    variation: &LevelVariation,
) -> Vec<ProcessedHierarchyNode> {
    let parent_keys = parent.map(|p| p.key_path()).unwrap_or_default();
    let grouping = GroupingContext {
        parent_keys: &parent_keys,
        non_grouping_ancestor: parent,
        localized_strings: &ctx.config.localized_strings,
        label_grouping_threshold: ctx.config.label_grouping_threshold,
    };
    let input = nodes.len();
    let grouped = group_nodes(nodes, &grouping);

    {
        let groups = grouping_nodes(&grouped);
        if !groups.is_empty() {
            debug!(
                request = %ctx.request_id,
                nodes = input,
                grouping_nodes = groups.len(),
                top_level = grouped.len(),
                "level grouped"
            );
        }
        if ctx.cache.is_enabled() {
            for node in groups {
                ctx.cache.insert(
                    LevelCacheKey::with_parent(ParentKey::for_grouping_node(node), variation),
                    CachedLevel::new(
                        LevelStage::PreProcessed,
                        SharedStream::completed(node.children.clone()),
                    ),
                );
            }
        }
    }
    grouped
}
