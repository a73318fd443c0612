//! Finalize stage
//!
//! Sorts a grouped level, resolves children existence (children checks run
//! concurrently, bounded by the query scheduler) and runs the definition's
//! post-processing hook.

use futures::future::{self, try_join_all, BoxFuture};
use futures::FutureExt;

use hierarchy_core::errors::Result;
use hierarchy_core::shared::models::{HierarchyNode, NodeOrder, ProcessedHierarchyNode};

use crate::pipeline::{has_children, PipelineContext};

/// Case-insensitive label order, ties broken by emission order
pub fn sort_level(nodes: &mut [ProcessedHierarchyNode]) {
    nodes.sort_by_cached_key(|node| -> (String, NodeOrder) {
        (node.label().to_lowercase(), node.order().clone())
    });
}

pub async fn finalize(
    ctx: &PipelineContext,
    mut nodes: Vec<ProcessedHierarchyNode>,
) -> Result<Vec<HierarchyNode>> {
    sort_level(&mut nodes);

    let checks = nodes.iter().map(|node| -> BoxFuture<'static, Result<bool>> {
        match node {
            ProcessedHierarchyNode::Grouping(_) => future::ready(Ok(true)).boxed(),
            ProcessedHierarchyNode::NonGrouping(node) => has_children(ctx, node),
        }
    });
    let children = try_join_all(checks).await?;

    let mut finalized = Vec::with_capacity(nodes.len());
    for (node, has_children) in nodes.into_iter().zip(children) {
        let node = HierarchyNode::from_processed(node, has_children);
        if let Some(node) = ctx.definition.post_process_node(node).await? {
            finalized.push(node);
        }
    }
    // post-processing may relabel; sort is stable so ties keep emission order
    finalized.sort_by_cached_key(|node| node.label.to_lowercase());
    Ok(finalized)
}
