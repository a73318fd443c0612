//! Pre-process stage: definition hook + hide rules
//!
//! A hidden node is replaced by its own pre-processed children, re-parented
//! to the hidden node's ancestors and ordered at the hidden node's position.
//! A hidden filter target passes its target status down to those children.

use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use tracing::trace;

use hierarchy_core::errors::Result;
use hierarchy_core::features::cache::LevelVariation;
use hierarchy_core::shared::models::{
    NodeFilteringInfo, ProcessedHierarchyNode, ProcessedNonGroupingNode,
};

use crate::pipeline::{has_children, preprocessed_level, PipelineContext};

pub fn pre_process(
    ctx: &PipelineContext,
    nodes: BoxStream<'static, Result<ProcessedHierarchyNode>>,
    variation: LevelVariation,
) -> BoxStream<'static, Result<ProcessedHierarchyNode>> {
    let ctx = ctx.clone();
    nodes
        .and_then(move |node| {
            let ctx = ctx.clone();
            let variation = variation.clone();
            async move { pre_process_node(&ctx, node, &variation).await }
        })
        .map_ok(|nodes| stream::iter(nodes.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
}

async fn pre_process_node(
    ctx: &PipelineContext,
    node: ProcessedHierarchyNode,
    variation: &LevelVariation,
) -> Result<Vec<ProcessedHierarchyNode>> {
    let node = match node {
        ProcessedHierarchyNode::NonGrouping(node) => node,
        grouping => return Ok(vec![grouping]),
    };
    let Some(mut node) = ctx.definition.pre_process_node(node).await? else {
        return Ok(Vec::new());
    };

    if node.processing.hide_in_hierarchy {
        return promote_children(ctx, node, variation).await;
    }

    if node.processing.hide_if_no_children {
        if !has_children(ctx, &node).await? {
            trace!(request = %ctx.request_id, node = %node.key, "dropping childless node");
            return Ok(Vec::new());
        }
        node.children = Some(true);
    }
    Ok(vec![ProcessedHierarchyNode::NonGrouping(node)])
}

async fn promote_children(
    ctx: &PipelineContext,
    hidden: ProcessedNonGroupingNode,
    variation: &LevelVariation,
) -> Result<Vec<ProcessedHierarchyNode>> {
    let children: Vec<ProcessedHierarchyNode> =
        preprocessed_level(ctx, Some(hidden.to_parent_node()), variation.clone())
            .subscribe()
            .try_collect()
            .await?;
    trace!(
        request = %ctx.request_id,
        node = %hidden.key,
        children = children.len(),
        "promoting children of hidden node"
    );

    Ok(children
        .into_iter()
        .map(|mut child| {
            child.set_parent_keys(hidden.parent_keys.clone());
            if let ProcessedHierarchyNode::NonGrouping(node) = &mut child {
                node.order = hidden.order.nested(&node.order);
                inherit_target(hidden.filtering.as_ref(), node);
            }
            child
        })
        .collect())
}

fn inherit_target(hidden: Option<&NodeFilteringInfo>, child: &mut ProcessedNonGroupingNode) {
    let Some(hidden) = hidden.filter(|f| f.is_filter_target) else {
        return;
    };
    let inherited = NodeFilteringInfo {
        is_filter_target: true,
        target_reveals: hidden.target_reveals.clone(),
        ..Default::default()
    };
    match child.filtering.as_mut() {
        Some(filtering) => filtering.merge(&inherited),
        None => child.filtering = Some(inherited),
    }
}
