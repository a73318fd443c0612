//! Initialize stage: source nodes → processed nodes
//!
//! Formats labels, assigns ancestor keys and resolves everything grouping
//! needs I/O for (base-class membership, formatted property values).

use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};

use hierarchy_core::errors::Result;
use hierarchy_core::features::formatting::format_label;
use hierarchy_core::shared::models::{
    HierarchyNode, HierarchyNodeKey, NodeOrder, ProcessedHierarchyNode, ProcessedNonGroupingNode,
    SourceNode,
};

use super::source_stage::SourcedNode;
use crate::pipeline::PipelineContext;

pub fn initialize(
    ctx: &PipelineContext,
    nodes: BoxStream<'static, Result<SourcedNode>>,
    parent: Option<&HierarchyNode>,
) -> BoxStream<'static, Result<ProcessedHierarchyNode>> {
    let ctx = ctx.clone();
    let parent_keys = parent.map(|p| p.key_path()).unwrap_or_default();
    nodes
        .and_then(move |(order, node)| {
            let ctx = ctx.clone();
            let parent_keys = parent_keys.clone();
            async move {
                initialize_node(&ctx, node, parent_keys, order)
                    .await
                    .map(ProcessedHierarchyNode::NonGrouping)
            }
        })
        .boxed()
}

pub async fn initialize_node(
    ctx: &PipelineContext,
    node: SourceNode,
    parent_keys: Vec<HierarchyNodeKey>,
    order: NodeOrder,
) -> Result<ProcessedNonGroupingNode> {
    let label = format_label(ctx.formatter.as_ref(), &node.label).await?;

    let mut key = node.key;
    if let Some(source) = ctx.config.source_key.as_deref() {
        key.stamp_source(source);
    }

    let mut base_classes = Vec::new();
    let mut formatted_property_values = Vec::new();
    let class_name = key
        .instance_keys()
        .and_then(|keys| keys.first())
        .map(|k| k.class_name.clone());
    if let (Some(class_name), Some(grouping)) = (class_name, node.processing.grouping.as_ref()) {
        if let Some(params) = &grouping.by_base_classes {
            for base in &params.full_class_names {
                if ctx.inspector.derives_from(&class_name, base).await? {
                    base_classes.push(base.clone());
                }
            }
        }
        if let Some(params) = &grouping.by_properties {
            for group in &params.property_groups {
                let formatted = match &group.value {
                    Some(value) if !value.is_empty() => Some(ctx.formatter.format(value).await?),
                    _ => None,
                };
                formatted_property_values.push(formatted);
            }
        }
    }

    Ok(ProcessedNonGroupingNode {
        key,
        label,
        parent_keys,
        children: node.children,
        auto_expand: node.auto_expand,
        supports_filtering: node.supports_filtering,
        extended_data: node.extended_data,
        processing: node.processing,
        filtering: node.filtering,
        base_classes,
        formatted_property_values,
        order,
    })
}
