//! Source stage: level definitions → source nodes
//!
//! Inline generic nodes are taken as they are; instance queries go through
//! the scheduler. Every query of the level is read to the end before the
//! first node is handed on, so query slots are free again by the time later
//! stages issue nested children checks.

use futures::future::try_join_all;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, trace};

use hierarchy_core::errors::{HierarchyError, Result};
use hierarchy_core::features::cache::LevelVariation;
use hierarchy_core::features::definition::{
    DefineHierarchyLevelProps, HierarchyLevelDefinition, InstanceFilter,
};
use hierarchy_core::features::query::{QueryReaderOptions, Row};
use hierarchy_core::shared::models::{HierarchyNode, NodeOrder, SourceNode};

use crate::pipeline::PipelineContext;

pub type SourcedNode = (NodeOrder, SourceNode);

/// Lazily read the source nodes of a level
pub fn source(
    ctx: &PipelineContext,
    parent: Option<HierarchyNode>,
    variation: LevelVariation,
) -> BoxStream<'static, Result<SourcedNode>> {
    let ctx = ctx.clone();
    stream::once(async move {
        let nodes = read_level(&ctx, parent, variation).await?;
        Ok::<_, HierarchyError>(stream::iter(nodes.into_iter().map(Ok)))
    })
    .try_flatten()
    .boxed()
}

async fn read_level(
    ctx: &PipelineContext,
    parent: Option<HierarchyNode>,
    variation: LevelVariation,
) -> Result<Vec<SourcedNode>> {
    let props = DefineHierarchyLevelProps {
        parent_node: parent.clone(),
        instance_filter: variation.instance_filter.clone().map(InstanceFilter),
    };
    let definitions = ctx.definition.define_hierarchy_level(props).await?;
    debug!(
        request = %ctx.request_id,
        definitions = definitions.len(),
        "hierarchy level defined"
    );

    let options = QueryReaderOptions {
        row_limit: variation.size_limit,
        ..Default::default()
    };
    let reads = definitions
        .into_iter()
        .enumerate()
        .map(|(index, definition)| read_definition(ctx, parent.as_ref(), index, definition, options));
    let per_definition = try_join_all(reads).await?;

    let rows: usize = per_definition.iter().map(|(rows, _)| rows).sum();
    if let Some(limit) = variation.size_limit {
        if rows > limit {
            return Err(HierarchyError::RowsLimitExceeded { limit });
        }
    }
    Ok(per_definition
        .into_iter()
        .flat_map(|(_, nodes)| nodes)
        .collect())
}

/// Nodes of one level definition plus the number of rows read for it
async fn read_definition(
    ctx: &PipelineContext,
    parent: Option<&HierarchyNode>,
    index: usize,
    definition: HierarchyLevelDefinition,
    options: QueryReaderOptions,
) -> Result<(usize, Vec<SourcedNode>)> {
    match definition {
        HierarchyLevelDefinition::GenericNode(node) => {
            Ok((0, vec![(NodeOrder::new(index, 0), node)]))
        }
        HierarchyLevelDefinition::InstanceNodesQuery {
            full_class_name,
            query,
        } => {
            ctx.metrics.record_query();
            let rows: Vec<Row> = ctx.scheduler.schedule(&query, options).try_collect().await?;
            trace!(
                request = %ctx.request_id,
                class = %full_class_name,
                rows = rows.len(),
                "instance query finished"
            );

            let mut nodes = Vec::with_capacity(rows.len());
            for (row_index, row) in rows.iter().enumerate() {
                if let Some(node) = ctx.definition.parse_node(row, parent)? {
                    nodes.push((NodeOrder::new(index, row_index), node));
                }
            }
            Ok((rows.len(), nodes))
        }
    }
}
