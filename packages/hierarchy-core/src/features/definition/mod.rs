//! Hierarchy definition protocol
//!
//! A [`HierarchyDefinition`] maps a parent node (or the root) to the list of
//! level definitions producing its children: inline generic nodes and
//! class-scoped instance queries. Optional hooks customize row parsing and
//! transform nodes before grouping and after finalization.
//!
//! Implementations must not depend on provider state; the provider may call
//! them any number of times for the same parent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::Result;
use crate::features::query::{parse_node_row, HierarchyQuery, Row};
use crate::shared::models::{HierarchyNode, ProcessedNonGroupingNode, SourceNode};

/// One child-producing entry of a hierarchy level
#[derive(Debug, Clone, PartialEq)]
pub enum HierarchyLevelDefinition {
    /// Inline node with a generic key
    GenericNode(SourceNode),
    /// Query returning well-known-column rows of instances of one class
    InstanceNodesQuery {
        full_class_name: String,
        query: HierarchyQuery,
    },
}

impl HierarchyLevelDefinition {
    pub fn generic(node: SourceNode) -> Self {
        Self::GenericNode(node)
    }

    pub fn instances(full_class_name: impl Into<String>, query: HierarchyQuery) -> Self {
        Self::InstanceNodesQuery {
            full_class_name: full_class_name.into(),
            query,
        }
    }
}

/// Opaque, caller-defined restriction passed through to the definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceFilter(pub serde_json::Value);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefineHierarchyLevelProps {
    /// `None` requests the root level
    pub parent_node: Option<HierarchyNode>,
    pub instance_filter: Option<InstanceFilter>,
}

#[async_trait]
pub trait HierarchyDefinition: Send + Sync {
    async fn define_hierarchy_level(
        &self,
        props: DefineHierarchyLevelProps,
    ) -> Result<Vec<HierarchyLevelDefinition>>;

    /// Turn a query row into a source node; `None` skips the row
    fn parse_node(&self, row: &Row, _parent_node: Option<&HierarchyNode>) -> Result<Option<SourceNode>> {
        parse_node_row(row).map(Some)
    }

    /// Runs once per node before grouping; `None` drops the node
    async fn pre_process_node(
        &self,
        node: ProcessedNonGroupingNode,
    ) -> Result<Option<ProcessedNonGroupingNode>> {
        Ok(Some(node))
    }

    /// Runs once per node after finalization; `None` drops the node
    async fn post_process_node(&self, node: HierarchyNode) -> Result<Option<HierarchyNode>> {
        Ok(Some(node))
    }
}

pub type HierarchyDefinitionRef = Arc<dyn HierarchyDefinition>;
