//! Filtering hierarchy definition
//!
//! Wraps another definition so that only nodes lying on a filtering path are
//! produced. Every emitted node carries a [`NodeFilteringInfo`] telling
//! whether it is a target, whether a revealing path runs through it, and
//! which path tails continue below it. Below a target nothing is filtered.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

use crate::errors::Result;
use crate::features::definition::{
    DefineHierarchyLevelProps, HierarchyDefinition, HierarchyLevelDefinition,
};
use crate::features::query::{HierarchyQuery, QueryBinding, Row};
use crate::shared::models::{
    FilteringPath, HierarchyNode, HierarchyNodeKey, NodeFilteringInfo, NodeIdentifier, PathTail,
    ProcessedNonGroupingNode, RevealMode, SourceNode, TargetReveal,
};

pub struct FilteringHierarchyDefinition {
    source: Arc<dyn HierarchyDefinition>,
    paths: Vec<FilteringPath>,
}

/// Whether a path with the given reveal mode expands the node at `depth`
fn reveals_through(mode: RevealMode, depth: usize) -> bool {
    match mode {
        RevealMode::Off => false,
        RevealMode::Full | RevealMode::UntilGrouping { .. } => true,
        RevealMode::UntilDepth(limit) => depth < limit,
    }
}

/// Annotations for a node matched by the given path tails
pub fn filtering_info(matched: &[&PathTail]) -> NodeFilteringInfo {
    let mut info = NodeFilteringInfo::default();
    for tail in matched {
        if tail.remaining.len() <= 1 {
            info.is_filter_target = true;
            let reveal = TargetReveal {
                mode: tail.reveal,
                depth: tail.depth,
            };
            if !info.target_reveals.contains(&reveal) {
                info.target_reveals.push(reveal);
            }
        } else {
            info.on_revealed_path |= reveals_through(tail.reveal, tail.depth);
            let child = PathTail {
                remaining: tail.remaining[1..].to_vec(),
                depth: tail.depth + 1,
                reveal: tail.reveal,
            };
            if !info.filtered_children_paths.contains(&child) {
                info.filtered_children_paths.push(child);
            }
        }
    }
    info
}

/// Whether a query row with the given key matches an identifier; instance
/// ids are unique per data source so classes are not compared
fn matches_row_key(identifier: &NodeIdentifier, key: &HierarchyNodeKey) -> bool {
    match (identifier, key) {
        (NodeIdentifier::Instance(expected), HierarchyNodeKey::Instances(keys)) => {
            keys.iter().any(|k| {
                k.id == expected.id
                    && match (&k.source, &expected.source) {
                        (Some(lhs), Some(rhs)) => lhs == rhs,
                        _ => true,
                    }
            })
        }
        _ => identifier.matches_key(key),
    }
}

enum ParentScope {
    /// Parent is (or descends from) a filter target: no filtering below
    Unfiltered,
    Filtered(Vec<PathTail>),
}

impl FilteringHierarchyDefinition {
    pub fn new(source: Arc<dyn HierarchyDefinition>, paths: Vec<FilteringPath>) -> Self {
        Self { source, paths }
    }

    pub fn paths(&self) -> &[FilteringPath] {
        &self.paths
    }

    fn scope(&self, parent: Option<&HierarchyNode>) -> ParentScope {
        let Some(parent) = parent else {
            return ParentScope::Filtered(self.paths.iter().map(PathTail::from).collect());
        };
        match &parent.filtering {
            Some(f) if f.is_filter_target || f.has_filter_target_ancestor => ParentScope::Unfiltered,
            Some(f) => ParentScope::Filtered(f.filtered_children_paths.clone()),
            None => ParentScope::Filtered(Vec::new()),
        }
    }

    fn annotate(node: &mut SourceNode, info: NodeFilteringInfo) {
        node.auto_expand |= info.on_revealed_path;
        match node.filtering.as_mut() {
            Some(existing) => existing.merge(&info),
            None => node.filtering = Some(info),
        }
    }

    fn unfiltered_info() -> NodeFilteringInfo {
        NodeFilteringInfo {
            has_filter_target_ancestor: true,
            ..Default::default()
        }
    }

    fn restrict_query(query: &HierarchyQuery, ids: Vec<String>) -> HierarchyQuery {
        let mut bindings = query.bindings.clone();
        bindings.push(QueryBinding::IdSet(ids));
        HierarchyQuery {
            ctes: query.ctes.clone(),
            text: format!(
                "SELECT * FROM ({}) WHERE InVirtualSet(?, ECInstanceId)",
                query.text
            ),
            bindings,
        }
    }
}

#[async_trait]
impl HierarchyDefinition for FilteringHierarchyDefinition {
    async fn define_hierarchy_level(
        &self,
        props: DefineHierarchyLevelProps,
    ) -> Result<Vec<HierarchyLevelDefinition>> {
        let scope = self.scope(props.parent_node.as_ref());
        let definitions = self.source.define_hierarchy_level(props).await?;

        let tails = match scope {
            ParentScope::Unfiltered => {
                return Ok(definitions
                    .into_iter()
                    .map(|definition| match definition {
                        HierarchyLevelDefinition::GenericNode(mut node) => {
                            Self::annotate(&mut node, Self::unfiltered_info());
                            HierarchyLevelDefinition::GenericNode(node)
                        }
                        other => other,
                    })
                    .collect())
            }
            ParentScope::Filtered(tails) => tails,
        };

        let mut filtered = Vec::new();
        for definition in definitions {
            match definition {
                HierarchyLevelDefinition::GenericNode(mut node) => {
                    let matched: Vec<&PathTail> = tails
                        .iter()
                        .filter(|t| t.remaining.first().is_some_and(|id| id.matches_key(&node.key)))
                        .collect();
                    if matched.is_empty() {
                        continue;
                    }
                    Self::annotate(&mut node, filtering_info(&matched));
                    filtered.push(HierarchyLevelDefinition::GenericNode(node));
                }
                HierarchyLevelDefinition::InstanceNodesQuery {
                    full_class_name,
                    query,
                } => {
                    let mut ids: Vec<String> = tails
                        .iter()
                        .filter_map(|t| match t.remaining.first() {
                            Some(NodeIdentifier::Instance(key)) => Some(key.id.clone()),
                            _ => None,
                        })
                        .collect();
                    ids.sort();
                    ids.dedup();
                    if ids.is_empty() {
                        continue;
                    }
                    trace!(class = %full_class_name, ids = ids.len(), "restricting instance query");
                    filtered.push(HierarchyLevelDefinition::InstanceNodesQuery {
                        full_class_name,
                        query: Self::restrict_query(&query, ids),
                    });
                }
            }
        }
        Ok(filtered)
    }

    fn parse_node(&self, row: &Row, parent_node: Option<&HierarchyNode>) -> Result<Option<SourceNode>> {
        let Some(mut node) = self.source.parse_node(row, parent_node)? else {
            return Ok(None);
        };
        match self.scope(parent_node) {
            ParentScope::Unfiltered => {
                Self::annotate(&mut node, Self::unfiltered_info());
                Ok(Some(node))
            }
            ParentScope::Filtered(tails) => {
                let matched: Vec<&PathTail> = tails
                    .iter()
                    .filter(|t| t.remaining.first().is_some_and(|id| matches_row_key(id, &node.key)))
                    .collect();
                if matched.is_empty() {
                    return Ok(None);
                }
                Self::annotate(&mut node, filtering_info(&matched));
                Ok(Some(node))
            }
        }
    }

    async fn pre_process_node(
        &self,
        node: ProcessedNonGroupingNode,
    ) -> Result<Option<ProcessedNonGroupingNode>> {
        self.source.pre_process_node(node).await
    }

    async fn post_process_node(&self, node: HierarchyNode) -> Result<Option<HierarchyNode>> {
        self.source.post_process_node(node).await
    }
}
