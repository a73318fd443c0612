//! Node lifecycle shapes
//!
//! - [`SourceNode`]: produced from a query row or supplied inline by a
//!   hierarchy definition; the label is not formatted yet.
//! - [`ProcessedHierarchyNode`]: label formatted, ancestor keys assigned;
//!   grouping nodes own their grouped children.
//! - [`HierarchyNode`]: what the consumer gets; processing parameters are
//!   stripped and children existence is resolved.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::filtering::NodeFilteringInfo;
use super::keys::{GenericNodeKey, GroupingNodeKey, HierarchyNodeKey, InstanceKey};
use super::processing::{GroupingParams, NodeProcessingParams};
use super::values::NodeLabel;

/// Emission order of a node within its level: definition index, row index,
/// and further pairs for nodes promoted from hidden parents
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeOrder(pub Vec<usize>);

impl NodeOrder {
    pub fn new(definition_index: usize, row_index: usize) -> Self {
        Self(vec![definition_index, row_index])
    }

    /// Order of a node promoted in place of `self`
    pub fn nested(&self, child: &NodeOrder) -> Self {
        let mut order = self.0.clone();
        order.extend_from_slice(&child.0);
        Self(order)
    }
}

/// Node as produced by a query row or an inline definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceNode {
    /// Generic or instances key
    pub key: HierarchyNodeKey,
    pub label: NodeLabel,
    /// Known children existence; `None` means "determine by probing"
    #[serde(default)]
    pub children: Option<bool>,
    #[serde(default)]
    pub auto_expand: bool,
    #[serde(default)]
    pub supports_filtering: bool,
    #[serde(default)]
    pub extended_data: Option<Map<String, Value>>,
    #[serde(default)]
    pub processing: NodeProcessingParams,
    #[serde(default)]
    pub filtering: Option<NodeFilteringInfo>,
}

impl SourceNode {
    pub fn generic(id: impl Into<String>, label: impl Into<NodeLabel>) -> Self {
        Self::with_key(HierarchyNodeKey::Generic(GenericNodeKey::new(id)), label)
    }

    pub fn instances(keys: Vec<InstanceKey>, label: impl Into<NodeLabel>) -> Self {
        Self::with_key(HierarchyNodeKey::instances(keys), label)
    }

    fn with_key(key: HierarchyNodeKey, label: impl Into<NodeLabel>) -> Self {
        Self {
            key,
            label: label.into(),
            children: None,
            auto_expand: false,
            supports_filtering: false,
            extended_data: None,
            processing: NodeProcessingParams::default(),
            filtering: None,
        }
    }

    pub fn with_children(mut self, children: bool) -> Self {
        self.children = Some(children);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.processing.hide_in_hierarchy = true;
        self
    }

    pub fn hidden_if_no_children(mut self) -> Self {
        self.processing.hide_if_no_children = true;
        self
    }

    pub fn with_grouping(mut self, grouping: GroupingParams) -> Self {
        self.processing.grouping = Some(grouping);
        self
    }

    pub fn with_auto_expand(mut self, auto_expand: bool) -> Self {
        self.auto_expand = auto_expand;
        self
    }

    pub fn with_extended_data(mut self, data: Map<String, Value>) -> Self {
        self.extended_data = Some(data);
        self
    }
}

/// Generic or instances node after label formatting
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedNonGroupingNode {
    pub key: HierarchyNodeKey,
    pub label: String,
    pub parent_keys: Vec<HierarchyNodeKey>,
    pub children: Option<bool>,
    pub auto_expand: bool,
    pub supports_filtering: bool,
    pub extended_data: Option<Map<String, Value>>,
    pub processing: NodeProcessingParams,
    pub filtering: Option<NodeFilteringInfo>,
    /// Requested base classes the node's class derives from, as declared
    pub base_classes: Vec<String>,
    /// Formatted value per requested property grouping level
    pub formatted_property_values: Vec<Option<String>>,
    pub order: NodeOrder,
}

impl ProcessedNonGroupingNode {
    /// Full class name of the first instance, for instance nodes
    pub fn class_name(&self) -> Option<&str> {
        self.key
            .instance_keys()
            .and_then(|keys| keys.first())
            .map(|k| k.class_name.as_str())
    }

    pub fn grouping(&self) -> Option<&GroupingParams> {
        match self.key {
            HierarchyNodeKey::Instances(_) => self.processing.grouping.as_ref(),
            _ => None,
        }
    }

    /// Parent-node view of this node, used when requesting its children
    pub fn to_parent_node(&self) -> HierarchyNode {
        HierarchyNode {
            key: self.key.clone(),
            label: self.label.clone(),
            parent_keys: self.parent_keys.clone(),
            children: true,
            auto_expand: self.auto_expand,
            supports_filtering: self.supports_filtering,
            extended_data: self.extended_data.clone(),
            filtering: self.filtering.clone(),
            grouping: None,
        }
    }
}

/// Grouping node with its grouped children
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedGroupingNode {
    pub key: GroupingNodeKey,
    pub label: String,
    pub parent_keys: Vec<HierarchyNodeKey>,
    /// Union of instance keys beneath this node, without duplicates
    pub grouped_instance_keys: Vec<InstanceKey>,
    pub children: Vec<ProcessedHierarchyNode>,
    /// Closest non-grouping ancestor; `None` at the root level
    pub non_grouping_ancestor: Option<Box<HierarchyNode>>,
    pub auto_expand: bool,
    pub order: NodeOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessedHierarchyNode {
    NonGrouping(ProcessedNonGroupingNode),
    Grouping(ProcessedGroupingNode),
}

impl ProcessedHierarchyNode {
    pub fn key(&self) -> HierarchyNodeKey {
        match self {
            Self::NonGrouping(node) => node.key.clone(),
            Self::Grouping(node) => HierarchyNodeKey::Grouping(node.key.clone()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::NonGrouping(node) => &node.label,
            Self::Grouping(node) => &node.label,
        }
    }

    pub fn order(&self) -> &NodeOrder {
        match self {
            Self::NonGrouping(node) => &node.order,
            Self::Grouping(node) => &node.order,
        }
    }

    pub fn parent_keys(&self) -> &[HierarchyNodeKey] {
        match self {
            Self::NonGrouping(node) => &node.parent_keys,
            Self::Grouping(node) => &node.parent_keys,
        }
    }

    /// Re-parent the node, updating the ancestor keys of everything below it
    pub fn set_parent_keys(&mut self, parent_keys: Vec<HierarchyNodeKey>) {
        match self {
            Self::NonGrouping(node) => node.parent_keys = parent_keys,
            Self::Grouping(node) => {
                let mut child_keys = parent_keys.clone();
                child_keys.push(HierarchyNodeKey::Grouping(node.key.clone()));
                for child in node.children.iter_mut() {
                    child.set_parent_keys(child_keys.clone());
                }
                node.parent_keys = parent_keys;
            }
        }
    }

    pub fn as_non_grouping(&self) -> Option<&ProcessedNonGroupingNode> {
        match self {
            Self::NonGrouping(node) => Some(node),
            Self::Grouping(_) => None,
        }
    }

    pub fn filtering(&self) -> Option<&NodeFilteringInfo> {
        match self {
            Self::NonGrouping(node) => node.filtering.as_ref(),
            Self::Grouping(_) => None,
        }
    }

    /// Instance keys represented by the node
    pub fn instance_keys(&self) -> Vec<InstanceKey> {
        match self {
            Self::NonGrouping(node) => node
                .key
                .instance_keys()
                .map(|keys| keys.to_vec())
                .unwrap_or_default(),
            Self::Grouping(node) => node.grouped_instance_keys.clone(),
        }
    }
}

/// Grouping-specific part of a finalized node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupingNodeInfo {
    pub grouped_instance_keys: Vec<InstanceKey>,
    pub non_grouping_ancestor: Option<Box<HierarchyNode>>,
}

/// Finalized node, as returned to consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub key: HierarchyNodeKey,
    pub label: String,
    pub parent_keys: Vec<HierarchyNodeKey>,
    /// Whether the node has children
    pub children: bool,
    #[serde(default)]
    pub auto_expand: bool,
    #[serde(default)]
    pub supports_filtering: bool,
    #[serde(default)]
    pub extended_data: Option<Map<String, Value>>,
    #[serde(default)]
    pub filtering: Option<NodeFilteringInfo>,
    #[serde(default)]
    pub grouping: Option<GroupingNodeInfo>,
}

impl HierarchyNode {
    pub fn is_grouping_node(&self) -> bool {
        self.key.is_grouping()
    }

    /// `true` iff some filtering path ends exactly at this node
    pub fn is_filter_target(&self) -> bool {
        self.filtering
            .as_ref()
            .map(|f| f.is_filter_target)
            .unwrap_or(false)
    }

    /// Keys from the root down to and including this node
    pub fn key_path(&self) -> Vec<HierarchyNodeKey> {
        let mut path = self.parent_keys.clone();
        path.push(self.key.clone());
        path
    }

    pub fn from_processed(node: ProcessedHierarchyNode, children: bool) -> Self {
        match node {
            ProcessedHierarchyNode::NonGrouping(node) => HierarchyNode {
                key: node.key,
                label: node.label,
                parent_keys: node.parent_keys,
                children,
                auto_expand: node.auto_expand,
                supports_filtering: node.supports_filtering,
                extended_data: node.extended_data,
                filtering: node.filtering,
                grouping: None,
            },
            ProcessedHierarchyNode::Grouping(node) => HierarchyNode {
                key: HierarchyNodeKey::Grouping(node.key),
                label: node.label,
                parent_keys: node.parent_keys,
                children,
                auto_expand: node.auto_expand,
                supports_filtering: false,
                extended_data: None,
                filtering: None,
                grouping: Some(GroupingNodeInfo {
                    grouped_instance_keys: node.grouped_instance_keys,
                    non_grouping_ancestor: node.non_grouping_ancestor,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::keys::GroupingNodeKey;

    fn leaf(id: &str) -> ProcessedHierarchyNode {
        ProcessedHierarchyNode::NonGrouping(ProcessedNonGroupingNode {
            key: HierarchyNodeKey::instances(vec![InstanceKey::new("A", id)]),
            label: id.to_string(),
            parent_keys: vec![],
            children: None,
            auto_expand: false,
            supports_filtering: false,
            extended_data: None,
            processing: NodeProcessingParams::default(),
            filtering: None,
            base_classes: vec![],
            formatted_property_values: vec![],
            order: NodeOrder::new(0, 0),
        })
    }

    #[test]
    fn test_set_parent_keys_recurses_into_groups() {
        let group_key = GroupingNodeKey::Class {
            class_name: "A".into(),
        };
        let mut group = ProcessedHierarchyNode::Grouping(ProcessedGroupingNode {
            key: group_key.clone(),
            label: "A".into(),
            parent_keys: vec![],
            grouped_instance_keys: vec![InstanceKey::new("A", "1")],
            children: vec![leaf("1")],
            non_grouping_ancestor: None,
            auto_expand: false,
            order: NodeOrder::new(0, 0),
        });
        let root = HierarchyNodeKey::generic("root");
        group.set_parent_keys(vec![root.clone()]);

        let ProcessedHierarchyNode::Grouping(group) = group else {
            panic!("expected grouping node");
        };
        assert_eq!(group.parent_keys, vec![root.clone()]);
        assert_eq!(
            group.children[0].parent_keys(),
            &[root, HierarchyNodeKey::Grouping(group_key)]
        );
    }

    #[test]
    fn test_nested_order_sorts_after_parent_siblings() {
        let hidden = NodeOrder::new(0, 1);
        let promoted = hidden.nested(&NodeOrder::new(0, 0));
        assert!(NodeOrder::new(0, 0) < promoted);
        assert!(promoted < NodeOrder::new(0, 2));
    }
}
