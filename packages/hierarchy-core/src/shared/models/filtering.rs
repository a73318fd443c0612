//! Filtering path model and per-node filtering annotations

use serde::{Deserialize, Serialize};

use super::keys::{GroupingKind, HierarchyNodeKey, InstanceKey};

/// One step of a filtering path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeIdentifier {
    Generic {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    Instance(InstanceKey),
}

impl NodeIdentifier {
    pub fn generic(id: impl Into<String>) -> Self {
        NodeIdentifier::Generic {
            id: id.into(),
            source: None,
        }
    }

    pub fn instance(class_name: impl Into<String>, id: impl Into<String>) -> Self {
        NodeIdentifier::Instance(InstanceKey::new(class_name, id))
    }

    /// Whether a node with the given key is the node this identifier points at
    pub fn matches_key(&self, key: &HierarchyNodeKey) -> bool {
        match (self, key) {
            (NodeIdentifier::Generic { id, source }, HierarchyNodeKey::Generic(key)) => {
                id == &key.id
                    && match (source, &key.source) {
                        (Some(lhs), Some(rhs)) => lhs == rhs,
                        _ => true,
                    }
            }
            (NodeIdentifier::Instance(identifier), HierarchyNodeKey::Instances(keys)) => {
                keys.iter().any(|k| k.matches(identifier))
            }
            _ => false,
        }
    }
}

/// How much of the hierarchy to auto-expand on the way to a filter target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealMode {
    /// Don't auto-expand
    #[default]
    Off,
    /// Expand every node before the target, including grouping nodes
    Full,
    /// Expand nodes whose position in the path is below the given depth
    UntilDepth(usize),
    /// Expand grouping nodes above the target until the grouping node of the
    /// given kind at the given grouping depth (that node stays collapsed)
    UntilGrouping { kind: GroupingKind, depth: usize },
}

/// A root-to-target identifier path with its options
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilteringPath {
    pub path: Vec<NodeIdentifier>,
    #[serde(default)]
    pub reveal: RevealMode,
}

impl FilteringPath {
    pub fn new(path: Vec<NodeIdentifier>) -> Self {
        Self {
            path,
            reveal: RevealMode::Off,
        }
    }

    pub fn with_reveal(mut self, reveal: RevealMode) -> Self {
        self.reveal = reveal;
        self
    }
}

/// Remainder of a filtering path below some node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathTail {
    pub remaining: Vec<NodeIdentifier>,
    /// Position of `remaining[0]` in the original path
    pub depth: usize,
    pub reveal: RevealMode,
}

impl From<&FilteringPath> for PathTail {
    fn from(path: &FilteringPath) -> Self {
        Self {
            remaining: path.path.clone(),
            depth: 0,
            reveal: path.reveal,
        }
    }
}

/// Filter target reveal request attached to a target node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetReveal {
    pub mode: RevealMode,
    /// Position of the target in its path
    pub depth: usize,
}

impl TargetReveal {
    /// Whether a grouping node above the target should expand, given the
    /// grouping kinds from the outermost grouping node down to it
    pub fn expands_grouping(&self, chain: &[GroupingKind]) -> bool {
        match self.mode {
            RevealMode::Off => false,
            RevealMode::Full => true,
            RevealMode::UntilDepth(depth) => self.depth < depth,
            RevealMode::UntilGrouping { kind, depth } => {
                !(chain.len() > depth && chain[depth] == kind)
            }
        }
    }
}

/// Filtering annotations on a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeFilteringInfo {
    /// Some filtering path ends exactly at this node
    pub is_filter_target: bool,
    /// Reveal requests of the paths ending at this node
    pub target_reveals: Vec<TargetReveal>,
    /// Some revealing path passes through this node towards a deeper target
    pub on_revealed_path: bool,
    /// Paths continuing below this node
    pub filtered_children_paths: Vec<PathTail>,
    /// An ancestor is a filter target, so this node's subtree is unfiltered
    pub has_filter_target_ancestor: bool,
}

impl NodeFilteringInfo {
    /// Whether grouping nodes created above this node should auto-expand
    pub fn expands_grouping(&self, chain: &[GroupingKind]) -> bool {
        self.on_revealed_path || self.target_reveals.iter().any(|r| r.expands_grouping(chain))
    }

    /// Merge annotations of two nodes that turned into one
    pub fn merge(&mut self, other: &NodeFilteringInfo) {
        self.is_filter_target |= other.is_filter_target;
        self.on_revealed_path |= other.on_revealed_path;
        self.has_filter_target_ancestor |= other.has_filter_target_ancestor;
        for reveal in &other.target_reveals {
            if !self.target_reveals.contains(reveal) {
                self.target_reveals.push(*reveal);
            }
        }
        for tail in &other.filtered_children_paths {
            if !self.filtered_children_paths.contains(tail) {
                self.filtered_children_paths.push(tail.clone());
            }
        }
    }
}
