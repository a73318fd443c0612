//! Shared models

pub mod filtering;
pub mod keys;
mod node;
pub mod processing;
pub mod values;

pub use filtering::{
    FilteringPath, NodeFilteringInfo, NodeIdentifier, PathTail, RevealMode, TargetReveal,
};
pub use keys::{
    GenericNodeKey, GroupingKind, GroupingNodeKey, HierarchyNodeKey, InstanceKey,
    PropertyIdentifier, RangeBound,
};
pub use node::{
    GroupingNodeInfo, HierarchyNode, NodeOrder, ProcessedGroupingNode, ProcessedHierarchyNode,
    ProcessedNonGroupingNode, SourceNode,
};
pub use processing::{
    BaseClassGroupingParams, ClassGroupingParams, GroupingAutoExpand, GroupingOptions,
    GroupingParams, LabelGroupingAction, LabelGroupingParams, NodeProcessingParams,
    PropertiesGroupingParams, PropertyGroup, PropertyRange,
};
pub use values::{ConcatenatedValuePart, NodeLabel, PrimitiveValue};
