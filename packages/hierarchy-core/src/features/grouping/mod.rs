//! Grouping slice

mod engine;

pub use engine::{class_label, find_grouping_node, group_nodes, grouping_nodes, GroupingContext};
