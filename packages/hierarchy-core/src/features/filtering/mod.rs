//! Filtering slice: restricts a hierarchy to nodes on identifier paths

mod definition;

pub use definition::{filtering_info, FilteringHierarchyDefinition};
