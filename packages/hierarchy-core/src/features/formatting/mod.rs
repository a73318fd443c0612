//! Formatting slice: value formatter and class-hierarchy inspector ports

pub mod class_hierarchy;
pub mod formatter;

pub use class_hierarchy::{
    CachingClassHierarchyInspector, ClassHierarchyInspector, ExactClassInspector,
};
pub use formatter::{format_label, DefaultValueFormatter, ValueFormatter};
