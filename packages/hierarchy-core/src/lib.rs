/*
 * Hierarchy Core - tree nodes over tabular data sources
 *
 * Feature-First Architecture:
 * - shared/      : Common models (keys, labels, nodes, filtering paths)
 * - features/    : Vertical slices (query → definition → filtering → grouping → cache)
 * - config/      : Provider configuration
 * - errors       : Crate-wide error type
 *
 * Orchestration of the slices into a streaming provider lives in
 * `hierarchy-orchestration`.
 */

#![allow(clippy::type_complexity)] // Boxed stream types
#![allow(clippy::module_inception)] // Module naming intentional

// ═══════════════════════════════════════════════════════════════════════════
// Module Exports - Feature-First Architecture
// ═══════════════════════════════════════════════════════════════════════════

/// Shared models
pub mod shared;

/// Feature modules
pub mod features;

/// Configuration system
pub mod config;

/// Error types
pub mod errors;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports for Public API
// ═══════════════════════════════════════════════════════════════════════════

pub use config::{HierarchyProviderConfig, LocalizedStrings};
pub use errors::{ErrorCategory, HierarchyError, Result};
pub use features::definition::{
    DefineHierarchyLevelProps, HierarchyDefinition, HierarchyDefinitionRef,
    HierarchyLevelDefinition, InstanceFilter,
};
pub use features::filtering::FilteringHierarchyDefinition;
pub use features::formatting::{ClassHierarchyInspector, DefaultValueFormatter, ValueFormatter};
pub use features::query::{
    HierarchyQuery, QueryBinding, QueryExecutor, QueryReaderOptions, QueryScheduler, Row,
    RowFormat, RowStream,
};
pub use shared::models::{
    FilteringPath, HierarchyNode, HierarchyNodeKey, InstanceKey, NodeIdentifier, RevealMode,
    SourceNode,
};
