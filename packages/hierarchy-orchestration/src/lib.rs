/*
 * Hierarchy Orchestration - level pipeline and providers
 *
 * Turns hierarchy definitions and a query executor into streams of
 * finalized tree nodes.
 *
 * Architecture:
 * - Level pipeline (source → initialize → pre-process → grouping → finalize)
 * - Level request state machine (per-request stage tracking)
 * - Provider (definition/formatter/cache snapshot per request)
 * - Provider merge (ownership-based routing)
 * - Observability (counters, optional Prometheus export)
 */

// Public modules
pub mod merge;
pub mod metrics;
pub mod pipeline;
pub mod provider;
pub mod request;
pub mod stages;

// Re-exports
pub use merge::MergedHierarchyProvider;
pub use metrics::{MetricsSnapshot, ProviderMetrics};
pub use pipeline::PipelineContext;
pub use provider::{
    DataSourceChanged, GetNodeInstanceKeysProps, GetNodesProps, HierarchyChangedEvent,
    HierarchyOrchestrator, HierarchyProvider, HierarchyProviderProps,
};
pub use request::{LevelRequest, LevelRequestState, LevelRequestStateMachine, StageId};
