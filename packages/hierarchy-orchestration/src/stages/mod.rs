// Stage implementations
pub mod finalize_stage;
pub mod grouping_stage;
pub mod initialize_stage;
pub mod preprocess_stage;
pub mod source_stage;

// Re-exports
pub use finalize_stage::{finalize, sort_level};
pub use grouping_stage::group;
pub use initialize_stage::{initialize, initialize_node};
pub use preprocess_stage::pre_process;
pub use source_stage::{source, SourcedNode};
