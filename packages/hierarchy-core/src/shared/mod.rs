//! Shared module - Common types used by every feature
//!
//! Node keys, node lifecycle shapes, processing parameters and filtering
//! annotations. Nothing here performs I/O.

pub mod models;

// Re-exports for convenience
pub use models::*;
