//! Infrastructure layer - Data source adapters

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteClassHierarchyInspector, SqliteDataSource, SqliteQueryExecutor};
