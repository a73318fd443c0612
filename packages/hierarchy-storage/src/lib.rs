//! Hierarchy Storage - data source adapters
//!
//! Implements the query executor and class-hierarchy inspector ports of
//! `hierarchy-core` over SQLite.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hierarchy_storage::SqliteDataSource;
//!
//! let source = SqliteDataSource::open("model.db")?;
//! let props = HierarchyProviderProps::new(Arc::new(source.executor()), definition)
//!     .with_class_hierarchy(Arc::new(source.class_hierarchy()));
//! let provider = HierarchyOrchestrator::new(props)?;
//! ```
//!
//! Instance queries may restrict ids with `InVirtualSet(?, id)`, where the
//! binding is an id set (bound as a JSON array of id strings).

pub mod error;

#[cfg(feature = "sqlite")]
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

#[cfg(feature = "sqlite")]
pub use infrastructure::{SqliteClassHierarchyInspector, SqliteDataSource, SqliteQueryExecutor};
