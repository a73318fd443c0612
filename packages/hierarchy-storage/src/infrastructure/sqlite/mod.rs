//! SQLite adapter
//!
//! [`SqliteDataSource`] owns one connection shared by the query executor and
//! the class-hierarchy inspector it hands out.

mod class_hierarchy;
mod executor;
mod values;

pub use class_hierarchy::SqliteClassHierarchyInspector;
pub use executor::SqliteQueryExecutor;
pub use values::{register_functions, to_json_value, to_sql_value, IN_VIRTUAL_SET};

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;

#[derive(Clone)]
pub struct SqliteDataSource {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDataSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "sqlite data source opened");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        register_functions(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run schema or data statements
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    pub fn executor(&self) -> SqliteQueryExecutor {
        SqliteQueryExecutor::new(Arc::clone(&self.conn))
    }

    pub fn class_hierarchy(&self) -> SqliteClassHierarchyInspector {
        SqliteClassHierarchyInspector::new(Arc::clone(&self.conn))
    }
}
