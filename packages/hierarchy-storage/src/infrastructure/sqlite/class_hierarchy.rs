//! Class-hierarchy inspector over a `class_hierarchy(derived, base)` table
//!
//! The table lists direct base classes; derivation is resolved transitively.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::sync::Arc;

use hierarchy_core::errors::Result;
use hierarchy_core::features::formatting::ClassHierarchyInspector;

use crate::error::StorageError;

const DERIVES_FROM: &str = "\
    WITH RECURSIVE bases(name) AS ( \
        SELECT ?1 \
        UNION \
        SELECT ch.base FROM class_hierarchy ch JOIN bases b ON ch.derived = b.name \
    ) \
    SELECT EXISTS (SELECT 1 FROM bases WHERE name = ?2)";

pub struct SqliteClassHierarchyInspector {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteClassHierarchyInspector {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ClassHierarchyInspector for SqliteClassHierarchyInspector {
    async fn derives_from(&self, derived: &str, base: &str) -> Result<bool> {
        if derived == base {
            return Ok(true);
        }
        let conn = Arc::clone(&self.conn);
        let (derived, base) = (derived.to_string(), base.to_string());
        let answer = tokio::task::spawn_blocking(move || -> std::result::Result<bool, StorageError> {
            let conn = conn.lock();
            Ok(conn.query_row(DERIVES_FROM, params![derived, base], |row| row.get(0))?)
        })
        .await
        .map_err(StorageError::from)??;
        Ok(answer)
    }
}
