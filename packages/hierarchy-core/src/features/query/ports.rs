//! Query executor port
//!
//! The data source is reached only through [`QueryExecutor`]. Queries are
//! opaque text plus ordered bindings; the executor owns the query language.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::errors::Result;

/// Lazy, single-pass sequence of rows
pub type RowStream = BoxStream<'static, Result<Row>>;

/// Query parameter, bound positionally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum QueryBinding {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Id(String),
    IdSet(Vec<String>),
    String(String),
    Point2d { x: f64, y: f64 },
    Point3d { x: f64, y: f64, z: f64 },
}

/// Query text with common table expressions and bindings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyQuery {
    /// CTE definitions (`name(cols) AS (...)`), prepended in a `WITH RECURSIVE` clause
    #[serde(default)]
    pub ctes: Vec<String>,
    pub text: String,
    #[serde(default)]
    pub bindings: Vec<QueryBinding>,
}

impl HierarchyQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            ctes: Vec::new(),
            text: text.into(),
            bindings: Vec::new(),
        }
    }

    pub fn with_cte(mut self, cte: impl Into<String>) -> Self {
        self.ctes.push(cte.into());
        self
    }

    pub fn with_binding(mut self, binding: QueryBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Executable text, CTEs included
    pub fn full_text(&self) -> String {
        if self.ctes.is_empty() {
            self.text.clone()
        } else {
            format!("WITH RECURSIVE {} {}", self.ctes.join(", "), self.text)
        }
    }
}

/// How rows should be addressed by the consumer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowFormat {
    /// Positional access only
    #[default]
    Indexes,
    /// Rows also carry column names
    ColumnNames,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryReaderOptions {
    /// Fail with `RowsLimitExceeded` once more rows than this are produced
    pub row_limit: Option<usize>,
    pub row_format: RowFormat,
}

/// One result row, addressable by column index or name
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Row without column names
    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            columns: Arc::from(Vec::new()),
            values,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|i| self.values.get(i))
    }

    pub fn has_column_names(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// Injected query-execution capability
///
/// Implementations must be lazy: no work may start before the returned
/// stream is first polled, and dropping the stream must stop the query.
pub trait QueryExecutor: Send + Sync {
    fn create_query_reader(&self, query: &HierarchyQuery, options: QueryReaderOptions)
        -> RowStream;
}

impl<T: QueryExecutor + ?Sized> QueryExecutor for Arc<T> {
    fn create_query_reader(
        &self,
        query: &HierarchyQuery,
        options: QueryReaderOptions,
    ) -> RowStream {
        (**self).create_query_reader(query, options)
    }
}
