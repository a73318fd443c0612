//! Row-limit enforcement over any executor

use futures::future;
use futures::StreamExt;
use std::sync::Arc;

use super::ports::{HierarchyQuery, QueryExecutor, QueryReaderOptions, RowStream};
use crate::errors::HierarchyError;

/// Executor decorator failing a row stream with `RowsLimitExceeded` once
/// more than the requested (or default) number of rows was produced
pub struct LimitingQueryExecutor {
    inner: Arc<dyn QueryExecutor>,
    default_limit: Option<usize>,
}

impl LimitingQueryExecutor {
    pub fn new(inner: Arc<dyn QueryExecutor>) -> Self {
        Self {
            inner,
            default_limit: None,
        }
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = Some(limit);
        self
    }
}

impl QueryExecutor for LimitingQueryExecutor {
    fn create_query_reader(
        &self,
        query: &HierarchyQuery,
        options: QueryReaderOptions,
    ) -> RowStream {
        let limit = options.row_limit.or(self.default_limit);
        let rows = self.inner.create_query_reader(
            query,
            QueryReaderOptions {
                row_limit: limit,
                ..options
            },
        );
        let Some(limit) = limit else {
            return rows;
        };

        rows.enumerate()
            .map(move |(index, row)| {
                if index >= limit {
                    Err(HierarchyError::RowsLimitExceeded { limit })
                } else {
                    row
                }
            })
            .scan(false, |failed, row| {
                if *failed {
                    return future::ready(None);
                }
                *failed = row.is_err();
                future::ready(Some(row))
            })
            .boxed()
    }
}
