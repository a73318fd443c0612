//! SQLite query executor
//!
//! Each reader runs its statement on a blocking task and hands rows over a
//! bounded channel. Nothing runs until the returned stream is first polled;
//! dropping the stream closes the channel, which stops the statement at the
//! next row.

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use hierarchy_core::errors::HierarchyError;
use hierarchy_core::features::query::{
    HierarchyQuery, QueryExecutor, QueryReaderOptions, Row, RowFormat, RowStream,
};

use super::values::{to_json_value, to_sql_value};
use crate::error::Result;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

type RowSender = mpsc::Sender<hierarchy_core::errors::Result<Row>>;

pub struct SqliteQueryExecutor {
    conn: Arc<Mutex<Connection>>,
    channel_capacity: usize,
}

impl SqliteQueryExecutor {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Rows buffered ahead of the consumer
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// Outcome of a reader's blocking loop
enum Completion {
    Exhausted(usize),
    LimitExceeded(usize),
    Abandoned(usize),
}

fn run_query(
    conn: &Connection,
    query: &HierarchyQuery,
    options: QueryReaderOptions,
    rows_out: &RowSender,
) -> Result<Completion> {
    let sql = query.full_text();
    let params = query
        .bindings
        .iter()
        .map(to_sql_value)
        .collect::<Result<Vec<_>>>()?;

    let mut statement = conn.prepare(&sql)?;
    let columns: Arc<[String]> = match options.row_format {
        RowFormat::ColumnNames => statement
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>()
            .into(),
        RowFormat::Indexes => Arc::from(Vec::new()),
    };
    let column_count = statement.column_count();

    let mut rows = statement.query(params_from_iter(params.iter()))?;
    let mut produced = 0usize;
    while let Some(row) = rows.next()? {
        produced += 1;
        if let Some(limit) = options.row_limit {
            if produced > limit {
                // receiver may be gone already
                let _ = rows_out.blocking_send(Err(HierarchyError::RowsLimitExceeded { limit }));
                return Ok(Completion::LimitExceeded(limit));
            }
        }

        let mut values = Vec::with_capacity(column_count);
        for index in 0..column_count {
            values.push(to_json_value(row.get_ref(index)?));
        }
        if rows_out
            .blocking_send(Ok(Row::new(Arc::clone(&columns), values)))
            .is_err()
        {
            return Ok(Completion::Abandoned(produced));
        }
    }
    Ok(Completion::Exhausted(produced))
}

impl QueryExecutor for SqliteQueryExecutor {
    fn create_query_reader(&self, query: &HierarchyQuery, options: QueryReaderOptions) -> RowStream {
        let conn = Arc::clone(&self.conn);
        let query = query.clone();
        let capacity = self.channel_capacity;

        stream::once(async move {
            let (tx, rx) = mpsc::channel(capacity);
            tokio::task::spawn_blocking(move || {
                // one statement at a time per connection
                let conn = conn.lock();
                trace!(sql = %query.text, bindings = query.bindings.len(), "sqlite query started");
                match run_query(&conn, &query, options, &tx) {
                    Ok(Completion::Exhausted(rows)) => {
                        debug!(rows, "sqlite query finished")
                    }
                    Ok(Completion::LimitExceeded(limit)) => {
                        debug!(limit, "sqlite query stopped at row limit")
                    }
                    Ok(Completion::Abandoned(rows)) => {
                        debug!(rows, "sqlite query abandoned by consumer")
                    }
                    Err(e) => {
                        debug!(error = %e, "sqlite query failed");
                        let _ = tx.blocking_send(Err(e.into()));
                    }
                }
            });
            stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|row| (row, rx))
            })
        })
        .flatten()
        .boxed()
    }
}
