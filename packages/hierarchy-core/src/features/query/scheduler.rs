//! Bounded-concurrency query admission
//!
//! Every submission waits for a semaphore permit before its executor stream
//! is created. The permit is held until the row stream ends or is dropped.
//! Tokio's semaphore is fair, so waiting submissions start in FIFO order.
//! Dropping a submission that has not started yet removes it from the queue
//! without ever touching the executor.

use futures::{stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

use super::ports::{HierarchyQuery, QueryExecutor, QueryReaderOptions, RowStream};
use crate::config::DEFAULT_QUERY_CONCURRENCY;
use crate::errors::HierarchyError;

/// Queue of row-stream submissions with at most `concurrency` running
#[derive(Clone)]
pub struct QueryScheduler {
    executor: Arc<dyn QueryExecutor>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
}

enum Submission {
    Pending {
        executor: Arc<dyn QueryExecutor>,
        semaphore: Arc<Semaphore>,
        query: HierarchyQuery,
        options: QueryReaderOptions,
    },
    Running {
        _permit: OwnedSemaphorePermit,
        rows: RowStream,
    },
}

impl QueryScheduler {
    pub fn new(executor: Arc<dyn QueryExecutor>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            executor,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    pub fn with_default_concurrency(executor: Arc<dyn QueryExecutor>) -> Self {
        Self::new(executor, DEFAULT_QUERY_CONCURRENCY)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Number of submissions currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.concurrency - self.semaphore.available_permits()
    }

    /// Submit a query. Nothing happens until the returned stream is polled.
    pub fn schedule(&self, query: &HierarchyQuery, options: QueryReaderOptions) -> RowStream {
        let submission = Submission::Pending {
            executor: Arc::clone(&self.executor),
            semaphore: Arc::clone(&self.semaphore),
            query: query.clone(),
            options,
        };

        stream::unfold(Some(submission), |submission| async move {
            let (permit, mut rows) = match submission? {
                Submission::Pending {
                    executor,
                    semaphore,
                    query,
                    options,
                } => {
                    trace!(query = %query.text, "query queued");
                    let permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return Some((
                                Err(HierarchyError::internal("query scheduler closed")),
                                None,
                            ))
                        }
                    };
                    debug!(query = %query.text, "query started");
                    (permit, executor.create_query_reader(&query, options))
                }
                Submission::Running { _permit, rows } => (_permit, rows),
            };

            match rows.next().await {
                Some(row) => Some((
                    row,
                    Some(Submission::Running {
                        _permit: permit,
                        rows,
                    }),
                )),
                None => {
                    debug!("query finished");
                    None
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::query::ports::Row;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks how many row streams are alive at once
    #[derive(Default)]
    struct Gauge {
        active: AtomicUsize,
        max_active: AtomicUsize,
        created: AtomicUsize,
    }

    struct ActiveGuard(Arc<Gauge>);

    impl Drop for ActiveGuard {
        fn drop(&mut self) {
            self.0.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct SlowExecutor {
        gauge: Arc<Gauge>,
    }

    impl QueryExecutor for SlowExecutor {
        fn create_query_reader(&self, query: &HierarchyQuery, _: QueryReaderOptions) -> RowStream {
            let gauge = Arc::clone(&self.gauge);
            gauge.created.fetch_add(1, Ordering::SeqCst);
            let now = gauge.active.fetch_add(1, Ordering::SeqCst) + 1;
            gauge.max_active.fetch_max(now, Ordering::SeqCst);

            let guard = ActiveGuard(gauge);
            let text = query.text.clone();
            let delay = text.len() as u64 * 3;
            stream::unfold((0, Some(guard)), move |(step, guard)| {
                let text = text.clone();
                async move {
                    if step == 2 {
                        drop(guard);
                        return None;
                    }
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Some((Ok(Row::from_values(vec![json!(text), json!(step)])), (step + 1, guard)))
                }
            })
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_at_most_n_queries_run_concurrently() {
        let gauge = Arc::new(Gauge::default());
        let scheduler = QueryScheduler::new(
            Arc::new(SlowExecutor {
                gauge: Arc::clone(&gauge),
            }),
            2,
        );

        let queries = ["a", "bbbb", "cc", "ddddd", "e"];
        let streams = queries.iter().map(|q| {
            scheduler
                .schedule(&HierarchyQuery::new(*q), QueryReaderOptions::default())
                .collect::<Vec<_>>()
        });
        let results = futures::future::join_all(streams).await;

        assert!(gauge.max_active.load(Ordering::SeqCst) <= 2);
        assert_eq!(gauge.created.load(Ordering::SeqCst), 5);
        for (query, rows) in queries.iter().zip(results) {
            assert_eq!(rows.len(), 2);
            for row in rows {
                assert_eq!(row.unwrap().get(0), Some(&json!(query)));
            }
        }
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_dropping_pending_submission_has_no_side_effects() {
        let gauge = Arc::new(Gauge::default());
        let scheduler = QueryScheduler::new(
            Arc::new(SlowExecutor {
                gauge: Arc::clone(&gauge),
            }),
            1,
        );

        let mut running = scheduler.schedule(&HierarchyQuery::new("a"), QueryReaderOptions::default());
        assert!(running.next().await.is_some());
        assert_eq!(scheduler.in_flight(), 1);

        let mut pending = scheduler.schedule(&HierarchyQuery::new("b"), QueryReaderOptions::default());
        let waited = tokio::time::timeout(Duration::from_millis(20), pending.next()).await;
        assert!(waited.is_err());
        drop(pending);

        assert_eq!(gauge.created.load(Ordering::SeqCst), 1);
        drop(running);
        assert_eq!(scheduler.in_flight(), 0);

        let rows: Vec<_> = scheduler
            .schedule(&HierarchyQuery::new("c"), QueryReaderOptions::default())
            .collect()
            .await;
        assert_eq!(rows.len(), 2);
    }
}
