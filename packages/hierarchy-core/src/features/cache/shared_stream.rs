//! Multicast stream with replay
//!
//! A [`SharedStream`] pulls its source lazily, buffers every item (errors
//! included) and lets any number of subscribers read the buffer from the
//! start. A subscriber arriving after a failure sees the same items followed
//! by the same error.
//!
//! When the last subscriber goes away before the source is exhausted the
//! source is dropped, which releases whatever the source holds (e.g. a query
//! slot). Such a stream is *abandoned* and must not be handed out again.
//! A [`SharedStream::resumable`] stream keeps its source once it produced an
//! item, and the next subscriber picks up where the last one stopped.

use futures::lock::Mutex;
use futures::stream::{self, BoxStream, Stream};
use futures::StreamExt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::errors::{HierarchyError, Result};

struct ReplayState<T> {
    source: Option<BoxStream<'static, Result<T>>>,
    buffer: Vec<Result<T>>,
}

struct Shared<T> {
    state: Mutex<ReplayState<T>>,
    subscribers: AtomicUsize,
    abandoned: AtomicBool,
    resumable: bool,
}

pub struct SharedStream<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for SharedStream<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> SharedStream<T> {
    pub fn new(source: BoxStream<'static, Result<T>>) -> Self {
        Self::with_state(Some(source), Vec::new(), false)
    }

    /// Stream whose source holds nothing worth releasing after its first
    /// item, e.g. one that reads all of its queries before yielding
    pub fn resumable(source: BoxStream<'static, Result<T>>) -> Self {
        Self::with_state(Some(source), Vec::new(), true)
    }

    /// Already-complete stream over known items
    pub fn completed(items: Vec<T>) -> Self {
        Self::with_state(None, items.into_iter().map(Ok).collect(), false)
    }

    fn with_state(
        source: Option<BoxStream<'static, Result<T>>>,
        buffer: Vec<Result<T>>,
        resumable: bool,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ReplayState { source, buffer }),
                subscribers: AtomicUsize::new(0),
                abandoned: AtomicBool::new(false),
                resumable,
            }),
        }
    }

    pub fn is_abandoned(&self) -> bool {
        self.shared.abandoned.load(Ordering::SeqCst)
    }

    /// Read the stream from its first item
    pub fn subscribe(&self) -> BoxStream<'static, Result<T>> {
        self.shared.subscribers.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let replay = stream::unfold((Arc::clone(&shared), 0usize), |(shared, index)| async move {
            let mut state = shared.state.lock().await;
            if let Some(item) = state.buffer.get(index) {
                let item = item.clone();
                drop(state);
                return Some((item, (shared, index + 1)));
            }
            let next = match state.source.as_mut() {
                Some(source) => source.next().await,
                None if shared.abandoned.load(Ordering::SeqCst) => Some(Err(
                    HierarchyError::internal("shared stream was abandoned before completion"),
                )),
                None => None,
            };
            match next {
                Some(item) => {
                    if item.is_err() {
                        state.source = None;
                    }
                    if !shared.abandoned.load(Ordering::SeqCst) {
                        state.buffer.push(item.clone());
                    }
                    drop(state);
                    Some((item, (shared, index + 1)))
                }
                None => {
                    state.source = None;
                    None
                }
            }
        });
        Subscription {
            inner: Some(replay.boxed()),
            shared,
        }
        .boxed()
    }
}

struct Subscription<T> {
    inner: Option<BoxStream<'static, Result<T>>>,
    shared: Arc<Shared<T>>,
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut() {
            Some(inner) => inner.as_mut().poll_next(cx),
            None => Poll::Ready(None),
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        // release a possibly held state lock first
        self.inner.take();
        if self.shared.subscribers.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }
        if let Some(mut state) = self.shared.state.try_lock() {
            if self.shared.resumable && !state.buffer.is_empty() {
                return;
            }
            if state.source.take().is_some() {
                self.shared.abandoned.store(true, Ordering::SeqCst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counted(items: Vec<Result<u32>>, pulls: Arc<AtomicUsize>) -> BoxStream<'static, Result<u32>> {
        stream::iter(items)
            .inspect(move |_| {
                pulls.fetch_add(1, Ordering::SeqCst);
            })
            .boxed()
    }

    #[tokio::test]
    async fn test_second_subscriber_replays_without_pulling_source() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let shared = SharedStream::new(counted(vec![Ok(1), Ok(2), Ok(3)], pulls.clone()));

        let first: Vec<_> = shared.subscribe().collect().await;
        let second: Vec<_> = shared.subscribe().collect().await;

        assert_eq!(first, vec![Ok(1), Ok(2), Ok(3)]);
        assert_eq!(first, second);
        assert_eq!(pulls.load(Ordering::SeqCst), 3);
        assert!(!shared.is_abandoned());
    }

    #[tokio::test]
    async fn test_failure_is_replayed() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let shared = SharedStream::new(counted(
            vec![Ok(1), Err(HierarchyError::execution("boom")), Ok(3)],
            pulls,
        ));

        let first: Vec<_> = shared.subscribe().collect().await;
        let second: Vec<_> = shared.subscribe().collect().await;

        assert_eq!(first, vec![Ok(1), Err(HierarchyError::execution("boom"))]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_interleaved_subscribers_see_same_items() {
        let shared = SharedStream::new(stream::iter(vec![Ok(1u32), Ok(2)]).boxed());
        let mut a = shared.subscribe();
        let mut b = shared.subscribe();

        assert_eq!(a.next().await, Some(Ok(1)));
        assert_eq!(b.next().await, Some(Ok(1)));
        assert_eq!(b.next().await, Some(Ok(2)));
        assert_eq!(a.next().await, Some(Ok(2)));
        assert_eq!(a.next().await, None);
        assert_eq!(b.next().await, None);
    }

    #[tokio::test]
    async fn test_partial_read_abandons_source() {
        let shared = SharedStream::new(stream::iter(vec![Ok(1u32), Ok(2)]).boxed());
        let mut only = shared.subscribe();
        assert_eq!(only.next().await, Some(Ok(1)));
        drop(only);
        assert!(shared.is_abandoned());
    }

    #[tokio::test]
    async fn test_resumable_source_survives_partial_read() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let shared = SharedStream::resumable(counted(vec![Ok(1), Ok(2), Ok(3)], pulls.clone()));
        let mut first = shared.subscribe();
        assert_eq!(first.next().await, Some(Ok(1)));
        drop(first);
        assert!(!shared.is_abandoned());

        let rest: Vec<_> = shared.subscribe().collect().await;
        assert_eq!(rest, vec![Ok(1), Ok(2), Ok(3)]);
        assert_eq!(pulls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_resumable_source_dropped_before_first_item_is_abandoned() {
        let shared = SharedStream::resumable(stream::iter(vec![Ok(1u32)]).boxed());
        drop(shared.subscribe());
        // never polled, so there is nothing to resume from
        assert!(shared.is_abandoned());
    }

    #[tokio::test]
    async fn test_completed_stream() {
        let shared = SharedStream::completed(vec![7u32, 8]);
        let items: Vec<_> = shared.subscribe().collect().await;
        assert_eq!(items, vec![Ok(7), Ok(8)]);
    }
}
