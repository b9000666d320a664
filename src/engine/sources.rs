// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Sequence constructors and adapters from host-native producers.
//!
//! * Collections: [`from_iter`], [`once`], [`empty`], [`range`]
//! * Factories: [`produce`], [`produce_async`]
//! * Async generators: [`from_stream`], [`try_from_stream`]
//! * Push-style producers (observables, callbacks): [`from_push`]
//! * Failure: [`fail`]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::engine::cursor::{sequence, Producer, ProducerCursor};
use crate::engine::queue::BoundedQueue;
use crate::engine::task::BackgroundTask;
use crate::errors::{SequenceError, SequenceResult};
use crate::traits::{Element, SequenceRef, StopFuture};

struct Items<T> {
    items: Arc<Vec<T>>,
    position: AtomicUsize,
}

#[async_trait]
impl<T: Element> Producer<T> for Items<T> {
    async fn next(&self, _cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        let index = self.position.fetch_add(1, Ordering::AcqRel);
        Ok(self.items.get(index).cloned())
    }
}

/// Collection to sequence. Every start replays the same items.
pub fn from_iter<T, I>(items: I) -> SequenceRef<T>
where
    T: Element,
    I: IntoIterator<Item = T>,
{
    let items: Arc<Vec<T>> = Arc::new(items.into_iter().collect());
    sequence(move |_| {
        ProducerCursor::boxed(
            "from_iter",
            Items {
                items: items.clone(),
                position: AtomicUsize::new(0),
            },
        )
    })
}

pub fn once<T: Element>(value: T) -> SequenceRef<T> {
    from_iter([value])
}

pub fn empty<T: Element>() -> SequenceRef<T> {
    from_iter(Vec::new())
}

/// `count` consecutive integers starting at `start`.
pub fn range(start: i64, count: usize) -> SequenceRef<i64> {
    produce_indexed(count, move |i| start + i as i64)
}

struct Failing {
    error: SequenceError,
}

#[async_trait]
impl<T: Element> Producer<T> for Failing {
    async fn next(&self, _cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        Err(self.error.clone())
    }
}

/// A sequence whose first `advance` fails with `error`.
pub fn fail<T: Element>(error: SequenceError) -> SequenceRef<T> {
    sequence(move |_| {
        ProducerCursor::boxed(
            "fail",
            Failing {
                error: error.clone(),
            },
        )
    })
}

struct Generated<F> {
    remaining: usize,
    produced: AtomicUsize,
    factory: Arc<F>,
}

#[async_trait]
impl<T, F> Producer<T> for Generated<F>
where
    T: Element,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    async fn next(&self, _cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        let index = self.produced.fetch_add(1, Ordering::AcqRel);
        if index >= self.remaining {
            return Ok(None);
        }
        Ok(Some((self.factory)(index)))
    }
}

fn produce_indexed<T, F>(count: usize, factory: F) -> SequenceRef<T>
where
    T: Element,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    let factory = Arc::new(factory);
    sequence(move |_| {
        ProducerCursor::boxed(
            "produce",
            Generated {
                remaining: count,
                produced: AtomicUsize::new(0),
                factory: factory.clone(),
            },
        )
    })
}

/// Call a synchronous value factory `count` times per start.
pub fn produce<T, F>(count: usize, factory: F) -> SequenceRef<T>
where
    T: Element,
    F: Fn() -> T + Send + Sync + 'static,
{
    produce_indexed(count, move |_| factory())
}

struct GeneratedAsync<F> {
    remaining: usize,
    produced: AtomicUsize,
    factory: Arc<F>,
}

#[async_trait]
impl<T, F, Fut> Producer<T> for GeneratedAsync<F>
where
    T: Element,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SequenceResult<T>> + Send + 'static,
{
    async fn next(&self, _cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        if self.produced.load(Ordering::Acquire) >= self.remaining {
            return Ok(None);
        }
        let value = (self.factory)().await?;
        self.produced.fetch_add(1, Ordering::AcqRel);
        Ok(Some(value))
    }
}

/// Await an asynchronous value factory `count` times per start. A factory
/// error faults the cursor.
pub fn produce_async<T, F, Fut>(count: usize, factory: F) -> SequenceRef<T>
where
    T: Element,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SequenceResult<T>> + Send + 'static,
{
    let factory = Arc::new(factory);
    sequence(move |_| {
        ProducerCursor::boxed(
            "produce_async",
            GeneratedAsync {
                remaining: count,
                produced: AtomicUsize::new(0),
                factory: factory.clone(),
            },
        )
    })
}

struct StreamSource<T> {
    stream: tokio::sync::Mutex<BoxStream<'static, SequenceResult<T>>>,
}

#[async_trait]
impl<T: Element> Producer<T> for StreamSource<T> {
    async fn next(&self, _cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        let mut stream = self.stream.lock().await;
        stream.next().await.transpose()
    }
}

/// Adapt a fallible `futures::Stream` factory. Each start builds a new stream.
pub fn try_from_stream<T, F, S>(factory: F) -> SequenceRef<T>
where
    T: Element,
    F: Fn() -> S + Send + Sync + 'static,
    S: Stream<Item = SequenceResult<T>> + Send + 'static,
{
    sequence(move |_| {
        ProducerCursor::boxed(
            "from_stream",
            StreamSource {
                stream: tokio::sync::Mutex::new(factory().boxed()),
            },
        )
    })
}

/// Adapt an infallible `futures::Stream` factory.
pub fn from_stream<T, F, S>(factory: F) -> SequenceRef<T>
where
    T: Element,
    F: Fn() -> S + Send + Sync + 'static,
    S: Stream<Item = T> + Send + 'static,
{
    try_from_stream(move || factory().map(Ok))
}

/// Producer handle given to push-style sources.
#[derive(Clone)]
pub struct PushSink<T: Element> {
    queue: Arc<BoundedQueue<T>>,
}

impl<T: Element> PushSink<T> {
    /// Deliver a value, suspending while the consumer is behind. Fails with
    /// `Cancelled` once the consumer has gone away.
    pub async fn send(&self, value: T) -> SequenceResult<()> {
        self.queue.push(value).await
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

struct PushSource<T: Element, F> {
    queue: Arc<BoundedQueue<T>>,
    body: Mutex<Option<F>>,
    task: BackgroundTask,
}

#[async_trait]
impl<T, F, Fut> Producer<T> for PushSource<T, F>
where
    T: Element,
    F: FnOnce(PushSink<T>) -> Fut + Send + 'static,
    Fut: Future<Output = SequenceResult<()>> + Send + 'static,
{
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        if let Some(body) = self.body.lock().take() {
            let queue = self.queue.clone();
            self.task.ensure_launched(move |token| async move {
                let sink = PushSink {
                    queue: queue.clone(),
                };
                tokio::select! {
                    _ = token.cancelled() => queue.dispose(),
                    outcome = body(sink) => match outcome {
                        Ok(()) => { queue.complete(); }
                        Err(err) => { queue.fail(err); }
                    },
                }
            });
        }
        self.queue.pop(cancel).await
    }

    fn cancel(&self) {
        self.task.cancel();
        self.queue.dispose();
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.cancel();
        self.task.stop_future().into_iter().collect()
    }
}

/// Bridge a push-style producer into a sequence.
///
/// `body` is spawned on the first `advance` of each cursor and writes into a
/// queue of `capacity`. Returning `Ok(())` completes the sequence, returning an
/// error faults it. Cancelling the cursor aborts `body`.
pub fn from_push<T, F, Fut>(capacity: usize, body: F) -> SequenceRef<T>
where
    T: Element,
    F: Fn(PushSink<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SequenceResult<()>> + Send + 'static,
{
    let body = Arc::new(body);
    sequence(move |_| {
        let body = body.clone();
        ProducerCursor::boxed(
            "from_push",
            PushSource {
                queue: BoundedQueue::shared(capacity),
                body: Mutex::new(Some(move |sink: PushSink<T>| body(sink))),
                task: BackgroundTask::new(),
            },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::Context;
    use crate::engine::sinks::to_list_async;
    use std::time::Duration;

    #[tokio::test]
    async fn test_range_yields_consecutive_integers() {
        let items = to_list_async(&range(1, 5), &Context::new()).await.unwrap();
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_from_iter_replays_on_every_start() {
        let seq = from_iter(vec!["a", "b"]);
        let first = to_list_async(&seq, &Context::new()).await.unwrap();
        let second = to_list_async(&seq, &Context::new()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_empty_and_fail() {
        let nothing: Vec<u8> = to_list_async(&empty(), &Context::new()).await.unwrap();
        assert!(nothing.is_empty());

        let err = to_list_async(&fail::<u8>(SequenceError::msg("nope")), &Context::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "element error: nope");
    }

    #[tokio::test]
    async fn test_produce_calls_factory_count_times() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let seq = produce(3, move || counter.fetch_add(1, Ordering::SeqCst) * 10);

        let items = to_list_async(&seq, &Context::new()).await.unwrap();
        assert_eq!(items, vec![0, 10, 20]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_produce_async_propagates_factory_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let seq = produce_async(5, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 2 {
                    Err(SequenceError::msg("factory broke"))
                } else {
                    Ok(n)
                }
            }
        });

        let err = to_list_async(&seq, &Context::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "element error: factory broke");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_from_stream_builds_a_fresh_stream_per_start() {
        let seq = from_stream(|| futures::stream::iter(vec![1, 2, 3]));
        assert_eq!(to_list_async(&seq, &Context::new()).await.unwrap(), vec![1, 2, 3]);
        assert_eq!(to_list_async(&seq, &Context::new()).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_from_push_completes_and_fails() {
        let ok = from_push(1, |sink| async move {
            for i in 0..4 {
                sink.send(i).await?;
            }
            Ok(())
        });
        assert_eq!(to_list_async(&ok, &Context::new()).await.unwrap(), vec![0, 1, 2, 3]);

        let broken = from_push(1, |sink| async move {
            sink.send(1).await?;
            Err(SequenceError::msg("socket closed"))
        });
        let err = to_list_async(&broken, &Context::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "element error: socket closed");
    }

    #[tokio::test]
    async fn test_from_push_body_is_aborted_on_stop() {
        let seq = from_push(1, |sink| async move {
            let mut i = 0u64;
            loop {
                sink.send(i).await?;
                i += 1;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        let cursor = seq.start(&Context::new());
        let cancel = CancellationToken::new();
        assert!(cursor.advance(&cancel).await.unwrap());
        let cleanup = cursor.stop();
        assert_eq!(cleanup.len(), 1);
        futures::future::join_all(cleanup).await;
        assert!(matches!(cursor.advance(&cancel).await, Err(SequenceError::Cancelled)));
    }
}
