// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Merge: interleave many sources into one cursor.
//!
//! On the first `advance` a dispatcher task starts. It pulls source sequences
//! from the outer cursor, starts each under the merge's context, and spawns one
//! reader task per source, optionally gated by a semaphore of
//! `max_concurrent` slots. Readers push into a shared [`BoundedQueue`] which
//! the merge cursor pops from, so a slow consumer backpressures every reader.
//!
//! The first failing source cancels the merge token (and with it every sibling
//! reader) and disposes the queue. The consumer then joins the readers and
//! reports an [`AggregateError`](crate::errors::AggregateError) holding every
//! error recorded by then. Cancellations caused by the merge itself are not
//! recorded as causes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::consts::DEFAULT_MERGE_CAPACITY;
use crate::engine::context::Context;
use crate::engine::cursor::{sequence, Producer, ProducerCursor};
use crate::engine::queue::BoundedQueue;
use crate::engine::sources::from_iter;
use crate::engine::task::BackgroundTask;
use crate::errors::{SequenceError, SequenceResult};
use crate::observability::messages::fan_in::{FanInFailed, MergeCompleted, SourceFailed};
use crate::observability::messages::StructuredLog;
use crate::traits::{BoxCursor, CursorExt, Element, SequenceRef, Step, StopFuture};

struct MergeShared<T> {
    queue: Arc<BoundedQueue<T>>,
    token: CancellationToken,
    errors: Mutex<Vec<SequenceError>>,
    /// Running readers plus the dispatcher itself.
    active: AtomicUsize,
    started: AtomicUsize,
    readers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Element> MergeShared<T> {
    fn new(capacity: usize) -> Self {
        Self {
            queue: BoundedQueue::shared(capacity),
            token: CancellationToken::new(),
            errors: Mutex::new(Vec::new()),
            active: AtomicUsize::new(1),
            started: AtomicUsize::new(0),
            readers: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, source: usize, error: SequenceError) {
        SourceFailed {
            operator: "merge",
            source,
            error: &error,
        }
        .log();
        self.errors.lock().push(error);
        self.token.cancel();
        self.queue.dispose();
    }

    /// Record a source's own cancellation; ignore the ones we caused.
    fn record_cancelled(&self, source: usize) {
        if !self.token.is_cancelled() {
            self.record(source, SequenceError::Cancelled);
        }
    }

    fn has_failed(&self) -> bool {
        !self.errors.lock().is_empty()
    }

    fn finish_one(&self) {
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 && self.queue.complete() {
            MergeCompleted {
                sources: self.started.load(Ordering::Acquire),
            }
            .log();
        }
    }

    fn take_readers(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.readers.lock())
    }
}

async fn read<T: Element>(
    shared: Arc<MergeShared<T>>,
    cursor: BoxCursor<T>,
    index: usize,
    _slot: Option<OwnedSemaphorePermit>,
) {
    let token = shared.token.clone();
    loop {
        match cursor.next_step(&token).await {
            Step::Value(value) => {
                if shared.queue.push_with(value, &token).await.is_err() {
                    cursor.cancel();
                    break;
                }
            }
            Step::End => break,
            Step::Cancelled => {
                shared.record_cancelled(index);
                break;
            }
            Step::Error(err) => {
                shared.record(index, err);
                break;
            }
        }
    }
    futures::future::join_all(cursor.stop()).await;
    shared.finish_one();
}

async fn dispatch<T: Element>(
    shared: Arc<MergeShared<T>>,
    outer: BoxCursor<SequenceRef<T>>,
    context: Context,
    slots: Option<Arc<Semaphore>>,
) {
    let token = shared.token.clone();
    loop {
        if token.is_cancelled() {
            break;
        }
        let permit = match &slots {
            Some(slots) => tokio::select! {
                _ = token.cancelled() => break,
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => break,
                },
            },
            None => None,
        };

        match outer.next_step(&token).await {
            Step::Value(source) => {
                let index = shared.started.fetch_add(1, Ordering::AcqRel);
                shared.active.fetch_add(1, Ordering::AcqRel);
                let reader = tokio::spawn(read(shared.clone(), source.start(&context), index, permit));
                shared.readers.lock().push(reader);
            }
            Step::End => break,
            Step::Cancelled => {
                shared.record_cancelled(shared.started.load(Ordering::Acquire));
                break;
            }
            Step::Error(err) => {
                shared.record(shared.started.load(Ordering::Acquire), err);
                break;
            }
        }
    }
    outer.cancel();
    shared.finish_one();
}

struct Merge<T: Element> {
    shared: Arc<MergeShared<T>>,
    pending: Mutex<Option<(BoxCursor<SequenceRef<T>>, Context)>>,
    max_concurrent: Option<usize>,
    dispatcher: BackgroundTask,
}

impl<T: Element> Merge<T> {
    fn launch(&self) {
        let Some((outer, context)) = self.pending.lock().take() else {
            return;
        };
        let shared = self.shared.clone();
        let slots = self.max_concurrent.map(|n| Arc::new(Semaphore::new(n.max(1))));
        self.dispatcher
            .ensure_launched(move |_| dispatch(shared, outer, context, slots));
    }

    async fn failure(&self) -> SequenceError {
        futures::future::join_all(self.shared.take_readers()).await;
        let causes = self.shared.errors.lock().clone();
        FanInFailed {
            operator: "merge",
            causes: causes.len(),
        }
        .log();
        SequenceError::aggregate(causes)
    }
}

#[async_trait]
impl<T: Element> Producer<T> for Merge<T> {
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        self.launch();
        let popped = self.shared.queue.pop(cancel).await;
        if self.shared.has_failed() {
            return Err(self.failure().await);
        }
        popped
    }

    fn cancel(&self) {
        self.shared.token.cancel();
        self.shared.queue.dispose();
        if let Some((outer, _)) = self.pending.lock().take() {
            outer.cancel();
        }
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.cancel();
        let dispatcher = self.dispatcher.stop_future();
        let shared = self.shared.clone();
        vec![async move {
            if let Some(dispatcher) = dispatcher {
                dispatcher.await;
            }
            futures::future::join_all(shared.take_readers()).await;
        }
        .boxed()]
    }
}

/// Merge a sequence of sequences with an explicit queue capacity.
pub fn merge_all_with<T: Element>(
    sources: SequenceRef<SequenceRef<T>>,
    max_concurrent: Option<usize>,
    capacity: usize,
) -> SequenceRef<T> {
    sequence(move |ctx| {
        let shared = Arc::new(MergeShared::new(capacity));
        let dispatcher = BackgroundTask::with_token(shared.token.clone());
        ProducerCursor::boxed(
            "merge",
            Merge {
                shared,
                pending: Mutex::new(Some((sources.start(ctx), ctx.clone()))),
                max_concurrent,
                dispatcher,
            },
        )
    })
}

/// Interleave the sequences produced by `sources`, running at most
/// `max_concurrent` of them at once (unbounded with `None`).
pub fn merge_all<T: Element>(
    sources: SequenceRef<SequenceRef<T>>,
    max_concurrent: Option<usize>,
) -> SequenceRef<T> {
    merge_all_with(sources, max_concurrent, DEFAULT_MERGE_CAPACITY)
}

pub fn merge_n<T: Element>(sources: Vec<SequenceRef<T>>, max_concurrent: Option<usize>) -> SequenceRef<T> {
    merge_all(from_iter(sources), max_concurrent)
}

pub fn merge<T: Element>(first: SequenceRef<T>, second: SequenceRef<T>) -> SequenceRef<T> {
    merge_n(vec![first, second], None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::elementwise::{delay, inspect};
    use crate::engine::sinks::to_list_async;
    use crate::engine::sources::{fail, produce, range};
    use std::collections::HashSet;
    use std::time::Duration;

    #[tokio::test]
    async fn test_merge_delivers_every_element() {
        let seq = merge(delay(from_iter(vec![1]), Duration::from_millis(10)), from_iter(vec![2]));
        let items = to_list_async(&seq, &Context::new()).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items.into_iter().collect::<HashSet<_>>(), HashSet::from([1, 2]));
    }

    #[tokio::test]
    async fn test_merge_preserves_order_within_a_source() {
        let seq = merge_n(vec![range(0, 50), range(100, 50), range(200, 50)], None);
        let items = to_list_async(&seq, &Context::new()).await.unwrap();
        assert_eq!(items.len(), 150);
        for base in [0, 100, 200] {
            let run: Vec<i64> = items.iter().copied().filter(|v| (base..base + 50).contains(v)).collect();
            assert_eq!(run, (base..base + 50).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_merge_of_nothing_completes() {
        let seq = merge_n(Vec::<SequenceRef<u8>>::new(), None);
        assert!(to_list_async(&seq, &Context::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_max_concurrency_bounds_running_sources() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let sources = (0..6)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                sequence(move |ctx| {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    let running = running.clone();
                    let body = delay(from_iter(vec![i]), Duration::from_millis(5));
                    let done = inspect(body, move |_| {
                        running.fetch_sub(1, Ordering::SeqCst);
                    });
                    done.start(ctx)
                })
            })
            .collect();

        let items = to_list_async(&merge_n(sources, Some(2)), &Context::new()).await.unwrap();
        assert_eq!(items.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_source_failure_fails_with_aggregate_and_cancels_siblings() {
        let endless = delay(produce(usize::MAX, || 1), Duration::from_millis(5));
        let seq = merge(endless, fail(SequenceError::msg("disk full")));

        let err = to_list_async(&seq, &Context::new()).await.unwrap_err();
        match err {
            SequenceError::Aggregate(aggregate) => {
                assert_eq!(aggregate.len(), 1);
                assert_eq!(aggregate.causes()[0].to_string(), "element error: disk full");
            }
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_simultaneous_failures_are_all_collected() {
        let gate = Arc::new(tokio::sync::Barrier::new(2));
        let failing = |name: &'static str| {
            let gate = gate.clone();
            crate::engine::sources::produce_async(1, move || {
                let gate = gate.clone();
                async move {
                    gate.wait().await;
                    Err::<u8, _>(SequenceError::msg(name))
                }
            })
        };

        let err = to_list_async(&merge(failing("left"), failing("right")), &Context::new())
            .await
            .unwrap_err();
        let SequenceError::Aggregate(aggregate) = err else {
            panic!("expected aggregate");
        };
        assert_eq!(aggregate.len(), 2);
        let mut causes: Vec<String> = aggregate.causes().iter().map(|e| e.to_string()).collect();
        causes.sort();
        assert_eq!(causes, vec!["element error: left", "element error: right"]);
    }

    #[tokio::test]
    async fn test_failures_ready_together_are_both_reported() {
        let seq = merge(
            fail::<u8>(SequenceError::msg("a")),
            fail::<u8>(SequenceError::msg("b")),
        );
        let err = to_list_async(&seq, &Context::new()).await.unwrap_err();
        let SequenceError::Aggregate(aggregate) = err else {
            panic!("expected aggregate");
        };
        assert_eq!(aggregate.len(), 2);
    }

    #[tokio::test]
    async fn test_stop_waits_for_reader_tasks() {
        let endless = delay(produce(usize::MAX, || 0u8), Duration::from_millis(1));
        let cursor = merge(endless.clone(), endless).start(&Context::new());
        let cancel = CancellationToken::new();
        assert!(cursor.advance(&cancel).await.unwrap());

        let cleanup = cursor.stop();
        assert_eq!(cleanup.len(), 1);
        tokio::time::timeout(Duration::from_secs(1), futures::future::join_all(cleanup))
            .await
            .unwrap();
        assert!(matches!(cursor.advance(&cancel).await, Err(SequenceError::Cancelled)));
    }

    #[tokio::test]
    async fn test_nothing_runs_before_first_advance() {
        let starts = Arc::new(AtomicUsize::new(0));
        let counter = starts.clone();
        let source = sequence(move |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            range(0, 1).start(ctx)
        });

        let cursor = merge_n(vec![source], None).start(&Context::new());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(starts.load(Ordering::SeqCst), 0);
        drop(cursor);
    }
}
