// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Share: every start under one context attaches to the same ongoing read.
//!
//! Consumers under a context compete for elements from a single read-ahead
//! queue; each element is delivered to exactly one of them. The entry is
//! reference counted per attach. When the last consumer stops, the queue is
//! disposed and the background read winds down on its own after its in-flight
//! element; the stop future of that last consumer waits for it.
//!
//! That wind-down lasts only as long as the stopped cursor. The read task is
//! owned by the shared entry, so dropping the last consumer drops the entry and
//! cancels the read outright, in-flight element included.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::consts::DEFAULT_SHARE_READ_AHEAD;
use crate::engine::broadcast::{pump, Queues};
use crate::engine::context::{Context, ContextId};
use crate::engine::cursor::{Producer, ProducerCursor};
use crate::engine::queue::BoundedQueue;
use crate::engine::registry::{ContextRegistry, Lease, SharedState};
use crate::engine::task::BackgroundTask;
use crate::errors::SequenceResult;
use crate::traits::{BoxCursor, Element, Sequence, SequenceRef, StopFuture};

struct ShareHub<T: Element> {
    context: ContextId,
    queue: Arc<BoundedQueue<T>>,
    source: Mutex<Option<SequenceRef<T>>>,
    reader: BackgroundTask,
}

impl<T: Element> ShareHub<T> {
    fn new(context: &Context, source: SequenceRef<T>, read_ahead: usize) -> Self {
        Self {
            context: context.id(),
            queue: BoundedQueue::shared(read_ahead),
            source: Mutex::new(Some(source)),
            reader: BackgroundTask::new(),
        }
    }

    fn launch(&self, context: &Context) {
        let Some(source) = self.source.lock().take() else {
            return;
        };
        let source = source.start(context);
        let queues: Queues<T> = Arc::new(vec![self.queue.clone()]);
        let context = self.context;
        self.reader
            .ensure_launched(move |token| pump("share", context, source, queues, token));
    }
}

impl<T: Element> SharedState for ShareHub<T> {
    fn teardown(&self) {
        self.queue.dispose();
        self.source.lock().take();
    }
}

struct Attached<T: Element> {
    lease: Lease<ShareHub<T>>,
    context: Context,
}

#[async_trait]
impl<T: Element> Producer<T> for Attached<T> {
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        let hub = self.lease.state();
        hub.launch(&self.context);
        hub.queue.pop(cancel).await
    }

    fn cancel(&self) {
        self.lease.release();
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.cancel();
        let hub = self.lease.state();
        if hub.queue.is_closed() {
            hub.reader.stop_future().into_iter().collect()
        } else {
            Vec::new()
        }
    }
}

struct Shared<T: Element> {
    registry: Arc<ContextRegistry<ShareHub<T>>>,
    source: SequenceRef<T>,
    read_ahead: usize,
}

impl<T: Element> Sequence<T> for Shared<T> {
    fn start(&self, context: &Context) -> BoxCursor<T> {
        let lease = self.registry.attach(context, || {
            ShareHub::new(context, self.source.clone(), self.read_ahead)
        });
        ProducerCursor::boxed(
            "share",
            Attached {
                lease,
                context: context.clone(),
            },
        )
    }
}

/// Share one read of `source` between every start under the same context,
/// reading at most `read_ahead` elements ahead of the consumers.
pub fn share_with<T: Element>(source: SequenceRef<T>, read_ahead: usize) -> SequenceRef<T> {
    Arc::new(Shared {
        registry: ContextRegistry::new("share"),
        source,
        read_ahead,
    })
}

pub fn share<T: Element>(source: SequenceRef<T>) -> SequenceRef<T> {
    share_with(source, DEFAULT_SHARE_READ_AHEAD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::elementwise::{delay, inspect};
    use crate::engine::sinks::to_list_async;
    use crate::engine::sources::{from_iter, produce, produce_async, range};
    use crate::traits::CursorExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_consumers_under_one_context_split_one_read() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        let source = inspect(range(0, 6), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let shared = share_with(source, 2);
        let ctx = Context::new();

        let (a, b) = tokio::join!(to_list_async(&shared, &ctx), to_list_async(&shared, &ctx));
        let mut all: Vec<i64> = a.unwrap().into_iter().chain(b.unwrap()).collect();
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(reads.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_separate_contexts_read_separately() {
        let shared = share(from_iter(vec!['x', 'y']));
        assert_eq!(to_list_async(&shared, &Context::new()).await.unwrap(), vec!['x', 'y']);
        assert_eq!(to_list_async(&shared, &Context::new()).await.unwrap(), vec!['x', 'y']);
    }

    #[tokio::test]
    async fn test_late_attach_joins_the_ongoing_read() {
        let shared = share_with(range(0, 4), 1);
        let ctx = Context::new();
        let cancel = CancellationToken::new();

        let early = shared.start(&ctx);
        assert_eq!(early.next_value(&cancel).await.unwrap(), Some(0));

        let late = shared.start(&ctx);
        assert_eq!(late.next_value(&cancel).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_dropping_last_consumer_cancels_in_flight_read() {
        let completed = Arc::new(AtomicUsize::new(0));
        let counter = completed.clone();
        let slow = produce_async(usize::MAX, move || {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(counter.fetch_add(1, Ordering::SeqCst))
            }
        });
        let shared = share(slow);
        let ctx = Context::new();
        let cancel = CancellationToken::new();

        let only = shared.start(&ctx);
        assert_eq!(only.next_value(&cancel).await.unwrap(), Some(0));
        drop(only);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_stop_disposes_queue_and_read_winds_down() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let counter = pulls.clone();
        let endless = delay(
            produce(usize::MAX, move || counter.fetch_add(1, Ordering::SeqCst)),
            Duration::from_millis(2),
        );
        let shared = share(endless);
        let ctx = Context::new();
        let cancel = CancellationToken::new();

        let a = shared.start(&ctx);
        let b = shared.start(&ctx);
        assert!(a.advance(&cancel).await.unwrap());

        assert!(a.stop().is_empty());
        let cleanup = b.stop();
        assert_eq!(cleanup.len(), 1);
        tokio::time::timeout(Duration::from_secs(1), futures::future::join_all(cleanup))
            .await
            .unwrap();

        let settled = pulls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pulls.load(Ordering::SeqCst), settled);
    }
}
