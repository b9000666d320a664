// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Broadcast: one physical read of a source fanned out to `k` outputs.
//!
//! Outputs started under the same [`Context`] share a hub: a pump task that
//! reads the source once and pushes every element into one bounded queue per
//! output. A slow output only backs up its own queue until that queue is full,
//! at which point the shared read waits for it.
//!
//! The hub lives in a [`ContextRegistry`] entry created with `k` reserved
//! references. Each output releases its reference when it ends, is cancelled or
//! is dropped, disposing its own queue so siblings keep flowing; the last
//! release cancels the pump. When every started output has left while the pump
//! is still feeding outputs that were never started, the hub is torn down
//! anyway so the read does not outlive its consumers. Otherwise outputs that
//! are never started are reclaimed once their context is gone. The hub keeps the source
//! unstarted until the first pull, so an idle entry never pins its context.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::consts::DEFAULT_BROADCAST_CAPACITY;
use crate::engine::context::{Context, ContextId};
use crate::engine::cursor::{Producer, ProducerCursor};
use crate::engine::queue::BoundedQueue;
use crate::engine::registry::{ContextRegistry, Lease, SharedState};
use crate::engine::sources::fail;
use crate::engine::task::BackgroundTask;
use crate::errors::{SequenceError, SequenceResult};
use crate::observability::messages::fan_out::{PumpFinished, PumpStarted};
use crate::observability::messages::StructuredLog;
use crate::traits::{BoxCursor, CursorExt, Element, Sequence, SequenceRef, Step, StopFuture};

pub(crate) type Queues<T> = Arc<Vec<Arc<BoundedQueue<T>>>>;

/// Per-context multiplexer shared by every output of one broadcast.
struct Hub<T: Element> {
    context: ContextId,
    queues: Queues<T>,
    claimed: Vec<AtomicBool>,
    live: AtomicUsize,
    source: Mutex<Option<SequenceRef<T>>>,
    pump: BackgroundTask,
}

impl<T: Element> Hub<T> {
    fn new(context: &Context, source: SequenceRef<T>, outputs: usize, capacity: usize) -> Self {
        Self {
            context: context.id(),
            queues: Arc::new((0..outputs).map(|_| BoundedQueue::shared(capacity)).collect()),
            claimed: (0..outputs).map(|_| AtomicBool::new(false)).collect(),
            live: AtomicUsize::new(0),
            source: Mutex::new(Some(source)),
            pump: BackgroundTask::new(),
        }
    }

    /// Mark output `index` as started. False if it already was.
    fn claim(&self, index: usize) -> bool {
        let fresh = !self.claimed[index].swap(true, Ordering::AcqRel);
        if fresh {
            self.live.fetch_add(1, Ordering::AcqRel);
        }
        fresh
    }

    /// A started output left. True if it was the last one still attached.
    fn depart(&self) -> bool {
        self.live.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// The pump is still pushing into queues nobody has left yet.
    fn is_feeding(&self) -> bool {
        self.pump.is_running() && self.queues.iter().any(|queue| !queue.is_closed())
    }

    fn queue(&self, index: usize) -> &Arc<BoundedQueue<T>> {
        &self.queues[index]
    }

    fn launch(&self, context: &Context) {
        let Some(source) = self.source.lock().take() else {
            return;
        };
        let source = source.start(context);
        let queues = self.queues.clone();
        let context = self.context;
        self.pump
            .ensure_launched(move |token| pump("broadcast", context, source, queues, token));
    }

    fn is_torn_down(&self) -> bool {
        self.pump.token().is_cancelled()
    }
}

impl<T: Element> SharedState for Hub<T> {
    fn teardown(&self) {
        self.pump.cancel();
        self.source.lock().take();
        for queue in self.queues.iter() {
            queue.dispose();
        }
    }
}

/// Read `source` once and copy every element into each open queue. Winds
/// down on its own once no queue is left open.
pub(crate) async fn pump<T: Element>(
    operator: &'static str,
    context: ContextId,
    source: BoxCursor<T>,
    queues: Queues<T>,
    token: CancellationToken,
) {
    let started = PumpStarted {
        operator,
        context,
        outputs: queues.len(),
    };
    let span = started.span("fan_out_pump");
    started.log();

    async move {
        let mut delivered = 0;
        let outcome = loop {
            if token.is_cancelled() {
                for queue in queues.iter() {
                    queue.dispose();
                }
                break "cancelled";
            }
            match source.next_step(&token).await {
                Step::Value(value) => {
                    for queue in queues.iter() {
                        if !queue.is_closed() {
                            // a disposed queue only means that consumer left
                            let _ = queue.push_with(value.clone(), &token).await;
                        }
                    }
                    delivered += 1;
                    if queues.iter().all(|queue| queue.is_closed()) {
                        break "abandoned";
                    }
                }
                Step::End => {
                    for queue in queues.iter() {
                        queue.complete();
                    }
                    break "completed";
                }
                Step::Error(err) => {
                    for queue in queues.iter() {
                        queue.fail(err.clone());
                    }
                    break "failed";
                }
                Step::Cancelled => {
                    for queue in queues.iter() {
                        queue.dispose();
                    }
                    break "cancelled";
                }
            }
        };

        futures::future::join_all(source.stop()).await;
        PumpFinished {
            operator,
            context,
            delivered,
            outcome,
        }
        .log();
    }
    .instrument(span)
    .await
}

struct Subscriber<T: Element> {
    lease: Lease<Hub<T>>,
    context: Context,
    index: usize,
    left: AtomicBool,
}

impl<T: Element> Subscriber<T> {
    fn leave(&self) {
        if self.left.swap(true, Ordering::AcqRel) {
            return;
        }
        let hub = self.lease.state();
        hub.queue(self.index).dispose();
        if hub.depart() && hub.is_feeding() {
            self.lease.evict();
        } else {
            self.lease.release();
        }
    }
}

impl<T: Element> Drop for Subscriber<T> {
    fn drop(&mut self) {
        self.leave();
    }
}

#[async_trait]
impl<T: Element> Producer<T> for Subscriber<T> {
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        let hub = self.lease.state();
        hub.launch(&self.context);
        hub.queue(self.index).pop(cancel).await
    }

    fn cancel(&self) {
        self.leave();
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.cancel();
        let hub = self.lease.state();
        if hub.is_torn_down() {
            hub.pump.stop_future().into_iter().collect()
        } else {
            Vec::new()
        }
    }
}

struct Output<T: Element> {
    registry: Arc<ContextRegistry<Hub<T>>>,
    source: SequenceRef<T>,
    index: usize,
    outputs: usize,
    capacity: usize,
}

impl<T: Element> Sequence<T> for Output<T> {
    fn start(&self, context: &Context) -> BoxCursor<T> {
        let lease = self.registry.attach_reserved(context, self.outputs, || {
            Hub::new(context, self.source.clone(), self.outputs, self.capacity)
        });

        if !lease.state().claim(self.index) {
            lease.forget();
            return fail(SequenceError::DuplicateSubscriber { index: self.index }).start(context);
        }

        ProducerCursor::boxed(
            "broadcast",
            Subscriber {
                lease,
                context: context.clone(),
                index: self.index,
                left: AtomicBool::new(false),
            },
        )
    }
}

/// Split `source` into `outputs` sequences backed by one shared read per
/// context, with a per-output queue of `capacity`.
pub fn broadcast_with<T: Element>(
    source: SequenceRef<T>,
    outputs: usize,
    capacity: usize,
) -> Vec<SequenceRef<T>> {
    let registry = ContextRegistry::new("broadcast");
    (0..outputs)
        .map(|index| {
            Arc::new(Output {
                registry: registry.clone(),
                source: source.clone(),
                index,
                outputs,
                capacity,
            }) as SequenceRef<T>
        })
        .collect()
}

pub fn broadcast<T: Element>(source: SequenceRef<T>, outputs: usize) -> Vec<SequenceRef<T>> {
    broadcast_with(source, outputs, DEFAULT_BROADCAST_CAPACITY)
}
