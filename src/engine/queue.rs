// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bounded, backpressured push/pull channel.
//!
//! [`BoundedQueue`] bridges push-style producers (background readers, pumps,
//! host callbacks) to the pull-style cursor protocol.
//!
//! # Semantics
//!
//! * `push` suspends once `capacity` unread items are buffered. Suspended
//!   producers are released in FIFO order as the consumer drains (the slot
//!   semaphore is fair).
//! * A suspended `pop` is released by the next `push`, `complete`, `fail` or
//!   `dispose`.
//! * After `complete` or `fail` no push is accepted; items already buffered are
//!   still drained before the terminal signal is observed. Producers suspended at
//!   that moment are released immediately: with [`SequenceError::Closed`] after
//!   `complete`, with the failure itself after `fail`.
//! * `dispose` discards buffered items and releases every waiter with
//!   [`SequenceError::Cancelled`].
//!
//! # Example
//!
//! ```rust
//! use seqflow::engine::queue::BoundedQueue;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let queue = BoundedQueue::shared(2);
//! let producer = queue.clone();
//! tokio::spawn(async move {
//!     for i in 0..5 {
//!         producer.push(i).await.unwrap();
//!     }
//!     producer.complete();
//! });
//!
//! let cancel = CancellationToken::new();
//! let mut seen = Vec::new();
//! while let Some(v) = queue.pop(&cancel).await.unwrap() {
//!     seen.push(v);
//! }
//! assert_eq!(seen, vec![0, 1, 2, 3, 4]);
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::consts::MIN_QUEUE_CAPACITY;
use crate::engine::cursor::{Producer, ProducerCursor};
use crate::errors::{SequenceError, SequenceResult};
use crate::traits::{BoxCursor, Element};

#[derive(Debug, Clone)]
enum Terminal {
    Completed,
    Failed(SequenceError),
    Disposed,
}

impl Terminal {
    fn rejection(&self) -> SequenceError {
        match self {
            Terminal::Completed => SequenceError::Closed,
            Terminal::Failed(err) => err.clone(),
            Terminal::Disposed => SequenceError::Cancelled,
        }
    }
}

struct QueueState<T> {
    items: VecDeque<T>,
    terminal: Option<Terminal>,
}

pub struct BoundedQueue<T> {
    capacity: usize,
    slots: Semaphore,
    state: Mutex<QueueState<T>>,
    readable: Notify,
}

impl<T: Element> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` unread items (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_QUEUE_CAPACITY);
        Self {
            capacity,
            slots: Semaphore::new(capacity),
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                terminal: None,
            }),
            readable: Notify::new(),
        }
    }

    pub fn shared(capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(capacity))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered, unread items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once `complete`, `fail` or `dispose` has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().terminal.is_some()
    }

    fn rejection(&self) -> Option<SequenceError> {
        self.state.lock().terminal.as_ref().map(Terminal::rejection)
    }

    /// Enqueue a value, suspending while the queue is full.
    pub async fn push(&self, value: T) -> SequenceResult<()> {
        if let Some(err) = self.rejection() {
            return Err(err);
        }

        match self.slots.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(self.rejection().unwrap_or(SequenceError::Cancelled)),
        }

        let mut state = self.state.lock();
        if let Some(terminal) = &state.terminal {
            return Err(terminal.rejection());
        }
        state.items.push_back(value);
        drop(state);

        self.readable.notify_one();
        Ok(())
    }

    /// [`BoundedQueue::push`] that also gives up when `cancel` fires.
    pub async fn push_with(&self, value: T, cancel: &CancellationToken) -> SequenceResult<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SequenceError::Cancelled),
            pushed = self.push(value) => pushed,
        }
    }

    /// Dequeue the next value; `None` once completed and drained.
    pub async fn pop(&self, cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(value) = state.items.pop_front() {
                    drop(state);
                    self.slots.add_permits(1);
                    return Ok(Some(value));
                }
                match &state.terminal {
                    Some(Terminal::Completed) => return Ok(None),
                    Some(terminal) => return Err(terminal.rejection()),
                    None => {}
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return Err(SequenceError::Cancelled),
            }
        }
    }

    /// Signal natural end. Returns false if the queue was already closed.
    pub fn complete(&self) -> bool {
        self.terminate(Terminal::Completed)
    }

    /// Signal failure. Returns false if the queue was already closed.
    pub fn fail(&self, error: SequenceError) -> bool {
        self.terminate(Terminal::Failed(error))
    }

    /// Drop buffered items and release every waiter with `Cancelled`.
    pub fn dispose(&self) {
        {
            let mut state = self.state.lock();
            state.items.clear();
            state.terminal = Some(Terminal::Disposed);
        }
        self.slots.close();
        self.readable.notify_waiters();
    }

    fn terminate(&self, terminal: Terminal) -> bool {
        {
            let mut state = self.state.lock();
            if state.terminal.is_some() {
                return false;
            }
            state.terminal = Some(terminal);
        }
        self.slots.close();
        self.readable.notify_waiters();
        true
    }
}

/// Consumer side of a queue exposed as a cursor. Dropping or cancelling the
/// cursor disposes the queue, which unblocks any suspended producer.
struct QueueReader<T: Element> {
    queue: Arc<BoundedQueue<T>>,
}

#[async_trait]
impl<T: Element> Producer<T> for QueueReader<T> {
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        self.queue.pop(cancel).await
    }

    fn cancel(&self) {
        self.queue.dispose();
    }
}

impl<T: Element> Drop for QueueReader<T> {
    fn drop(&mut self) {
        self.queue.dispose();
    }
}

/// Expose the consumer side of `queue` through the cursor protocol.
pub fn queue_cursor<T: Element>(queue: Arc<BoundedQueue<T>>) -> BoxCursor<T> {
    ProducerCursor::boxed("queue", QueueReader { queue })
}
