// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Shared cursor machinery.
//!
//! Almost every operator in the engine is written as a [`Producer`]: an object
//! that, given a cancellation token, yields the next element, `None` at the end,
//! or an error. [`ProducerCursor`] lifts a producer into a full [`Cursor`] and
//! owns everything the protocol demands:
//!
//! * the lifecycle state machine and the held `current` value,
//! * the single-flight check (`OverlappingAdvance`),
//! * racing the producer against both the caller's cancel signal and the
//!   cursor's own cancellation token,
//! * cancelling upstream when the cursor faults, is cancelled, or ends,
//! * a drop guard: an `advance` future dropped mid-flight leaves the cursor
//!   `Canceled`.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::engine::context::Context;
use crate::errors::{SequenceError, SequenceResult};
use crate::observability::messages::cursor::{CursorCanceled, CursorFaulted};
use crate::observability::messages::StructuredLog;
use crate::traits::{BoxCursor, Cursor, CursorState, Element, Sequence, SequenceRef, StopFuture};

/// Source of elements for a [`ProducerCursor`].
///
/// `next` is never called concurrently with itself. It is dropped (not
/// completed) when the cursor is cancelled mid-flight, so any state it touches
/// must be left consistent at every await point.
#[async_trait]
pub trait Producer<T>: Send + Sync + 'static {
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<T>>;

    /// Cancel everything this producer owns upstream. Must be idempotent.
    fn cancel(&self) {}

    /// Like [`Producer::cancel`], returning cleanup work still in progress.
    fn stop(&self) -> Vec<StopFuture> {
        self.cancel();
        Vec::new()
    }
}

struct Slot<T> {
    state: CursorState,
    current: Option<T>,
}

/// State machine and cancellation token shared by cursor implementations.
pub(crate) struct CursorCore<T> {
    slot: Mutex<Slot<T>>,
    token: CancellationToken,
}

impl<T: Element> CursorCore<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: CursorState::Ready,
                current: None,
            }),
            token: CancellationToken::new(),
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn state(&self) -> CursorState {
        self.slot.lock().state
    }

    pub(crate) fn current(&self) -> Option<T> {
        let slot = self.slot.lock();
        match slot.state {
            CursorState::HasValue => slot.current.clone(),
            _ => None,
        }
    }

    /// Enter `Advancing`, enforcing the single-flight rule.
    pub(crate) fn begin(&self) -> SequenceResult<Flight<'_, T>> {
        let mut slot = self.slot.lock();
        match slot.state {
            CursorState::Ready | CursorState::HasValue => {
                slot.current = None;
                if self.token.is_cancelled() {
                    slot.state = CursorState::Canceled;
                    return Err(SequenceError::Cancelled);
                }
                slot.state = CursorState::Advancing;
                Ok(Flight {
                    core: self,
                    done: false,
                })
            }
            CursorState::Advancing => Err(SequenceError::OverlappingAdvance),
            CursorState::Canceled => Err(SequenceError::Cancelled),
            state => Err(SequenceError::Terminated { state }),
        }
    }

    /// Move to `Canceled` from any state. Returns false if already there.
    pub(crate) fn mark_canceled(&self) -> bool {
        let first = {
            let mut slot = self.slot.lock();
            slot.current = None;
            let first = slot.state != CursorState::Canceled;
            slot.state = CursorState::Canceled;
            first
        };
        self.token.cancel();
        first
    }
}

/// One in-flight `advance`. Dropping it unfinished cancels the cursor.
pub(crate) struct Flight<'a, T: Element> {
    core: &'a CursorCore<T>,
    done: bool,
}

impl<T: Element> Flight<'_, T> {
    /// Record the producer's outcome and translate it to the `advance` contract.
    pub(crate) fn finish(mut self, outcome: SequenceResult<Option<T>>) -> SequenceResult<bool> {
        self.done = true;
        let mut slot = self.core.slot.lock();
        if slot.state == CursorState::Canceled {
            slot.current = None;
            return Err(SequenceError::Cancelled);
        }
        match outcome {
            Ok(Some(value)) => {
                slot.state = CursorState::HasValue;
                slot.current = Some(value);
                Ok(true)
            }
            Ok(None) => {
                slot.state = CursorState::Exhausted;
                Ok(false)
            }
            Err(SequenceError::Cancelled) => {
                slot.state = CursorState::Canceled;
                drop(slot);
                self.core.token.cancel();
                Err(SequenceError::Cancelled)
            }
            Err(err) => {
                slot.state = CursorState::Faulted;
                Err(err)
            }
        }
    }
}

impl<T: Element> Drop for Flight<'_, T> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut slot = self.core.slot.lock();
        if slot.state == CursorState::Advancing {
            slot.state = CursorState::Canceled;
            slot.current = None;
        }
        drop(slot);
        self.core.token.cancel();
    }
}

/// A [`Cursor`] driven by a [`Producer`].
pub struct ProducerCursor<T: Element, P> {
    core: CursorCore<T>,
    producer: P,
    label: &'static str,
}

impl<T: Element, P: Producer<T>> ProducerCursor<T, P> {
    pub fn new(label: &'static str, producer: P) -> Self {
        Self {
            core: CursorCore::new(),
            producer,
            label,
        }
    }

    pub fn boxed(label: &'static str, producer: P) -> BoxCursor<T> {
        Box::new(Self::new(label, producer))
    }
}

#[async_trait]
impl<T: Element, P: Producer<T>> Cursor<T> for ProducerCursor<T, P> {
    async fn advance(&self, cancel: &CancellationToken) -> SequenceResult<bool> {
        let flight = self.core.begin()?;
        let token = self.core.token();

        // A ready outcome beats a cancellation that raced it.
        let outcome = tokio::select! {
            biased;
            next = self.producer.next(token) => next,
            _ = token.cancelled() => Err(SequenceError::Cancelled),
            _ = cancel.cancelled() => Err(SequenceError::Cancelled),
        };

        let result = flight.finish(outcome);
        match &result {
            Ok(true) => {}
            Ok(false) => self.producer.cancel(),
            Err(SequenceError::Cancelled) => {
                CursorCanceled { operator: self.label }.log();
                self.producer.cancel();
            }
            Err(err) => {
                CursorFaulted {
                    operator: self.label,
                    error: err,
                }
                .log();
                self.producer.cancel();
            }
        }
        result
    }

    fn current(&self) -> Option<T> {
        self.core.current()
    }

    fn cancel(&self) {
        if self.core.mark_canceled() {
            CursorCanceled { operator: self.label }.log();
        }
        self.producer.cancel();
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.core.mark_canceled();
        self.producer.stop()
    }

    fn state(&self) -> CursorState {
        self.core.state()
    }
}

/// A [`Sequence`] defined by a closure from context to cursor.
pub struct FnSequence<F>(F);

impl<T, F> Sequence<T> for FnSequence<F>
where
    F: Fn(&Context) -> BoxCursor<T> + Send + Sync,
{
    fn start(&self, context: &Context) -> BoxCursor<T> {
        (self.0)(context)
    }
}

/// Build a sequence from a start function.
pub fn sequence<T, F>(start: F) -> SequenceRef<T>
where
    T: Element,
    F: Fn(&Context) -> BoxCursor<T> + Send + Sync + 'static,
{
    Arc::new(FnSequence(start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CursorExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts up to `limit`, sleeping before each element when `slow` is set.
    struct Counter {
        next: AtomicUsize,
        limit: usize,
        slow: bool,
        cancels: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Producer<usize> for Counter {
        async fn next(&self, _cancel: &CancellationToken) -> SequenceResult<Option<usize>> {
            if self.slow {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            Ok((n < self.limit).then_some(n))
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counter(limit: usize, slow: bool) -> (ProducerCursor<usize, Counter>, Arc<AtomicUsize>) {
        let cancels = Arc::new(AtomicUsize::new(0));
        let cursor = ProducerCursor::new(
            "counter",
            Counter {
                next: AtomicUsize::new(0),
                limit,
                slow,
                cancels: cancels.clone(),
            },
        );
        (cursor, cancels)
    }

    #[tokio::test]
    async fn test_state_machine_walks_to_exhausted() {
        let (cursor, _) = counter(2, false);
        let cancel = CancellationToken::new();

        assert_eq!(cursor.state(), CursorState::Ready);
        assert!(cursor.advance(&cancel).await.unwrap());
        assert_eq!(cursor.state(), CursorState::HasValue);
        assert_eq!(cursor.current(), Some(0));
        assert!(cursor.advance(&cancel).await.unwrap());
        assert_eq!(cursor.current(), Some(1));
        assert!(!cursor.advance(&cancel).await.unwrap());
        assert_eq!(cursor.state(), CursorState::Exhausted);
        assert_eq!(cursor.current(), None);

        match cursor.advance(&cancel).await {
            Err(SequenceError::Terminated { state }) => assert_eq!(state, CursorState::Exhausted),
            other => panic!("expected Terminated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_overlapping_advance_is_rejected() {
        let (cursor, _) = counter(5, true);
        let cancel = CancellationToken::new();

        let (first, second) = tokio::join!(cursor.advance(&cancel), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cursor.advance(&cancel).await
        });

        assert!(first.unwrap());
        assert!(matches!(second, Err(SequenceError::OverlappingAdvance)));
    }

    #[tokio::test]
    async fn test_cancel_mid_advance_resolves_cancelled_and_sticks() {
        let (cursor, cancels) = counter(5, true);
        let cancel = CancellationToken::new();

        let (result, _) = tokio::join!(cursor.advance(&cancel), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cursor.cancel();
        });

        assert!(matches!(result, Err(SequenceError::Cancelled)));
        assert_eq!(cursor.state(), CursorState::Canceled);
        assert!(matches!(cursor.advance(&cancel).await, Err(SequenceError::Cancelled)));
        assert!(cancels.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_external_signal_cancels_the_cursor() {
        let (cursor, _) = counter(5, true);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let (result, _) = tokio::join!(cursor.advance(&cancel), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        assert!(matches!(result, Err(SequenceError::Cancelled)));
        let fresh = CancellationToken::new();
        assert!(matches!(cursor.advance(&fresh).await, Err(SequenceError::Cancelled)));
    }

    #[tokio::test]
    async fn test_ready_outcome_beats_raced_signal() {
        let (cursor, _) = counter(5, false);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(cursor.advance(&cancel).await.unwrap());
        assert_eq!(cursor.current(), Some(0));

        let (slow, _) = counter(5, true);
        assert!(matches!(slow.advance(&cancel).await, Err(SequenceError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropped_advance_leaves_cursor_canceled() {
        let (cursor, _) = counter(5, true);
        let cancel = CancellationToken::new();

        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), cursor.advance(&cancel)).await;
        assert!(timed_out.is_err());
        assert_eq!(cursor.state(), CursorState::Canceled);
    }

    #[tokio::test]
    async fn test_next_step_reports_three_way_results() {
        let (cursor, _) = counter(1, false);
        let cancel = CancellationToken::new();

        assert!(matches!(cursor.next_step(&cancel).await, crate::traits::Step::Value(0)));
        assert!(matches!(cursor.next_step(&cancel).await, crate::traits::Step::End));

        let (cursor, _) = counter(1, false);
        cursor.cancel();
        assert!(matches!(cursor.next_step(&cancel).await, crate::traits::Step::Cancelled));
    }
}
