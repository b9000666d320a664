// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The cursor protocol: one single-use, forward-only execution of a sequence.
//!
//! A cursor moves through the states
//!
//! ```text
//! Ready -> Advancing -> HasValue -> Advancing -> ... -> Exhausted | Faulted | Canceled
//! ```
//!
//! All methods take `&self` so that [`Cursor::cancel`] can be issued from another
//! task while an [`Cursor::advance`] is suspended. Only one `advance` may be in
//! flight at a time; a second concurrent call fails with
//! [`SequenceError::OverlappingAdvance`].

use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::errors::{SequenceError, SequenceResult};

/// Bound shared by every value that flows through a sequence.
pub trait Element: Clone + Send + Sync + 'static {}

impl<T> Element for T where T: Clone + Send + Sync + 'static {}

/// Outstanding cleanup work returned by [`Cursor::stop`].
pub type StopFuture = BoxFuture<'static, ()>;

/// Owned, type-erased cursor.
pub type BoxCursor<T> = Box<dyn Cursor<T>>;

/// Lifecycle state of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Ready,
    Advancing,
    HasValue,
    Exhausted,
    Faulted,
    Canceled,
}

impl CursorState {
    /// Terminal states never leave themselves except towards `Canceled`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CursorState::Exhausted | CursorState::Faulted | CursorState::Canceled
        )
    }
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CursorState::Ready => "ready",
            CursorState::Advancing => "advancing",
            CursorState::HasValue => "holding a value",
            CursorState::Exhausted => "exhausted",
            CursorState::Faulted => "faulted",
            CursorState::Canceled => "canceled",
        };
        f.write_str(label)
    }
}

#[async_trait]
pub trait Cursor<T>: Send + Sync {
    /// Move to the next element.
    ///
    /// Resolves to `Ok(true)` when [`Cursor::current`] holds a freshly produced
    /// element, `Ok(false)` on natural exhaustion. Failures fault the cursor and
    /// cancel whatever it owns upstream. Cancellation, either through `cancel`
    /// or through [`Cursor::cancel`], resolves to [`SequenceError::Cancelled`].
    async fn advance(&self, cancel: &CancellationToken) -> SequenceResult<bool>;

    /// The element produced by the last successful `advance`, if the cursor
    /// is in the `HasValue` state.
    fn current(&self) -> Option<T>;

    /// Cancel this cursor and everything it owns upstream. Idempotent.
    fn cancel(&self);

    /// Cancel, then hand back the cleanup work still running (background
    /// readers, pumps). Callers needing deterministic teardown await all of it.
    fn stop(&self) -> Vec<StopFuture>;

    fn state(&self) -> CursorState;
}

/// Three-way view of one `advance` + `current` round trip.
#[derive(Debug, Clone)]
pub enum Step<T> {
    Value(T),
    End,
    Error(SequenceError),
    Cancelled,
}

impl<T> Step<T> {
    /// Fold the step back into a `Result`, with `None` meaning end of sequence.
    pub fn into_result(self) -> SequenceResult<Option<T>> {
        match self {
            Step::Value(value) => Ok(Some(value)),
            Step::End => Ok(None),
            Step::Error(err) => Err(err),
            Step::Cancelled => Err(SequenceError::Cancelled),
        }
    }
}

#[async_trait]
pub trait CursorExt<T: Element>: Cursor<T> {
    /// Advance and read the value in one call, without overloading the error
    /// channel for cancellation.
    async fn next_step(&self, cancel: &CancellationToken) -> Step<T> {
        match self.advance(cancel).await {
            Ok(true) => match self.current() {
                Some(value) => Step::Value(value),
                None => Step::Error(SequenceError::Terminated {
                    state: self.state(),
                }),
            },
            Ok(false) => Step::End,
            Err(SequenceError::Cancelled) => Step::Cancelled,
            Err(err) => Step::Error(err),
        }
    }

    /// `advance` + `current` folded into an `Option`.
    async fn next_value(&self, cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        self.next_step(cancel).await.into_result()
    }
}

impl<T: Element, C: Cursor<T> + ?Sized> CursorExt<T> for C {}
