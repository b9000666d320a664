// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Sequential composition: concat and repeat.
//!
//! Both operators drive at most one inner cursor at a time. The inner cursor is
//! swapped under a lock that also carries the closed flag, so a `cancel` that
//! lands while a new inner cursor is being installed is never lost: the swap
//! sees the flag and cancels the cursor it was about to install.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::engine::context::Context;
use crate::engine::cursor::{sequence, Producer, ProducerCursor};
use crate::engine::sources::from_iter;
use crate::errors::{SequenceError, SequenceResult};
use crate::traits::{BoxCursor, Cursor, CursorExt, Element, SequenceRef, StopFuture};

type SharedCursor<T> = Arc<dyn Cursor<T>>;

struct SlotState<T> {
    cursor: Option<SharedCursor<T>>,
    closed: bool,
}

/// The single live inner cursor of a sequential operator.
struct InnerSlot<T> {
    state: Mutex<SlotState<T>>,
}

impl<T: Element> InnerSlot<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                cursor: None,
                closed: false,
            }),
        }
    }

    fn current(&self) -> SequenceResult<Option<SharedCursor<T>>> {
        let state = self.state.lock();
        if state.closed {
            return Err(SequenceError::Cancelled);
        }
        Ok(state.cursor.clone())
    }

    fn install(&self, cursor: BoxCursor<T>) -> SequenceResult<SharedCursor<T>> {
        let cursor: SharedCursor<T> = Arc::from(cursor);
        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            cursor.cancel();
            return Err(SequenceError::Cancelled);
        }
        state.cursor = Some(cursor.clone());
        Ok(cursor)
    }

    fn clear(&self) {
        self.state.lock().cursor = None;
    }

    fn close(&self) -> Option<SharedCursor<T>> {
        let mut state = self.state.lock();
        state.closed = true;
        state.cursor.take()
    }
}

struct Concat<T> {
    context: Context,
    outer: BoxCursor<SequenceRef<T>>,
    inner: InnerSlot<T>,
}

#[async_trait]
impl<T: Element> Producer<T> for Concat<T> {
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        loop {
            if let Some(inner) = self.inner.current()? {
                match inner.next_value(cancel).await? {
                    Some(value) => return Ok(Some(value)),
                    None => self.inner.clear(),
                }
            }

            let Some(next) = self.outer.next_value(cancel).await? else {
                return Ok(None);
            };
            self.inner.install(next.start(&self.context))?;
        }
    }

    fn cancel(&self) {
        if let Some(inner) = self.inner.close() {
            inner.cancel();
        }
        self.outer.cancel();
    }

    fn stop(&self) -> Vec<StopFuture> {
        let mut pending = self.inner.close().map(|inner| inner.stop()).unwrap_or_default();
        pending.extend(self.outer.stop());
        pending
    }
}

/// Flatten a sequence of sequences, one inner sequence at a time.
pub fn concat<T: Element>(sources: SequenceRef<SequenceRef<T>>) -> SequenceRef<T> {
    sequence(move |ctx| {
        ProducerCursor::boxed(
            "concat",
            Concat {
                context: ctx.clone(),
                outer: sources.start(ctx),
                inner: InnerSlot::new(),
            },
        )
    })
}

/// Concatenate a fixed list of sequences.
pub fn concat_all<T: Element>(sources: Vec<SequenceRef<T>>) -> SequenceRef<T> {
    concat(from_iter(sources))
}

pub fn concat2<T: Element>(first: SequenceRef<T>, second: SequenceRef<T>) -> SequenceRef<T> {
    concat_all(vec![first, second])
}

#[derive(Debug, Clone, Copy)]
enum Until {
    Passes(usize),
    Forever,
    Empty,
}

struct Repeat<T> {
    context: Context,
    source: SequenceRef<T>,
    until: Until,
    inner: InnerSlot<T>,
    progress: Mutex<(usize, bool)>,
}

#[async_trait]
impl<T: Element> Producer<T> for Repeat<T> {
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        loop {
            let current = match self.inner.current()? {
                Some(cursor) => cursor,
                None => {
                    {
                        let mut progress = self.progress.lock();
                        if let Until::Passes(limit) = self.until {
                            if progress.0 >= limit {
                                return Ok(None);
                            }
                        }
                        *progress = (progress.0 + 1, false);
                    }
                    self.inner.install(self.source.start(&self.context))?
                }
            };

            match current.next_value(cancel).await? {
                Some(value) => {
                    self.progress.lock().1 = true;
                    return Ok(Some(value));
                }
                None => {
                    self.inner.clear();
                    let yielded = self.progress.lock().1;
                    if matches!(self.until, Until::Empty) && !yielded {
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn cancel(&self) {
        if let Some(inner) = self.inner.close() {
            inner.cancel();
        }
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.inner.close().map(|inner| inner.stop()).unwrap_or_default()
    }
}

fn repeating<T: Element>(source: SequenceRef<T>, until: Until) -> SequenceRef<T> {
    sequence(move |ctx| {
        ProducerCursor::boxed(
            "repeat",
            Repeat {
                context: ctx.clone(),
                source: source.clone(),
                until,
                inner: InnerSlot::new(),
                progress: Mutex::new((0, false)),
            },
        )
    })
}

/// Run `source` to completion `count` times in total, restarting it under the
/// same context. A failed run is never restarted.
pub fn repeat<T: Element>(source: SequenceRef<T>, count: usize) -> SequenceRef<T> {
    repeating(source, Until::Passes(count))
}

pub fn repeat_forever<T: Element>(source: SequenceRef<T>) -> SequenceRef<T> {
    repeating(source, Until::Forever)
}

/// Restart `source` until one run produces no elements.
pub fn repeat_until_empty<T: Element>(source: SequenceRef<T>) -> SequenceRef<T> {
    repeating(source, Until::Empty)
}
