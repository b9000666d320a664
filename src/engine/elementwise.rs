// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stateless and counter-based operators: map, filter, inspect, skip, take, delay.
//!
//! Each operator wraps exactly one source cursor. An error from user code
//! (projection or predicate) faults the composed cursor, which cancels the
//! source; the error itself is passed through unchanged.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::engine::cursor::{sequence, Producer, ProducerCursor};
use crate::errors::SequenceResult;
use crate::traits::{BoxCursor, CursorExt, Element, SequenceRef, StopFuture};

struct Select<T, U, F> {
    source: BoxCursor<T>,
    projection: Arc<F>,
    _out: PhantomData<fn() -> U>,
}

#[async_trait]
impl<T, U, F> Producer<U> for Select<T, U, F>
where
    T: Element,
    U: Element,
    F: Fn(T) -> SequenceResult<U> + Send + Sync + 'static,
{
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<U>> {
        match self.source.next_value(cancel).await? {
            Some(value) => (self.projection)(value).map(Some),
            None => Ok(None),
        }
    }

    fn cancel(&self) {
        self.source.cancel();
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.source.stop()
    }
}

/// Project every element with a fallible function.
pub fn try_map<T, U, F>(source: SequenceRef<T>, projection: F) -> SequenceRef<U>
where
    T: Element,
    U: Element,
    F: Fn(T) -> SequenceResult<U> + Send + Sync + 'static,
{
    let projection = Arc::new(projection);
    sequence(move |ctx| {
        ProducerCursor::boxed(
            "map",
            Select {
                source: source.start(ctx),
                projection: projection.clone(),
                _out: PhantomData,
            },
        )
    })
}

/// Project every element.
pub fn map<T, U, F>(source: SequenceRef<T>, projection: F) -> SequenceRef<U>
where
    T: Element,
    U: Element,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    try_map(source, move |value| Ok(projection(value)))
}

/// Run a side effect on every element without changing it.
pub fn inspect<T, F>(source: SequenceRef<T>, observer: F) -> SequenceRef<T>
where
    T: Element,
    F: Fn(&T) + Send + Sync + 'static,
{
    try_map(source, move |value| {
        observer(&value);
        Ok(value)
    })
}

struct Where<T, F> {
    source: BoxCursor<T>,
    predicate: Arc<F>,
}

#[async_trait]
impl<T, F> Producer<T> for Where<T, F>
where
    T: Element,
    F: Fn(&T) -> SequenceResult<bool> + Send + Sync + 'static,
{
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        while let Some(value) = self.source.next_value(cancel).await? {
            if (self.predicate)(&value)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn cancel(&self) {
        self.source.cancel();
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.source.stop()
    }
}

/// Keep elements for which a fallible predicate holds.
pub fn try_filter<T, F>(source: SequenceRef<T>, predicate: F) -> SequenceRef<T>
where
    T: Element,
    F: Fn(&T) -> SequenceResult<bool> + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    sequence(move |ctx| {
        ProducerCursor::boxed(
            "filter",
            Where {
                source: source.start(ctx),
                predicate: predicate.clone(),
            },
        )
    })
}

/// Keep elements for which `predicate` holds.
pub fn filter<T, F>(source: SequenceRef<T>, predicate: F) -> SequenceRef<T>
where
    T: Element,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    try_filter(source, move |value| Ok(predicate(value)))
}

struct Skip<T> {
    source: BoxCursor<T>,
    pending: AtomicUsize,
}

#[async_trait]
impl<T: Element> Producer<T> for Skip<T> {
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        while self.pending.load(Ordering::Acquire) > 0 {
            if self.source.next_value(cancel).await?.is_none() {
                return Ok(None);
            }
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
        self.source.next_value(cancel).await
    }

    fn cancel(&self) {
        self.source.cancel();
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.source.stop()
    }
}

/// Drop the first `count` elements.
pub fn skip<T: Element>(source: SequenceRef<T>, count: usize) -> SequenceRef<T> {
    sequence(move |ctx| {
        ProducerCursor::boxed(
            "skip",
            Skip {
                source: source.start(ctx),
                pending: AtomicUsize::new(count),
            },
        )
    })
}

struct Take<T> {
    source: BoxCursor<T>,
    limit: usize,
    delivered: AtomicUsize,
}

#[async_trait]
impl<T: Element> Producer<T> for Take<T> {
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        if self.delivered.load(Ordering::Acquire) >= self.limit {
            self.source.cancel();
            return Ok(None);
        }
        let value = self.source.next_value(cancel).await?;
        if value.is_some() && self.delivered.fetch_add(1, Ordering::AcqRel) + 1 == self.limit {
            // release upstream now rather than at natural exhaustion
            self.source.cancel();
        }
        Ok(value)
    }

    fn cancel(&self) {
        self.source.cancel();
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.source.stop()
    }
}

/// Yield at most `count` elements, cancelling the source as soon as the last
/// one has been delivered.
pub fn take<T: Element>(source: SequenceRef<T>, count: usize) -> SequenceRef<T> {
    sequence(move |ctx| {
        ProducerCursor::boxed(
            "take",
            Take {
                source: source.start(ctx),
                limit: count,
                delivered: AtomicUsize::new(0),
            },
        )
    })
}

struct Delay<T> {
    source: BoxCursor<T>,
    period: Duration,
}

#[async_trait]
impl<T: Element> Producer<T> for Delay<T> {
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        tokio::time::sleep(self.period).await;
        self.source.next_value(cancel).await
    }

    fn cancel(&self) {
        self.source.cancel();
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.source.stop()
    }
}

/// Wait `period` before pulling each element.
pub fn delay<T: Element>(source: SequenceRef<T>, period: Duration) -> SequenceRef<T> {
    sequence(move |ctx| {
        ProducerCursor::boxed(
            "delay",
            Delay {
                source: source.start(ctx),
                period,
            },
        )
    })
}
