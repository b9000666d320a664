// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Operators with local accumulated state: buffer, scan, aggregate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::engine::cursor::{sequence, Producer, ProducerCursor};
use crate::errors::{SequenceError, SequenceResult};
use crate::traits::{BoxCursor, CursorExt, Element, SequenceRef, StopFuture};

struct Chunks<T> {
    source: BoxCursor<T>,
    size: Option<usize>,
    ended: AtomicBool,
}

#[async_trait]
impl<T: Element> Producer<Vec<T>> for Chunks<T> {
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<Vec<T>>> {
        if self.ended.load(Ordering::Acquire) {
            return Ok(None);
        }

        let mut chunk = Vec::with_capacity(self.size.unwrap_or(0));
        loop {
            if let Some(size) = self.size {
                if chunk.len() >= size {
                    return Ok(Some(chunk));
                }
            }
            match self.source.next_value(cancel).await? {
                Some(value) => chunk.push(value),
                None => {
                    self.ended.store(true, Ordering::Release);
                    // a whole-sequence buffer always yields its one list
                    return Ok((self.size.is_none() || !chunk.is_empty()).then_some(chunk));
                }
            }
        }
    }

    fn cancel(&self) {
        self.source.cancel();
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.source.stop()
    }
}

fn chunks<T: Element>(source: SequenceRef<T>, size: Option<usize>) -> SequenceRef<Vec<T>> {
    sequence(move |ctx| {
        ProducerCursor::boxed(
            "buffer",
            Chunks {
                source: source.start(ctx),
                size,
                ended: AtomicBool::new(false),
            },
        )
    })
}

/// Drain the whole source into a single list.
pub fn buffer_all<T: Element>(source: SequenceRef<T>) -> SequenceRef<Vec<T>> {
    chunks(source, None)
}

/// Successive lists of `size` elements; the last one may be shorter.
pub fn buffer<T: Element>(source: SequenceRef<T>, size: usize) -> SequenceRef<Vec<T>> {
    chunks(source, Some(size.max(1)))
}

struct Scan<T, A, F> {
    source: BoxCursor<T>,
    state: Mutex<A>,
    fold: Arc<F>,
}

#[async_trait]
impl<T, A, F> Producer<A> for Scan<T, A, F>
where
    T: Element,
    A: Element,
    F: Fn(A, T) -> A + Send + Sync + 'static,
{
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<A>> {
        let Some(value) = self.source.next_value(cancel).await? else {
            return Ok(None);
        };
        let mut state = self.state.lock();
        let next = (self.fold)(state.clone(), value);
        *state = next.clone();
        Ok(Some(next))
    }

    fn cancel(&self) {
        self.source.cancel();
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.source.stop()
    }
}

/// Running fold: emits every intermediate accumulator value.
pub fn scan<T, A, F>(source: SequenceRef<T>, seed: A, fold: F) -> SequenceRef<A>
where
    T: Element,
    A: Element,
    F: Fn(A, T) -> A + Send + Sync + 'static,
{
    let fold = Arc::new(fold);
    sequence(move |ctx| {
        ProducerCursor::boxed(
            "scan",
            Scan {
                source: source.start(ctx),
                state: Mutex::new(seed.clone()),
                fold: fold.clone(),
            },
        )
    })
}

struct Aggregate<T, A, F> {
    source: BoxCursor<T>,
    seed: Option<A>,
    fold: Arc<F>,
    done: AtomicBool,
}

#[async_trait]
impl<T, A, F> Producer<A> for Aggregate<T, A, F>
where
    T: Element,
    A: Element,
    F: Fn(Option<A>, T) -> A + Send + Sync + 'static,
{
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<A>> {
        if self.done.swap(true, Ordering::AcqRel) {
            return Ok(None);
        }
        let mut accumulator = self.seed.clone();
        while let Some(value) = self.source.next_value(cancel).await? {
            accumulator = Some((self.fold)(accumulator, value));
        }
        accumulator.map(Some).ok_or(SequenceError::EmptySequence)
    }

    fn cancel(&self) {
        self.source.cancel();
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.source.stop()
    }
}

/// Fold the source into one value, seeded with the first element. Fails with
/// [`SequenceError::EmptySequence`] on an empty source.
pub fn aggregate<T, F>(source: SequenceRef<T>, fold: F) -> SequenceRef<T>
where
    T: Element,
    F: Fn(T, T) -> T + Send + Sync + 'static,
{
    let fold = Arc::new(move |acc: Option<T>, value: T| match acc {
        Some(acc) => fold(acc, value),
        None => value,
    });
    sequence(move |ctx| {
        ProducerCursor::boxed(
            "aggregate",
            Aggregate {
                source: source.start(ctx),
                seed: None,
                fold: fold.clone(),
                done: AtomicBool::new(false),
            },
        )
    })
}

/// Fold the source into one value starting from `seed`. An empty source
/// yields the seed.
pub fn aggregate_with<T, A, F>(source: SequenceRef<T>, seed: A, fold: F) -> SequenceRef<A>
where
    T: Element,
    A: Element,
    F: Fn(A, T) -> A + Send + Sync + 'static,
{
    let initial = seed.clone();
    let fold = Arc::new(move |acc: Option<A>, value: T| {
        fold(acc.unwrap_or_else(|| initial.clone()), value)
    });
    sequence(move |ctx| {
        ProducerCursor::boxed(
            "aggregate",
            Aggregate {
                source: source.start(ctx),
                seed: Some(seed.clone()),
                fold: fold.clone(),
                done: AtomicBool::new(false),
            },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::Context;
    use crate::engine::sinks::to_list_async;
    use crate::engine::sources::{empty, from_iter, range};

    #[tokio::test]
    async fn test_buffer_chunks_with_short_tail() {
        let seq = buffer(range(1, 10), 3);
        let chunks = to_list_async(&seq, &Context::new()).await.unwrap();
        assert_eq!(chunks, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9], vec![10]]);
    }

    #[tokio::test]
    async fn test_buffer_exact_multiple_has_no_empty_tail() {
        let seq = buffer(range(1, 4), 2);
        let chunks = to_list_async(&seq, &Context::new()).await.unwrap();
        assert_eq!(chunks, vec![vec![1, 2], vec![3, 4]]);
    }

    #[tokio::test]
    async fn test_buffer_all_yields_exactly_one_list() {
        let whole = to_list_async(&buffer_all(range(1, 4)), &Context::new()).await.unwrap();
        assert_eq!(whole, vec![vec![1, 2, 3, 4]]);

        let nothing = to_list_async(&buffer_all(empty::<u8>()), &Context::new()).await.unwrap();
        assert_eq!(nothing, vec![Vec::<u8>::new()]);
    }

    #[tokio::test]
    async fn test_scan_emits_each_intermediate() {
        let seq = scan(range(1, 4), 0, |acc, v| acc + v);
        assert_eq!(to_list_async(&seq, &Context::new()).await.unwrap(), vec![1, 3, 6, 10]);
    }

    #[tokio::test]
    async fn test_aggregate_emits_only_final_value() {
        let seq = aggregate(range(1, 4), |a, b| a * b);
        assert_eq!(to_list_async(&seq, &Context::new()).await.unwrap(), vec![24]);

        let words = aggregate_with(from_iter(vec!["a", "b"]), String::new(), |mut acc, w| {
            acc.push_str(w);
            acc
        });
        assert_eq!(to_list_async(&words, &Context::new()).await.unwrap(), vec!["ab".to_string()]);
    }

    #[tokio::test]
    async fn test_aggregate_without_seed_fails_on_empty() {
        let err = to_list_async(&aggregate(empty::<i32>(), |a, b| a + b), &Context::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SequenceError::EmptySequence));

        let seeded = aggregate_with(empty::<i32>(), 7, |a, b| a + b);
        assert_eq!(to_list_async(&seeded, &Context::new()).await.unwrap(), vec![7]);
    }
}
