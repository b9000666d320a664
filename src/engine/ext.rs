// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Fluent combinator methods on [`SequenceRef`].
//!
//! ```
//! use seqflow::engine::{range, Context, SequenceExt};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let evens = range(1, 10).filter(|v| v % 2 == 0).map(|v| v * 10);
//! let items = evens.to_list(&Context::new()).await.unwrap();
//! assert_eq!(items, vec![20, 40, 60, 80, 100]);
//! # }
//! ```

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::engine::context::Context;
use crate::engine::{broadcast, elementwise, equal, merge, sequential, share, sinks, stateful, window, zip};
use crate::errors::SequenceResult;
use crate::traits::{Element, SequenceRef};

pub trait SequenceExt<T: Element> {
    fn map<U, F>(&self, projection: F) -> SequenceRef<U>
    where
        U: Element,
        F: Fn(T) -> U + Send + Sync + 'static;

    fn try_map<U, F>(&self, projection: F) -> SequenceRef<U>
    where
        U: Element,
        F: Fn(T) -> SequenceResult<U> + Send + Sync + 'static;

    fn filter<F>(&self, predicate: F) -> SequenceRef<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static;

    fn try_filter<F>(&self, predicate: F) -> SequenceRef<T>
    where
        F: Fn(&T) -> SequenceResult<bool> + Send + Sync + 'static;

    fn inspect<F>(&self, observer: F) -> SequenceRef<T>
    where
        F: Fn(&T) + Send + Sync + 'static;

    fn skip(&self, count: usize) -> SequenceRef<T>;
    fn take(&self, count: usize) -> SequenceRef<T>;
    fn delay(&self, period: Duration) -> SequenceRef<T>;

    fn buffer(&self, size: usize) -> SequenceRef<Vec<T>>;
    fn buffer_all(&self) -> SequenceRef<Vec<T>>;
    fn window(&self, size: usize) -> SequenceRef<SequenceRef<T>>;

    fn scan<A, F>(&self, seed: A, fold: F) -> SequenceRef<A>
    where
        A: Element,
        F: Fn(A, T) -> A + Send + Sync + 'static;

    fn aggregate<F>(&self, fold: F) -> SequenceRef<T>
    where
        F: Fn(T, T) -> T + Send + Sync + 'static;

    fn aggregate_with<A, F>(&self, seed: A, fold: F) -> SequenceRef<A>
    where
        A: Element,
        F: Fn(A, T) -> A + Send + Sync + 'static;

    fn concat_with(&self, next: SequenceRef<T>) -> SequenceRef<T>;
    fn repeat(&self, count: usize) -> SequenceRef<T>;
    fn repeat_forever(&self) -> SequenceRef<T>;
    fn repeat_until_empty(&self) -> SequenceRef<T>;

    fn merge_with(&self, other: SequenceRef<T>) -> SequenceRef<T>;
    fn zip_with<B: Element>(&self, other: SequenceRef<B>) -> SequenceRef<(T, B)>;
    fn sequence_equal_by<F>(&self, other: SequenceRef<T>, comparer: F) -> SequenceRef<bool>
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static;

    fn broadcast(&self, outputs: usize) -> Vec<SequenceRef<T>>;
    fn share(&self) -> SequenceRef<T>;

    /// Start under `context` and drain into a vector.
    fn to_list<'a>(&'a self, context: &'a Context) -> BoxFuture<'a, SequenceResult<Vec<T>>>;
}

impl<T: Element> SequenceExt<T> for SequenceRef<T> {
    fn map<U, F>(&self, projection: F) -> SequenceRef<U>
    where
        U: Element,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        elementwise::map(self.clone(), projection)
    }

    fn try_map<U, F>(&self, projection: F) -> SequenceRef<U>
    where
        U: Element,
        F: Fn(T) -> SequenceResult<U> + Send + Sync + 'static,
    {
        elementwise::try_map(self.clone(), projection)
    }

    fn filter<F>(&self, predicate: F) -> SequenceRef<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        elementwise::filter(self.clone(), predicate)
    }

    fn try_filter<F>(&self, predicate: F) -> SequenceRef<T>
    where
        F: Fn(&T) -> SequenceResult<bool> + Send + Sync + 'static,
    {
        elementwise::try_filter(self.clone(), predicate)
    }

    fn inspect<F>(&self, observer: F) -> SequenceRef<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        elementwise::inspect(self.clone(), observer)
    }

    fn skip(&self, count: usize) -> SequenceRef<T> {
        elementwise::skip(self.clone(), count)
    }

    fn take(&self, count: usize) -> SequenceRef<T> {
        elementwise::take(self.clone(), count)
    }

    fn delay(&self, period: Duration) -> SequenceRef<T> {
        elementwise::delay(self.clone(), period)
    }

    fn buffer(&self, size: usize) -> SequenceRef<Vec<T>> {
        stateful::buffer(self.clone(), size)
    }

    fn buffer_all(&self) -> SequenceRef<Vec<T>> {
        stateful::buffer_all(self.clone())
    }

    fn window(&self, size: usize) -> SequenceRef<SequenceRef<T>> {
        window::window(self.clone(), size)
    }

    fn scan<A, F>(&self, seed: A, fold: F) -> SequenceRef<A>
    where
        A: Element,
        F: Fn(A, T) -> A + Send + Sync + 'static,
    {
        stateful::scan(self.clone(), seed, fold)
    }

    fn aggregate<F>(&self, fold: F) -> SequenceRef<T>
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        stateful::aggregate(self.clone(), fold)
    }

    fn aggregate_with<A, F>(&self, seed: A, fold: F) -> SequenceRef<A>
    where
        A: Element,
        F: Fn(A, T) -> A + Send + Sync + 'static,
    {
        stateful::aggregate_with(self.clone(), seed, fold)
    }

    fn concat_with(&self, next: SequenceRef<T>) -> SequenceRef<T> {
        sequential::concat2(self.clone(), next)
    }

    fn repeat(&self, count: usize) -> SequenceRef<T> {
        sequential::repeat(self.clone(), count)
    }

    fn repeat_forever(&self) -> SequenceRef<T> {
        sequential::repeat_forever(self.clone())
    }

    fn repeat_until_empty(&self) -> SequenceRef<T> {
        sequential::repeat_until_empty(self.clone())
    }

    fn merge_with(&self, other: SequenceRef<T>) -> SequenceRef<T> {
        merge::merge(self.clone(), other)
    }

    fn zip_with<B: Element>(&self, other: SequenceRef<B>) -> SequenceRef<(T, B)> {
        zip::zip(self.clone(), other)
    }

    fn sequence_equal_by<F>(&self, other: SequenceRef<T>, comparer: F) -> SequenceRef<bool>
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        equal::sequence_equal_by(self.clone(), other, comparer)
    }

    fn broadcast(&self, outputs: usize) -> Vec<SequenceRef<T>> {
        broadcast::broadcast(self.clone(), outputs)
    }

    fn share(&self) -> SequenceRef<T> {
        share::share(self.clone())
    }

    fn to_list<'a>(&'a self, context: &'a Context) -> BoxFuture<'a, SequenceResult<Vec<T>>> {
        sinks::to_list_async(self, context).boxed()
    }
}

/// Flattening for sequences of sequences.
pub trait FlattenExt<T: Element> {
    fn concat(&self) -> SequenceRef<T>;
    fn merge_all(&self, max_concurrent: Option<usize>) -> SequenceRef<T>;
}

impl<T: Element> FlattenExt<T> for SequenceRef<SequenceRef<T>> {
    fn concat(&self) -> SequenceRef<T> {
        sequential::concat(self.clone())
    }

    fn merge_all(&self, max_concurrent: Option<usize>) -> SequenceRef<T> {
        merge::merge_all(self.clone(), max_concurrent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sources::{from_iter, range};

    #[tokio::test]
    async fn test_fluent_chain() {
        let ctx = Context::new();
        let total = range(1, 4)
            .concat_with(range(5, 2))
            .scan(0, |acc, v| acc + v)
            .take(3)
            .to_list(&ctx)
            .await
            .unwrap();
        assert_eq!(total, vec![1, 3, 6]);
    }

    #[tokio::test]
    async fn test_window_then_concat_restores_source() {
        let ctx = Context::new();
        let flat = range(0, 7).window(3).concat().to_list(&ctx).await.unwrap();
        assert_eq!(flat, (0..7).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_zip_with_and_equality() {
        let ctx = Context::new();
        let pairs = from_iter(vec![1, 2]).zip_with(from_iter(vec!["one", "two"]));
        assert_eq!(pairs.to_list(&ctx).await.unwrap(), vec![(1, "one"), (2, "two")]);

        let same = range(0, 3).sequence_equal_by(range(0, 3), |a, b| a == b);
        assert_eq!(same.to_list(&ctx).await.unwrap(), vec![true]);
    }
}
