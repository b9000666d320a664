// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Element-wise equality of two sequences, emitted as a single `bool`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::engine::cursor::{sequence, Producer, ProducerCursor};
use crate::engine::zip::{resolve_round, shape, step_in_round, RoundOutcome};
use crate::errors::SequenceResult;
use crate::traits::{BoxCursor, Element, SequenceRef, Step, StopFuture};

struct Equal<T, F> {
    left: BoxCursor<T>,
    right: BoxCursor<T>,
    comparer: Arc<F>,
    round: CancellationToken,
    done: AtomicBool,
}

impl<T: Element, F> Equal<T, F>
where
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    async fn compare(&self) -> SequenceResult<bool> {
        loop {
            let (left, right) = tokio::join!(
                step_in_round(self.left.as_ref(), &self.round, false),
                step_in_round(self.right.as_ref(), &self.round, false),
            );

            match (&left, &right) {
                (Step::Value(l), Step::Value(r)) => {
                    if !(self.comparer)(l, r) {
                        return Ok(false);
                    }
                }
                (Step::End, Step::End) => return Ok(true),
                (Step::End, Step::Value(_)) | (Step::Value(_), Step::End) => return Ok(false),
                _ => {
                    return match resolve_round("sequence_equal", &[shape(&left), shape(&right)]) {
                        RoundOutcome::Failed(err) => Err(err),
                        _ => Ok(false),
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<T, F> Producer<bool> for Equal<T, F>
where
    T: Element,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    async fn next(&self, _cancel: &CancellationToken) -> SequenceResult<Option<bool>> {
        if self.done.swap(true, Ordering::AcqRel) {
            return Ok(None);
        }
        let equal = self.compare().await?;
        // both sides are released whatever the verdict
        self.cancel();
        Ok(Some(equal))
    }

    fn cancel(&self) {
        self.round.cancel();
        self.left.cancel();
        self.right.cancel();
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.round.cancel();
        let mut pending = self.left.stop();
        pending.extend(self.right.stop());
        pending
    }
}

/// Compare two sequences with a custom equality.
pub fn sequence_equal_by<T, F>(left: SequenceRef<T>, right: SequenceRef<T>, comparer: F) -> SequenceRef<bool>
where
    T: Element,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    let comparer = Arc::new(comparer);
    sequence(move |ctx| {
        ProducerCursor::boxed(
            "sequence_equal",
            Equal {
                left: left.start(ctx),
                right: right.start(ctx),
                comparer: comparer.clone(),
                round: CancellationToken::new(),
                done: AtomicBool::new(false),
            },
        )
    })
}

pub fn sequence_equal<T: Element + PartialEq>(left: SequenceRef<T>, right: SequenceRef<T>) -> SequenceRef<bool> {
    sequence_equal_by(left, right, |l: &T, r: &T| l == r)
}
