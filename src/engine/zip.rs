// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Zip: advance several cursors in lock-step.
//!
//! Every `advance` steps all children concurrently under a zip-local token. A
//! child that ends or fails cancels that token so in-flight siblings give up
//! instead of producing values that would be discarded anyway. The round then
//! resolves to one of: a full tuple, the end (any child exhausted), or an
//! aggregate of every error observed in the round.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::engine::cursor::{sequence, Producer, ProducerCursor};
use crate::errors::{SequenceError, SequenceResult};
use crate::observability::messages::fan_in::{FanInFailed, SourceFailed};
use crate::observability::messages::StructuredLog;
use crate::traits::{BoxCursor, Cursor, CursorExt, Element, SequenceRef, Step, StopFuture};

/// Step `cursor`, cancelling `round` when it does not yield a value and
/// `stop_on_end` is set (errors always cancel the round).
pub(crate) async fn step_in_round<T: Element>(
    cursor: &dyn Cursor<T>,
    round: &CancellationToken,
    stop_on_end: bool,
) -> Step<T> {
    let step = cursor.next_step(round).await;
    match &step {
        Step::Value(_) => {}
        Step::End if !stop_on_end => {}
        _ => round.cancel(),
    }
    step
}

/// What a round of steps amounted to, once values are set aside.
pub(crate) enum RoundOutcome {
    Values,
    Ended,
    Failed(SequenceError),
}

/// Classify the non-value steps of a round. Errors win over exhaustion, and a
/// cancellation only counts when nothing else explains it.
pub(crate) fn resolve_round(operator: &str, steps: &[Step<()>]) -> RoundOutcome {
    let mut errors = Vec::new();
    let mut ended = false;
    let mut cancelled = false;

    for (source, step) in steps.iter().enumerate() {
        match step {
            Step::Value(()) => {}
            Step::End => ended = true,
            Step::Cancelled => cancelled = true,
            Step::Error(err) => {
                SourceFailed {
                    operator,
                    source,
                    error: err,
                }
                .log();
                errors.push(err.clone());
            }
        }
    }

    if !errors.is_empty() {
        FanInFailed {
            operator,
            causes: errors.len(),
        }
        .log();
        RoundOutcome::Failed(SequenceError::aggregate(errors))
    } else if ended {
        RoundOutcome::Ended
    } else if cancelled {
        RoundOutcome::Failed(SequenceError::Cancelled)
    } else {
        RoundOutcome::Values
    }
}

pub(crate) fn shape<T>(step: &Step<T>) -> Step<()> {
    match step {
        Step::Value(_) => Step::Value(()),
        Step::End => Step::End,
        Step::Cancelled => Step::Cancelled,
        Step::Error(err) => Step::Error(err.clone()),
    }
}

struct Zip2<A, B> {
    first: BoxCursor<A>,
    second: BoxCursor<B>,
    round: CancellationToken,
}

#[async_trait]
impl<A: Element, B: Element> Producer<(A, B)> for Zip2<A, B> {
    async fn next(&self, _cancel: &CancellationToken) -> SequenceResult<Option<(A, B)>> {
        let (a, b) = tokio::join!(
            step_in_round(self.first.as_ref(), &self.round, true),
            step_in_round(self.second.as_ref(), &self.round, true),
        );

        if let (Step::Value(a), Step::Value(b)) = (&a, &b) {
            return Ok(Some((a.clone(), b.clone())));
        }
        match resolve_round("zip", &[shape(&a), shape(&b)]) {
            RoundOutcome::Failed(err) => Err(err),
            _ => Ok(None),
        }
    }

    fn cancel(&self) {
        self.round.cancel();
        self.first.cancel();
        self.second.cancel();
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.round.cancel();
        let mut pending = self.first.stop();
        pending.extend(self.second.stop());
        pending
    }
}

/// Pair up elements by position. Ends as soon as either side ends.
pub fn zip<A: Element, B: Element>(first: SequenceRef<A>, second: SequenceRef<B>) -> SequenceRef<(A, B)> {
    sequence(move |ctx| {
        ProducerCursor::boxed(
            "zip",
            Zip2 {
                first: first.start(ctx),
                second: second.start(ctx),
                round: CancellationToken::new(),
            },
        )
    })
}

struct ZipN<T> {
    sources: Vec<BoxCursor<T>>,
    round: CancellationToken,
}

#[async_trait]
impl<T: Element> Producer<Vec<T>> for ZipN<T> {
    async fn next(&self, _cancel: &CancellationToken) -> SequenceResult<Option<Vec<T>>> {
        if self.sources.is_empty() {
            return Ok(None);
        }

        let steps = futures::future::join_all(
            self.sources
                .iter()
                .map(|source| step_in_round(source.as_ref(), &self.round, true)),
        )
        .await;

        let shapes: Vec<Step<()>> = steps.iter().map(shape).collect();
        match resolve_round("zip", &shapes) {
            RoundOutcome::Values => Ok(Some(
                steps
                    .into_iter()
                    .filter_map(|step| match step {
                        Step::Value(value) => Some(value),
                        _ => None,
                    })
                    .collect(),
            )),
            RoundOutcome::Ended => Ok(None),
            RoundOutcome::Failed(err) => Err(err),
        }
    }

    fn cancel(&self) {
        self.round.cancel();
        for source in &self.sources {
            source.cancel();
        }
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.round.cancel();
        self.sources.iter().flat_map(|source| source.stop()).collect()
    }
}

/// Lock-step any number of same-typed sources into vectors.
pub fn zip_n<T: Element>(sources: Vec<SequenceRef<T>>) -> SequenceRef<Vec<T>> {
    let sources = Arc::new(sources);
    sequence(move |ctx| {
        ProducerCursor::boxed(
            "zip",
            ZipN {
                sources: sources.iter().map(|source| source.start(ctx)).collect(),
                round: CancellationToken::new(),
            },
        )
    })
}
