// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error taxonomy for cursors and sequences.
//!
//! Four kinds of failure are kept apart:
//!
//! * [`SequenceError::Element`] - raised by user code (a projection, a predicate,
//!   a producer factory).
//! * [`SequenceError::OverlappingAdvance`] - a protocol violation, two `advance`
//!   calls in flight on the same cursor.
//! * [`SequenceError::Cancelled`] - cooperative cancellation. Never an element
//!   failure.
//! * [`SequenceError::Aggregate`] - several failures raced each other in a fan-in
//!   combinator; every cause is kept.
//!
//! All variants are `Clone` because a single upstream failure may have to be
//! delivered to several downstream queues.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::traits::CursorState;

/// Boxed error type accepted from user callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the engine.
pub type SequenceResult<T> = Result<T, SequenceError>;

/// An error raised by user code while producing or transforming an element.
#[derive(Clone)]
pub struct ElementError(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl ElementError {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// Build an element error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(Arc::new(MessageError(message.into())))
    }

    /// Borrow the underlying error.
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl From<BoxError> for ElementError {
    fn from(error: BoxError) -> Self {
        Self(Arc::from(error))
    }
}

impl fmt::Debug for ElementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ElementError").field(&self.0.to_string()).finish()
    }
}

impl fmt::Display for ElementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug)]
struct MessageError(String);

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for MessageError {}

/// Two or more failures observed together by a fan-in combinator.
#[derive(Debug, Clone, Default)]
pub struct AggregateError {
    causes: Vec<SequenceError>,
}

impl AggregateError {
    pub fn new(causes: Vec<SequenceError>) -> Self {
        let mut flattened = Vec::with_capacity(causes.len());
        for cause in causes {
            match cause {
                SequenceError::Aggregate(inner) => flattened.extend(inner.causes),
                other => flattened.push(other),
            }
        }
        Self { causes: flattened }
    }

    pub fn causes(&self) -> &[SequenceError] {
        &self.causes
    }

    pub fn len(&self) -> usize {
        self.causes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred", self.causes.len())?;
        for (i, cause) in self.causes.iter().enumerate() {
            write!(f, "{}{}", if i == 0 { ": " } else { "; " }, cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Errors surfaced by [`Cursor::advance`](crate::traits::Cursor::advance) and queue operations.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum SequenceError {
    /// User code failed while producing or transforming an element.
    #[error("element error: {0}")]
    Element(ElementError),

    /// A second `advance` was issued while one was still in flight.
    #[error("advance called while a previous advance is still in flight")]
    OverlappingAdvance,

    /// The cursor (or the operation it was waiting on) was cancelled.
    #[error("operation was cancelled")]
    Cancelled,

    /// Several sources failed together; all causes are preserved.
    #[error("{0}")]
    Aggregate(AggregateError),

    /// `advance` was called on a cursor that already reached a terminal state.
    #[error("cursor is already {state}")]
    Terminated { state: CursorState },

    /// A seedless aggregate ran over a sequence with no elements.
    #[error("sequence contains no elements")]
    EmptySequence,

    /// A broadcast output was started twice under the same context.
    #[error("broadcast output {index} is already attached for this context")]
    DuplicateSubscriber { index: usize },

    /// A push was attempted on a queue that was already completed or failed.
    #[error("queue no longer accepts values")]
    Closed,
}

impl SequenceError {
    /// Wrap any error raised by user code.
    pub fn element<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SequenceError::Element(ElementError::new(error))
    }

    /// Element error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        SequenceError::Element(ElementError::msg(message))
    }

    /// Aggregate a set of failures. Nested aggregates are flattened.
    pub fn aggregate(causes: Vec<SequenceError>) -> Self {
        SequenceError::Aggregate(AggregateError::new(causes))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SequenceError::Cancelled)
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SequenceError::Element(_) => "element_error",
            SequenceError::OverlappingAdvance => "overlapping_advance",
            SequenceError::Cancelled => "cancelled",
            SequenceError::Aggregate(_) => "aggregate_error",
            SequenceError::Terminated { .. } => "terminated",
            SequenceError::EmptySequence => "empty_sequence",
            SequenceError::DuplicateSubscriber { .. } => "duplicate_subscriber",
            SequenceError::Closed => "closed",
        }
    }
}

impl From<ElementError> for SequenceError {
    fn from(error: ElementError) -> Self {
        SequenceError::Element(error)
    }
}

impl From<BoxError> for SequenceError {
    fn from(error: BoxError) -> Self {
        SequenceError::Element(ElementError::from(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_flattens_nested_aggregates() {
        let inner = SequenceError::aggregate(vec![SequenceError::msg("a"), SequenceError::msg("b")]);
        let outer = SequenceError::aggregate(vec![inner, SequenceError::msg("c")]);

        match outer {
            SequenceError::Aggregate(agg) => {
                assert_eq!(agg.len(), 3);
                let text: Vec<String> = agg.causes().iter().map(|c| c.to_string()).collect();
                assert_eq!(text, vec!["element error: a", "element error: b", "element error: c"]);
            }
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_is_not_an_element_error() {
        assert!(SequenceError::Cancelled.is_cancelled());
        assert!(!SequenceError::msg("boom").is_cancelled());
        assert_eq!(SequenceError::Cancelled.as_label(), "cancelled");
        assert_eq!(SequenceError::msg("boom").as_label(), "element_error");
    }

    #[test]
    fn test_element_error_display_passes_through() {
        let err = SequenceError::element(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        assert_eq!(err.to_string(), "element error: disk gone");
    }
}
