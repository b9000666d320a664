// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for fan-in combinators (merge, zip).
//!
//! This module contains message types for logging events related to:
//! * A single source failing inside a merge or zip
//! * The combinator failing with an aggregate of causes
//! * Natural completion of a merge

use std::fmt::{Display, Formatter};

use tracing::Span;

use crate::errors::SequenceError;
use crate::observability::messages::StructuredLog;

/// One source of a fan-in combinator failed.
///
/// # Log Level
/// `warn!` - The whole combinator is about to fail
///
/// # Example
/// ```
/// use seqflow::errors::SequenceError;
/// use seqflow::observability::messages::fan_in::SourceFailed;
///
/// let error = SequenceError::msg("connection reset");
/// let msg = SourceFailed { operator: "merge", source: 2, error: &error };
///
/// assert_eq!(msg.to_string(), "Source 2 of 'merge' failed: element error: connection reset");
/// ```
pub struct SourceFailed<'a> {
    pub operator: &'a str,
    pub source: usize,
    pub error: &'a SequenceError,
}

impl Display for SourceFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Source {} of '{}' failed: {}",
            self.source, self.operator, self.error
        )
    }
}

impl StructuredLog for SourceFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            operator = self.operator,
            source = self.source,
            error_kind = self.error.as_label(),
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "source_failed",
            span_name = name,
            operator = self.operator,
            source = self.source,
        )
    }
}

/// A fan-in combinator failed with every cause collected so far.
///
/// # Log Level
/// `debug!` - Surfaced to the caller through `advance`
pub struct FanInFailed<'a> {
    pub operator: &'a str,
    pub causes: usize,
}

impl Display for FanInFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "'{}' failed with {} collected error(s)",
            self.operator, self.causes
        )
    }
}

impl StructuredLog for FanInFailed<'_> {
    fn log(&self) {
        tracing::debug!(operator = self.operator, causes = self.causes, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "fan_in_failed",
            span_name = name,
            operator = self.operator,
            causes = self.causes,
        )
    }
}

/// Every merged source completed.
///
/// # Log Level
/// `debug!` - Lifecycle detail
pub struct MergeCompleted {
    pub sources: usize,
}

impl Display for MergeCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Merge completed after draining {} source(s)", self.sources)
    }
}

impl StructuredLog for MergeCompleted {
    fn log(&self) {
        tracing::debug!(sources = self.sources, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("merge_completed", span_name = name, sources = self.sources)
    }
}
