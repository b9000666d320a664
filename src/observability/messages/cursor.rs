// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for cursor lifecycle events.

use std::fmt::{Display, Formatter};

use tracing::Span;

use crate::errors::SequenceError;
use crate::observability::messages::StructuredLog;

/// A cursor faulted: its producer raised an error.
///
/// # Log Level
/// `debug!` - The graph engine owns surfacing the failure to users
pub struct CursorFaulted<'a> {
    pub operator: &'a str,
    pub error: &'a SequenceError,
}

impl Display for CursorFaulted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Cursor '{}' faulted: {}", self.operator, self.error)
    }
}

impl StructuredLog for CursorFaulted<'_> {
    fn log(&self) {
        tracing::debug!(
            operator = self.operator,
            error_kind = self.error.as_label(),
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "cursor_faulted",
            span_name = name,
            operator = self.operator,
            error_kind = self.error.as_label(),
        )
    }
}

/// A cursor was cancelled, explicitly or by its caller's signal.
///
/// # Log Level
/// `trace!` - High-volume lifecycle detail
pub struct CursorCanceled<'a> {
    pub operator: &'a str,
}

impl Display for CursorCanceled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Cursor '{}' canceled", self.operator)
    }
}

impl StructuredLog for CursorCanceled<'_> {
    fn log(&self) {
        tracing::trace!(operator = self.operator, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!("cursor_canceled", span_name = name, operator = self.operator)
    }
}
