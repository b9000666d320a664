// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable text and
//! [`StructuredLog`] to emit the same event with structured `tracing` fields.
//!
//! # Usage Pattern
//!
//! ```rust
//! use seqflow::observability::messages::fan_in::MergeCompleted;
//! use seqflow::observability::messages::StructuredLog;
//!
//! let msg = MergeCompleted { sources: 3 };
//!
//! tracing::debug!("{}", msg);
//! msg.log();
//! ```

use tracing::Span;

pub mod cursor;
pub mod fan_in;
pub mod fan_out;
pub mod runtime;

/// Emit a message as a structured `tracing` event or span.
pub trait StructuredLog {
    /// Log the event at the level documented on the message type.
    fn log(&self);

    /// Open a span carrying the message's fields.
    fn span(&self, name: &str) -> Span;
}
