// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! This module provides centralized message types for all diagnostic and operational
//! logging throughout the stream engine. Message types follow a struct-based pattern
//! with `Display` trait implementation to:
//!
//! * Eliminate magic strings scattered throughout the codebase
//! * Keep log text and structured fields in one place per event
//! * Provide consistent, structured logging output
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::cursor` - Cursor lifecycle (faults, cancellation)
//! * `messages::fan_in` - Merge/zip source failures and completion
//! * `messages::fan_out` - Shared per-context state and pump lifecycle
//! * `messages::runtime` - Configuration loading and runtime assembly
//!
//! # Usage
//!
//! ```rust
//! use seqflow::errors::SequenceError;
//! use seqflow::observability::messages::cursor::CursorFaulted;
//! use seqflow::observability::messages::StructuredLog;
//!
//! let error = SequenceError::msg("bad element");
//! CursorFaulted { operator: "map", error: &error }.log();
//! ```

pub mod messages;
