// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for configuration loading and runtime assembly.

use std::fmt::{Display, Formatter};

use tracing::Span;

use crate::observability::messages::StructuredLog;

/// Engine configuration was loaded from disk.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ConfigLoaded<'a> {
    pub path: &'a str,
}

impl Display for ConfigLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Loaded stream engine config from '{}'", self.path)
    }
}

impl StructuredLog for ConfigLoaded<'_> {
    fn log(&self) {
        tracing::info!(path = self.path, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("config_loaded", span_name = name, path = self.path)
    }
}

/// A runtime was assembled with its effective defaults.
///
/// # Log Level
/// `info!` - Important operational event
pub struct RuntimeAssembled {
    pub queue_capacity: usize,
    pub broadcast_capacity: usize,
    pub share_read_ahead: usize,
    pub merge_max_concurrency: Option<usize>,
}

impl Display for RuntimeAssembled {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let concurrency = match self.merge_max_concurrency {
            Some(limit) => limit.to_string(),
            None => "unbounded".to_string(),
        };
        write!(
            f,
            "Stream runtime ready: queue_capacity={}, broadcast_capacity={}, share_read_ahead={}, merge_max_concurrency={}",
            self.queue_capacity, self.broadcast_capacity, self.share_read_ahead, concurrency
        )
    }
}

impl StructuredLog for RuntimeAssembled {
    fn log(&self) {
        tracing::info!(
            queue_capacity = self.queue_capacity,
            broadcast_capacity = self.broadcast_capacity,
            share_read_ahead = self.share_read_ahead,
            merge_max_concurrency = ?self.merge_max_concurrency,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "runtime",
            span_name = name,
            queue_capacity = self.queue_capacity,
            broadcast_capacity = self.broadcast_capacity,
        )
    }
}
