// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_BROADCAST_CAPACITY, DEFAULT_MERGE_CAPACITY, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_SHARE_READ_AHEAD, DEFAULT_WINDOW_SIZE,
};
use crate::errors::ConfigError;
use crate::observability::messages::runtime::ConfigLoaded;
use crate::observability::messages::StructuredLog;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Tuning knobs for the stream engine.
///
/// Every section is optional; anything left out falls back to the built-in
/// defaults in [`consts`](crate::config::consts). It is typically loaded from a
/// YAML file.
///
/// # Fields
/// * `queue` - Standalone bounded queue settings
/// * `broadcast` - Per-output queue capacity for broadcast
/// * `share` - Read-ahead for shared sources
/// * `merge` - Concurrency limit and queue capacity for merges
/// * `window` - Default window size
///
/// # Example
/// ```yaml
/// queue:
///   capacity: 8
/// broadcast:
///   capacity: 4
/// share:
///   read_ahead: 2
/// merge:
///   max_concurrency: 16
///   capacity: 32
/// window:
///   size: 100
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub share: ShareConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Broadcast settings.
///
/// `capacity` bounds each output's queue. Once any output's queue is full the
/// shared read waits for that output.
#[derive(Debug, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_broadcast_capacity")]
    pub capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ShareConfig {
    #[serde(default = "default_share_read_ahead")]
    pub read_ahead: usize,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            read_ahead: DEFAULT_SHARE_READ_AHEAD,
        }
    }
}

/// Merge settings.
///
/// # Fields
/// * `max_concurrency` - How many sources run at once (unbounded when absent)
/// * `capacity` - Capacity of the queue every reader pushes into
#[derive(Debug, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default = "default_merge_capacity")]
    pub capacity: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            capacity: DEFAULT_MERGE_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_size")]
    pub size: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_WINDOW_SIZE,
        }
    }
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_broadcast_capacity() -> usize {
    DEFAULT_BROADCAST_CAPACITY
}

fn default_share_read_ahead() -> usize {
    DEFAULT_SHARE_READ_AHEAD
}

fn default_merge_capacity() -> usize {
    DEFAULT_MERGE_CAPACITY
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

impl Config {
    /// Reject values the engine cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("queue.capacity", self.queue.capacity),
            ("broadcast.capacity", self.broadcast.capacity),
            ("share.read_ahead", self.share.read_ahead),
            ("merge.capacity", self.merge.capacity),
            ("window.size", self.window.size),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if self.merge.max_concurrency == Some(0) {
            return Err(ConfigError::Invalid {
                field: "merge.max_concurrency",
                reason: "must be at least 1 when set".to_string(),
            });
        }
        Ok(())
    }
}

/// Load a config from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path.as_ref())?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    ConfigLoaded {
        path: &path.as_ref().display().to_string(),
    }
    .log();
    Ok(cfg)
}

/// Load a config from a YAML file and reject out-of-range values.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let cfg = load_config(path)?;
    cfg.validate()?;
    Ok(cfg)
}
