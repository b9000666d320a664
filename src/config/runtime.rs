// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::config::Config;
use crate::engine::{self, BoundedQueue};
use crate::errors::ConfigError;
use crate::observability::messages::runtime::RuntimeAssembled;
use crate::observability::messages::StructuredLog;
use crate::traits::{Element, SequenceRef};

/// Combinator entry points with configured defaults applied.
///
/// The free functions in [`engine`](crate::engine) take every tuning value
/// explicitly. `StreamRuntime` captures them once from a [`Config`] so graph
/// code can build fan-in and fan-out stages without threading capacities around.
///
/// # Examples
///
/// ```
/// use seqflow::config::{Config, StreamRuntime};
/// use seqflow::engine::{from_iter, to_list_async, Context};
///
/// # #[tokio::main]
/// # async fn main() {
/// let runtime = StreamRuntime::from_config(&Config::default()).unwrap();
/// let merged = runtime.merge_n(vec![from_iter(vec![1]), from_iter(vec![2])]);
///
/// let mut items = to_list_async(&merged, &Context::new()).await.unwrap();
/// items.sort();
/// assert_eq!(items, vec![1, 2]);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StreamRuntime {
    queue_capacity: usize,
    broadcast_capacity: usize,
    share_read_ahead: usize,
    merge_max_concurrency: Option<usize>,
    merge_capacity: usize,
    window_size: usize,
}

impl StreamRuntime {
    /// Validate `cfg` and build a runtime from it.
    pub fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let runtime = Self {
            queue_capacity: cfg.queue.capacity,
            broadcast_capacity: cfg.broadcast.capacity,
            share_read_ahead: cfg.share.read_ahead,
            merge_max_concurrency: cfg.merge.max_concurrency,
            merge_capacity: cfg.merge.capacity,
            window_size: cfg.window.size,
        };
        RuntimeAssembled {
            queue_capacity: runtime.queue_capacity,
            broadcast_capacity: runtime.broadcast_capacity,
            share_read_ahead: runtime.share_read_ahead,
            merge_max_concurrency: runtime.merge_max_concurrency,
        }
        .log();
        Ok(runtime)
    }

    pub fn queue<T: Element>(&self) -> Arc<BoundedQueue<T>> {
        BoundedQueue::shared(self.queue_capacity)
    }

    pub fn broadcast<T: Element>(&self, source: SequenceRef<T>, outputs: usize) -> Vec<SequenceRef<T>> {
        engine::broadcast_with(source, outputs, self.broadcast_capacity)
    }

    pub fn share<T: Element>(&self, source: SequenceRef<T>) -> SequenceRef<T> {
        engine::share_with(source, self.share_read_ahead)
    }

    pub fn merge_n<T: Element>(&self, sources: Vec<SequenceRef<T>>) -> SequenceRef<T> {
        self.merge_all(engine::from_iter(sources))
    }

    pub fn merge_all<T: Element>(&self, sources: SequenceRef<SequenceRef<T>>) -> SequenceRef<T> {
        engine::merge_all_with(sources, self.merge_max_concurrency, self.merge_capacity)
    }

    pub fn window<T: Element>(&self, source: SequenceRef<T>) -> SequenceRef<SequenceRef<T>> {
        engine::window(source, self.window_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{range, to_list_async, Context};

    #[test]
    fn test_invalid_config_is_refused() {
        let mut cfg = Config::default();
        cfg.window.size = 0;
        assert!(matches!(
            StreamRuntime::from_config(&cfg),
            Err(ConfigError::Invalid { field: "window.size", .. })
        ));
    }

    #[tokio::test]
    async fn test_configured_window_size_applies() {
        let mut cfg = Config::default();
        cfg.window.size = 4;
        let runtime = StreamRuntime::from_config(&cfg).unwrap();

        let ctx = Context::new();
        let windows = to_list_async(&runtime.window(range(0, 10)), &ctx).await.unwrap();
        assert_eq!(windows.len(), 3);
    }

    #[tokio::test]
    async fn test_queue_uses_configured_capacity() {
        let mut cfg = Config::default();
        cfg.queue.capacity = 5;
        let runtime = StreamRuntime::from_config(&cfg).unwrap();
        assert_eq!(runtime.queue::<u8>().capacity(), 5);
    }
}
