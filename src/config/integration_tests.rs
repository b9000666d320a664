// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod integration_tests {
    use crate::config::{load_and_validate_config, StreamRuntime};
    use crate::engine::{inspect, range, to_list_async, Context};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test that the shipped YAML configuration loads and parses correctly
    #[test]
    fn test_stream_runtime_yaml_loading() {
        let config = load_and_validate_config("configs/stream-runtime.yaml").unwrap();

        assert_eq!(config.queue.capacity, 8);
        assert_eq!(config.broadcast.capacity, 4);
        assert_eq!(config.share.read_ahead, 2);
        assert_eq!(config.merge.max_concurrency, Some(4));
        assert_eq!(config.merge.capacity, 16);
        assert_eq!(config.window.size, 32);
    }

    /// Test that a runtime built from YAML shares a broadcast read
    #[tokio::test]
    async fn test_runtime_from_yaml_broadcasts() {
        let config = load_and_validate_config("configs/stream-runtime.yaml").unwrap();
        let runtime = StreamRuntime::from_config(&config).unwrap();

        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        let source = inspect(range(0, 10), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let outputs = runtime.broadcast(source, 3);
        let ctx = Context::new();

        let (a, b, c) = tokio::join!(
            to_list_async(&outputs[0], &ctx),
            to_list_async(&outputs[1], &ctx),
            to_list_async(&outputs[2], &ctx)
        );
        assert_eq!(a.unwrap().len(), 10);
        assert_eq!(b.unwrap().len(), 10);
        assert_eq!(c.unwrap().len(), 10);
        assert_eq!(reads.load(Ordering::SeqCst), 10);
    }
}
