// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Smallest capacity a bounded queue will accept; requests below it are raised
pub const MIN_QUEUE_CAPACITY: usize = 1;
/// Default capacity of a standalone bounded queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1;
/// Default per-output queue capacity of a broadcast
pub const DEFAULT_BROADCAST_CAPACITY: usize = 1;
/// Default read-ahead of a shared source
pub const DEFAULT_SHARE_READ_AHEAD: usize = 1;
/// Default capacity of the queue merged sources push into
pub const DEFAULT_MERGE_CAPACITY: usize = 1;
/// Default window size used by the runtime
pub const DEFAULT_WINDOW_SIZE: usize = 16;
