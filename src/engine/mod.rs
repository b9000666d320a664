// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod context;
pub mod cursor;
pub mod queue;
pub mod registry;
mod task;

pub mod sinks;
pub mod sources;

pub mod elementwise;
pub mod stateful;
pub mod window;

pub mod sequential;

pub mod equal;
pub mod merge;
pub mod zip;

pub mod broadcast;
pub mod share;

pub mod ext;

pub use context::{Context, ContextId};
pub use cursor::{sequence, FnSequence, Producer, ProducerCursor};
pub use queue::{queue_cursor, BoundedQueue};
pub use registry::{ContextRegistry, Lease, SharedState};

pub use sinks::{into_stream, to_list, to_list_async};
pub use sources::{
    empty, fail, from_iter, from_push, from_stream, once, produce, produce_async, range,
    try_from_stream, PushSink,
};

pub use elementwise::{delay, filter, inspect, map, skip, take, try_filter, try_map};
pub use stateful::{aggregate, aggregate_with, buffer, buffer_all, scan};
pub use window::window;

pub use sequential::{concat, concat2, concat_all, repeat, repeat_forever, repeat_until_empty};

pub use equal::{sequence_equal, sequence_equal_by};
pub use merge::{merge, merge_all, merge_all_with, merge_n};
pub use zip::{zip, zip_n};

pub use broadcast::{broadcast, broadcast_with};
pub use share::{share, share_with};

pub use ext::{FlattenExt, SequenceExt};
