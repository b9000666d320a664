// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::engine::context::Context;
use crate::traits::cursor::BoxCursor;

/// A cold, restartable stream factory.
///
/// Starting a sequence has no side effects of its own; work begins on the first
/// `advance` of the returned cursor. Starting twice yields independent cursors
/// unless the sequence is shared per context (see `share` and `broadcast`).
pub trait Sequence<T>: Send + Sync {
    fn start(&self, context: &Context) -> BoxCursor<T>;
}

/// Shared handle to a sequence; this is what combinators accept and return.
pub type SequenceRef<T> = Arc<dyn Sequence<T>>;
