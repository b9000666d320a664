// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod cursor;
pub mod sequence;

pub use cursor::{BoxCursor, Cursor, CursorExt, CursorState, Element, Step, StopFuture};
pub use sequence::{Sequence, SequenceRef};
