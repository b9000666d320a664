// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod sequence;

pub use config::ConfigError;
pub use sequence::{AggregateError, BoxError, ElementError, SequenceError, SequenceResult};
