// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;        // YAML tuning + runtime defaults
pub mod engine;        // cursors, queues and combinators
pub mod errors;        // error handling
pub mod observability; // structured log messages
pub mod traits;        // cursor and sequence abstractions
