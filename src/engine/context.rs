// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Evaluation context tokens.
//!
//! A [`Context`] identifies one graph evaluation run. Sequences thread it through
//! every `start` call; fan-out combinators use it as the key under which a single
//! physical read of their source is shared. Equality and hashing are by id only.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a context, stable for the context's whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Opaque correlation token for one evaluation run.
///
/// Clones refer to the same run. Once every clone is dropped, registries keyed
/// on this context may reclaim their entries.
#[derive(Clone)]
pub struct Context {
    id: ContextId,
    alive: Arc<()>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            alive: Arc::new(()),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Liveness probe that does not keep the context alive.
    pub(crate) fn watch(&self) -> ContextWatch {
        ContextWatch(Arc::downgrade(&self.alive))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Context {}

impl Hash for Context {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&self.id.0).finish()
    }
}

/// Weak view of a context's liveness.
#[derive(Clone)]
pub(crate) struct ContextWatch(Weak<()>);

impl ContextWatch {
    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_clones_compare_equal_and_fresh_contexts_differ() {
        let a = Context::new();
        let b = a.clone();
        let c = Context::new();

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<Context> = [a.clone(), b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_watch_tracks_last_clone() {
        let ctx = Context::new();
        let copy = ctx.clone();
        let watch = ctx.watch();

        drop(ctx);
        assert!(watch.is_alive());
        drop(copy);
        assert!(!watch.is_alive());
    }
}
