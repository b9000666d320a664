// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Context-keyed arena for per-evaluation shared state.
//!
//! Fan-out combinators keep one shared reader per [`Context`]. Entries are
//! reference counted by hand: every consumer holds a [`Lease`], and releasing
//! the last lease removes the entry and tears the shared state down. Entries
//! whose context has been dropped without all leases being taken (a broadcast
//! output that was never started, say) are pruned on every lookup miss.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::engine::context::{Context, ContextId, ContextWatch};
use crate::observability::messages::fan_out::{SharedStateCreated, SharedStatePruned, SharedStateReleased};
use crate::observability::messages::StructuredLog;

/// State shared by every consumer attached under one context.
pub trait SharedState: Send + Sync + 'static {
    /// Called exactly once, when the entry leaves the registry.
    fn teardown(&self);
}

#[derive(Debug, Clone, Copy)]
enum Admission {
    /// Each attach adds one reference.
    Counted,
    /// The creating attach reserves a fixed number of references; later
    /// attaches consume a reservation instead of adding one.
    Reserved(usize),
}

struct Entry<S> {
    watch: ContextWatch,
    state: Arc<S>,
    refs: usize,
}

pub struct ContextRegistry<S> {
    name: &'static str,
    entries: Mutex<HashMap<ContextId, Entry<S>>>,
}

impl<S: SharedState> ContextRegistry<S> {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Attach to the state for `context`, creating it with `make` on a miss.
    pub fn attach(self: &Arc<Self>, context: &Context, make: impl FnOnce() -> S) -> Lease<S> {
        self.lookup(context, make, Admission::Counted)
    }

    /// Attach to state that is created with `slots` reserved references.
    pub fn attach_reserved(
        self: &Arc<Self>,
        context: &Context,
        slots: usize,
        make: impl FnOnce() -> S,
    ) -> Lease<S> {
        self.lookup(context, make, Admission::Reserved(slots.max(1)))
    }

    fn lookup(
        self: &Arc<Self>,
        context: &Context,
        make: impl FnOnce() -> S,
        admission: Admission,
    ) -> Lease<S> {
        let id = context.id();
        let mut dead = Vec::new();

        let state = {
            let mut entries = self.entries.lock();
            match entries.get_mut(&id) {
                Some(entry) => {
                    if let Admission::Counted = admission {
                        entry.refs += 1;
                    }
                    entry.state.clone()
                }
                None => {
                    entries.retain(|_, entry| {
                        if entry.watch.is_alive() {
                            true
                        } else {
                            dead.push(entry.state.clone());
                            false
                        }
                    });

                    let state = Arc::new(make());
                    let refs = match admission {
                        Admission::Counted => 1,
                        Admission::Reserved(slots) => slots,
                    };
                    entries.insert(
                        id,
                        Entry {
                            watch: context.watch(),
                            state: state.clone(),
                            refs,
                        },
                    );
                    SharedStateCreated {
                        registry: self.name,
                        context: id,
                        references: refs,
                    }
                    .log();
                    state
                }
            }
        };

        if !dead.is_empty() {
            SharedStatePruned {
                registry: self.name,
                count: dead.len(),
            }
            .log();
            for state in dead {
                state.teardown();
            }
        }

        Lease {
            registry: Arc::downgrade(self),
            id,
            state,
            released: AtomicBool::new(false),
        }
    }

    /// Drop one reference; tear the entry down when none remain. With
    /// `evict` set the entry goes regardless of outstanding references.
    fn detach(&self, id: ContextId, state: &Arc<S>, evict: bool) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            match entries.get_mut(&id) {
                Some(entry) if Arc::ptr_eq(&entry.state, state) => {
                    entry.refs = entry.refs.saturating_sub(1);
                    if entry.refs == 0 || evict {
                        entries.remove(&id)
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };

        match removed {
            Some(entry) => {
                SharedStateReleased {
                    registry: self.name,
                    context: id,
                }
                .log();
                entry.state.teardown();
                true
            }
            None => false,
        }
    }

    /// Remove entries whose context no longer exists. Returns how many went.
    pub fn prune(&self) -> usize {
        let dead: Vec<Arc<S>> = {
            let mut entries = self.entries.lock();
            let mut dead = Vec::new();
            entries.retain(|_, entry| {
                if entry.watch.is_alive() {
                    true
                } else {
                    dead.push(entry.state.clone());
                    false
                }
            });
            dead
        };
        let count = dead.len();
        if count > 0 {
            SharedStatePruned {
                registry: self.name,
                count,
            }
            .log();
        }
        for state in dead {
            state.teardown();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One consumer's claim on a registry entry. Released on drop.
pub struct Lease<S: SharedState> {
    registry: Weak<ContextRegistry<S>>,
    id: ContextId,
    state: Arc<S>,
    released: AtomicBool,
}

impl<S: SharedState> Lease<S> {
    pub fn state(&self) -> &Arc<S> {
        &self.state
    }

    pub fn context_id(&self) -> ContextId {
        self.id
    }

    /// Give the reference back. Returns true when this was the last one and
    /// the shared state has been torn down. Later calls are no-ops.
    pub fn release(&self) -> bool {
        self.give_back(false)
    }

    /// Give the reference back and tear the entry down even if reserved
    /// references were never claimed.
    pub(crate) fn evict(&self) -> bool {
        self.give_back(true)
    }

    fn give_back(&self, evict: bool) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        match self.registry.upgrade() {
            Some(registry) => registry.detach(self.id, &self.state, evict),
            None => {
                self.state.teardown();
                true
            }
        }
    }

    /// Drop the lease without giving a reference back, for an attach that
    /// never consumed one (a rejected duplicate under reserved admission).
    pub(crate) fn forget(self) {
        self.released.store(true, Ordering::Release);
    }
}

impl<S: SharedState> Drop for Lease<S> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Probe {
        teardowns: Arc<AtomicUsize>,
    }

    impl SharedState for Probe {
        fn teardown(&self) {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_counted_attach_shares_state_and_tears_down_on_last_release() {
        let registry = ContextRegistry::new("test");
        let teardowns = Arc::new(AtomicUsize::new(0));
        let ctx = Context::new();

        let make = || Probe {
            teardowns: teardowns.clone(),
        };
        let a = registry.attach(&ctx, make);
        let b = registry.attach(&ctx, || panic!("state must be reused"));
        assert!(Arc::ptr_eq(a.state(), b.state()));
        assert_eq!(registry.len(), 1);

        assert!(!a.release());
        assert!(!a.release());
        assert_eq!(teardowns.load(Ordering::SeqCst), 0);
        drop(b);
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reserved_attach_waits_for_every_slot() {
        let registry = ContextRegistry::new("test");
        let teardowns = Arc::new(AtomicUsize::new(0));
        let ctx = Context::new();

        let first = registry.attach_reserved(&ctx, 2, || Probe {
            teardowns: teardowns.clone(),
        });
        // first consumer finishes before the second ever attaches
        first.release();
        assert_eq!(registry.len(), 1);

        let second = registry.attach_reserved(&ctx, 2, || panic!("state must be reused"));
        assert!(second.release());
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_evict_ignores_unclaimed_reservations() {
        let registry = ContextRegistry::new("test");
        let teardowns = Arc::new(AtomicUsize::new(0));
        let ctx = Context::new();

        let only = registry.attach_reserved(&ctx, 3, || Probe {
            teardowns: teardowns.clone(),
        });
        assert!(only.evict());
        assert!(!only.release());
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dead_contexts_are_pruned_on_miss() {
        let registry = ContextRegistry::new("test");
        let teardowns = Arc::new(AtomicUsize::new(0));

        let stale = Context::new();
        let lease = registry.attach_reserved(&stale, 3, || Probe {
            teardowns: teardowns.clone(),
        });
        drop(lease);
        drop(stale);
        assert_eq!(registry.len(), 1);

        let fresh = Context::new();
        let _lease = registry.attach(&fresh, Probe::default);
        assert_eq!(registry.len(), 1);
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_prune() {
        let registry = ContextRegistry::new("test");
        let ctx = Context::new();
        let lease = registry.attach_reserved(&ctx, 2, Probe::default);
        drop(lease);

        assert_eq!(registry.prune(), 0);
        drop(ctx);
        assert_eq!(registry.prune(), 1);
        assert!(registry.is_empty());
    }
}
