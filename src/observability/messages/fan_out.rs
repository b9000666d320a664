// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for fan-out combinators (broadcast, share) and the
//! context registry backing them.

use std::fmt::{Display, Formatter};

use tracing::Span;

use crate::engine::context::ContextId;
use crate::observability::messages::StructuredLog;

/// Shared per-context state was created on a registry miss.
///
/// # Log Level
/// `debug!` - Lifecycle detail
pub struct SharedStateCreated<'a> {
    pub registry: &'a str,
    pub context: ContextId,
    pub references: usize,
}

impl Display for SharedStateCreated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Created shared '{}' state for {} with {} reference(s)",
            self.registry, self.context, self.references
        )
    }
}

impl StructuredLog for SharedStateCreated<'_> {
    fn log(&self) {
        tracing::debug!(
            registry = self.registry,
            context = self.context.get(),
            references = self.references,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "shared_state_created",
            span_name = name,
            registry = self.registry,
            context = self.context.get(),
        )
    }
}

/// The last consumer released a shared entry.
///
/// # Log Level
/// `debug!` - Lifecycle detail
pub struct SharedStateReleased<'a> {
    pub registry: &'a str,
    pub context: ContextId,
}

impl Display for SharedStateReleased<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Released shared '{}' state for {}",
            self.registry, self.context
        )
    }
}

impl StructuredLog for SharedStateReleased<'_> {
    fn log(&self) {
        tracing::debug!(
            registry = self.registry,
            context = self.context.get(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "shared_state_released",
            span_name = name,
            registry = self.registry,
            context = self.context.get(),
        )
    }
}

/// Entries belonging to dropped contexts were reclaimed.
///
/// # Log Level
/// `debug!` - Lifecycle detail
pub struct SharedStatePruned<'a> {
    pub registry: &'a str,
    pub count: usize,
}

impl Display for SharedStatePruned<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pruned {} stale '{}' entr{}",
            self.count,
            self.registry,
            if self.count == 1 { "y" } else { "ies" }
        )
    }
}

impl StructuredLog for SharedStatePruned<'_> {
    fn log(&self) {
        tracing::debug!(registry = self.registry, count = self.count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "shared_state_pruned",
            span_name = name,
            registry = self.registry,
            count = self.count,
        )
    }
}

/// A fan-out pump began reading its source on first demand.
///
/// # Log Level
/// `trace!` - Per-evaluation detail
pub struct PumpStarted<'a> {
    pub operator: &'a str,
    pub context: ContextId,
    pub outputs: usize,
}

impl Display for PumpStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "'{}' pump for {} started feeding {} queue(s)",
            self.operator, self.context, self.outputs
        )
    }
}

impl StructuredLog for PumpStarted<'_> {
    fn log(&self) {
        tracing::trace!(
            operator = self.operator,
            context = self.context.get(),
            outputs = self.outputs,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "pump",
            span_name = name,
            operator = self.operator,
            context = self.context.get(),
        )
    }
}

/// A fan-out pump stopped reading its source.
///
/// # Log Level
/// `debug!` - Lifecycle detail
pub struct PumpFinished<'a> {
    pub operator: &'a str,
    pub context: ContextId,
    pub delivered: usize,
    pub outcome: &'a str,
}

impl Display for PumpFinished<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "'{}' pump for {} finished ({}) after {} element(s)",
            self.operator, self.context, self.outcome, self.delivered
        )
    }
}

impl StructuredLog for PumpFinished<'_> {
    fn log(&self) {
        tracing::debug!(
            operator = self.operator,
            context = self.context.get(),
            delivered = self.delivered,
            outcome = self.outcome,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "pump",
            span_name = name,
            operator = self.operator,
            context = self.context.get(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::Context;

    #[test]
    fn test_pruned_message_pluralizes() {
        let one = SharedStatePruned { registry: "share", count: 1 };
        let many = SharedStatePruned { registry: "share", count: 3 };
        assert_eq!(one.to_string(), "Pruned 1 stale 'share' entry");
        assert_eq!(many.to_string(), "Pruned 3 stale 'share' entries");
    }

    #[test]
    fn test_created_message_names_context() {
        let ctx = Context::new();
        let msg = SharedStateCreated {
            registry: "broadcast",
            context: ctx.id(),
            references: 2,
        };
        assert!(msg.to_string().contains(&format!("ctx-{}", ctx.id().get())));
    }
}
