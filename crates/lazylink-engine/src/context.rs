//! Execution contexts
//!
//! Each ExecutionContext represents an isolated interpreter instance with:
//! - Its own symbol resolution map
//! - Its own interpreter engine (compiled units never cross contexts)
//! - A kind describing how it relates to its parent
//!
//! Contexts are created and destroyed through the
//! [`DynamicLinker`](crate::DynamicLinker), which applies the propagation
//! policy.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::IrEngine;
use crate::resolution::ContextState;

/// Unique identifier for an ExecutionContext
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Create a new unique context ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// How a context relates to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// Fresh state, nothing inherited
    ShareNothing,
    /// Parent state visible read-only
    ShareParentRo,
    /// Parent state shared read-write; loaded IR libraries are re-registered
    ShareParentRw,
    /// Everything shared
    ShareAll,
}

/// An isolated execution context
pub struct ExecutionContext {
    id: ContextId,
    kind: ContextKind,
    initial: bool,
    parent: Option<ContextId>,
    destroyed: bool,
    state: ContextState,
    engine: Box<dyn IrEngine>,
}

impl ExecutionContext {
    pub(crate) fn new(
        kind: ContextKind,
        initial: bool,
        parent: Option<ContextId>,
        engine: Box<dyn IrEngine>,
    ) -> Self {
        Self {
            id: ContextId::new(),
            kind,
            initial,
            parent,
            destroyed: false,
            state: ContextState::new(),
            engine,
        }
    }

    /// Get the context ID
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Get the context kind
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Whether this is the process's initial (root) context
    pub fn is_initial(&self) -> bool {
        self.initial
    }

    /// Whether this context shares read-write state with its parent
    pub fn shares_parent_state(&self) -> bool {
        self.kind == ContextKind::ShareParentRw
    }

    /// Parent context, if any
    pub fn parent(&self) -> Option<ContextId> {
        self.parent
    }

    /// Whether the context has been destroyed
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// The resolution map
    pub fn state(&self) -> &ContextState {
        &self.state
    }

    /// Mutable access to the resolution map
    pub fn state_mut(&mut self) -> &mut ContextState {
        &mut self.state
    }

    /// The interpreter engine
    pub fn engine(&self) -> &dyn IrEngine {
        self.engine.as_ref()
    }

    /// Mutable access to the interpreter engine
    pub fn engine_mut(&mut self) -> &mut dyn IrEngine {
        self.engine.as_mut()
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("initial", &self.initial)
            .field("parent", &self.parent)
            .field("destroyed", &self.destroyed)
            .field("symbols", &self.state.len())
            .finish()
    }
}
