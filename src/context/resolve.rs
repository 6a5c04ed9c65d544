//! Context resolution for public entry points.
//!
//! Public operations accept whatever the caller has at hand: nothing, a bare
//! execution ID, a composition, or a fully resolved [`ExecutionContext`].
//! [`ExternalContext`] turns any of those into a resolved context before the
//! operation runs, so code below the entry point always has one.

use std::fmt;
use std::sync::Arc;

use crate::error::ContextError;

use super::execution::{Composition, ExecutionContext, ExecutionId};
use super::flags::ContextFlags;

/// Anything a caller may pass where a context is expected.
#[derive(Clone, Default)]
pub enum ContextCandidate {
    /// No context given.
    #[default]
    Absent,
    /// A bare execution ID.
    Id(ExecutionId),
    /// A composition; its default execution ID is used.
    Composition(Arc<dyn Composition>),
    /// An already resolved context.
    Resolved(ExecutionContext),
}

impl fmt::Debug for ContextCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Id(id) => write!(f, "Id({id})"),
            Self::Composition(c) => write!(f, "Composition({})", c.name()),
            Self::Resolved(ctx) => write!(f, "Resolved({ctx:?})"),
        }
    }
}

impl fmt::Display for ContextCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("no context"),
            Self::Id(id) => write!(f, "bare execution id '{id}'"),
            Self::Composition(c) => write!(f, "composition '{}'", c.name()),
            Self::Resolved(ctx) => match ctx.execution_id() {
                Some(id) => write!(f, "context '{id}'"),
                None => f.write_str("null context"),
            },
        }
    }
}

impl ContextCandidate {
    /// True if no context was given.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl From<ExecutionContext> for ContextCandidate {
    fn from(v: ExecutionContext) -> Self {
        Self::Resolved(v)
    }
}

impl From<&ExecutionContext> for ContextCandidate {
    fn from(v: &ExecutionContext) -> Self {
        Self::Resolved(v.clone())
    }
}

impl From<ExecutionId> for ContextCandidate {
    fn from(v: ExecutionId) -> Self {
        Self::Id(v)
    }
}

impl From<&ExecutionId> for ContextCandidate {
    fn from(v: &ExecutionId) -> Self {
        Self::Id(v.clone())
    }
}

impl From<&str> for ContextCandidate {
    fn from(v: &str) -> Self {
        Self::Id(ExecutionId::from(v))
    }
}

impl From<u64> for ContextCandidate {
    fn from(v: u64) -> Self {
        Self::Id(ExecutionId::from(v))
    }
}

impl From<Arc<dyn Composition>> for ContextCandidate {
    fn from(v: Arc<dyn Composition>) -> Self {
        Self::Composition(v)
    }
}

impl From<&Arc<dyn Composition>> for ContextCandidate {
    fn from(v: &Arc<dyn Composition>) -> Self {
        Self::Composition(Arc::clone(v))
    }
}

impl<T: Into<ContextCandidate>> From<Option<T>> for ContextCandidate {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Absent, Into::into)
    }
}

impl From<()> for ContextCandidate {
    fn from((): ()) -> Self {
        Self::Absent
    }
}

/// Canonical context for `candidate`.
///
/// A resolved context is returned unchanged. Otherwise a new context is
/// synthesized with `default_source` and `default_phase`, keyed by the bare
/// ID, the composition's default ID, or the null ID.
///
/// # Errors
///
/// `ContextError` if the defaults are malformed.
pub fn resolve_context(
    candidate: impl Into<ContextCandidate>,
    default_source: ContextFlags,
    default_phase: ContextFlags,
) -> Result<ExecutionContext, ContextError> {
    ExternalContext::new(default_source, default_phase).resolve(candidate)
}

/// Context-aware call adapter for public operations.
///
/// Holds the source, phase, and fallback execution ID used when the caller
/// supplies no resolved context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalContext {
    source: ContextFlags,
    execution_phase: ContextFlags,
    execution_id: Option<ExecutionId>,
}

impl Default for ExternalContext {
    fn default() -> Self {
        Self::command_line()
    }
}

impl ExternalContext {
    #[must_use]
    pub const fn new(source: ContextFlags, execution_phase: ContextFlags) -> Self {
        Self {
            source,
            execution_phase,
            execution_id: None,
        }
    }

    /// Adapter for interactive or scripted calls: `COMMAND_LINE`, `IDLE`.
    #[must_use]
    pub const fn command_line() -> Self {
        Self::new(ContextFlags::COMMAND_LINE, ContextFlags::IDLE)
    }

    /// Execution ID used when the caller passes no context at all.
    #[must_use]
    pub fn with_execution_id(mut self, id: impl Into<ExecutionId>) -> Self {
        self.execution_id = Some(id.into());
        self
    }

    #[must_use]
    pub const fn source(&self) -> ContextFlags {
        self.source
    }

    #[must_use]
    pub const fn execution_phase(&self) -> ContextFlags {
        self.execution_phase
    }

    /// Resolves `candidate` into a context. Idempotent on resolved contexts.
    ///
    /// # Errors
    ///
    /// `ContextError` if the adapter's defaults are malformed.
    pub fn resolve(&self, candidate: impl Into<ContextCandidate>) -> Result<ExecutionContext, ContextError> {
        let builder = ExecutionContext::builder()
            .source(self.source)
            .execution_phase(self.execution_phase);
        match candidate.into() {
            ContextCandidate::Resolved(ctx) => Ok(ctx),
            ContextCandidate::Id(id) => builder.execution_id(id).build(),
            ContextCandidate::Composition(comp) => builder
                .execution_id(comp.default_execution_id())
                .composition(&comp)
                .build(),
            ContextCandidate::Absent => match &self.execution_id {
                Some(id) => builder.execution_id(id.clone()).build(),
                None => builder.build(),
            },
        }
    }
}
