//! Execution contexts and the flags that describe them.
//!
//! Every stateful parameter value is keyed by the execution ID of the context
//! it was written under. Distinct contexts never observe each other's writes.

mod execution;
mod flags;
mod resolve;

pub use execution::{
    Composition, ExecutionContext, ExecutionContextBuilder, ExecutionId, ExecutionTime,
};
pub use flags::{ContextFlags, FlagField};
pub use resolve::{resolve_context, ContextCandidate, ExternalContext};
