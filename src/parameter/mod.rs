//! Parameter slots: attributes, per-context state, history, and audit log.

mod alias;
mod attrs;
mod log;
mod slot;

pub use alias::ParameterAlias;
pub use attrs::{Getter, HookContext, ParameterAttrs, SetOptions, Setter};
pub use log::{LogCondition, LogEntry};
pub use slot::{ContextKey, Parameter};
