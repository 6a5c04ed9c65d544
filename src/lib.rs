//! # paramscope - Context-indexed parameter storage
//!
//! paramscope stores the parameters of simulation components so that one
//! component can take part in many concurrent executions. Every stateful
//! value is keyed by the execution ID of the context that wrote it, so runs
//! and simulation branches never observe each other's writes.
//!
//! ## Core Concepts
//!
//! - **ExecutionContext**: execution ID plus phase and source flags
//! - **Parameter**: a slot holding per-context values, bounded history, and an audit log
//! - **ParameterSchema**: the slots of a type or instance, inheriting from a parent schema
//! - **ComponentType / Component**: declared kinds of components and their instances
//!
//! ## Usage
//!
//! ```rust,ignore
//! use paramscope::{ComponentType, ExecutionContext, Value};
//!
//! let lca = ComponentType::builder("LCA")
//!     .parameter("leak", 0.5)
//!     .parameter("competition", 1.0)
//!     .build()?;
//! let mech = lca.instantiate("lca-1")?;
//!
//! let run = ExecutionContext::new("run-1");
//! mech.set("leak", 0.25, &run)?;
//! assert_eq!(mech.get("leak", &run)?, Some(Value::Float(0.25)));
//! assert_eq!(mech.get("leak", "run-2")?, None);
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod component;
pub mod config;
pub mod context;
pub mod error;
pub mod parameter;
pub mod schema;
pub mod value;

pub use component::{Component, ComponentType, ComponentTypeBuilder, InitializationStatus, ParameterOwner};
pub use config::StoreConfig;
pub use context::{
    resolve_context, Composition, ContextCandidate, ContextFlags, ExecutionContext, ExecutionContextBuilder,
    ExecutionId, ExecutionTime, ExternalContext, FlagField,
};
pub use error::{ContextError, ParameterError, StoreError, StoreResult};
pub use parameter::{
    ContextKey, Getter, HookContext, LogCondition, LogEntry, Parameter, ParameterAlias, ParameterAttrs,
    SetOptions, Setter,
};
pub use schema::{
    is_valid_name, validator_from_predicate, ContextSnapshot, Declaration, Defaults, HookTable,
    ParameterSchema, Parser, SchemaEntry, Validator,
};
pub use value::{ComponentId, ComponentRef, Matrix, Value, ValueKind};
