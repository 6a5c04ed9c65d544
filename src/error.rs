//! Error types for paramscope.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! specific conditions. Both leaf kinds describe caller programming errors or
//! domain-validation failures; neither is ever retried internally.

use thiserror::Error;

use crate::context::ContextFlags;

/// Errors raised by execution-context construction and flag assignment.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Attempt to assign a flag ({flag}) to execution_phase that is not an execution phase flag")]
    NotAnExecutionPhase {
        flag: ContextFlags,
    },

    #[error("Attempt to assign more than one non-SIMULATION flag ({flag}) to execution_phase")]
    MultipleExecutionPhases {
        flag: ContextFlags,
    },

    #[error("Attempt to assign a flag ({flag}) to source that is not a source flag")]
    NotASource {
        flag: ContextFlags,
    },

    #[error("Attempt to assign more than one flag ({flag}) to source")]
    MultipleSources {
        flag: ContextFlags,
    },

    #[error("Conflict in assignment to flags ({flags}) and {field} ({value})")]
    ConflictingFlags {
        field: &'static str,
        flags: String,
        value: String,
    },

    #[error("Flags ({flags}) must all correspond to one of: execution_phase, source")]
    MixedFlagFields {
        flags: ContextFlags,
    },

    #[error("Operation '{operation}' requires an active composition but the context has none")]
    NoComposition {
        operation: String,
    },
}

/// Errors raised by parameter slots and schemas.
#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("Value ({value}) assigned to parameter '{parameter}' of {owner} is not valid: {reason}")]
    InvalidValue {
        parameter: String,
        owner: String,
        value: String,
        reason: String,
    },

    #[error("Parameter '{parameter}' of {owner} is read-only. Pass override to force set.")]
    ReadOnly {
        parameter: String,
        owner: String,
    },

    #[error("No parameter '{parameter}' exists in the parameter hierarchy of {owner}")]
    UnknownParameter {
        parameter: String,
        owner: String,
    },

    #[error("Parameter '{parameter}' is already declared on {owner}")]
    DuplicateParameter {
        parameter: String,
        owner: String,
    },

    #[error("'{name}' is not a valid parameter name")]
    InvalidName {
        name: String,
    },

    #[error("{owner}: attempted to create an alias named '{alias}' to '{target}' but '{target}' does not exist")]
    AliasTargetMissing {
        alias: String,
        target: String,
        owner: String,
    },

    #[error("Parameter {owner}.{parameter} requires history of length at least {min} (requested {requested})")]
    HistoryLength {
        parameter: String,
        owner: String,
        requested: usize,
        min: usize,
    },

    #[error("Parameter '{parameter}' value mismatch between current ({current}) and previous ({previous}) values")]
    DeltaMismatch {
        parameter: String,
        current: String,
        previous: String,
    },

    #[error("Parameter '{parameter}' of {owner} cannot be reset: it has no declared default and no parent")]
    NoResetSource {
        parameter: String,
        owner: String,
    },

    #[error("Parameter '{parameter}' of {owner} has no parent to inherit from")]
    NoParent {
        parameter: String,
        owner: String,
    },

    #[error("Hook for parameter '{parameter}' of {owner} failed: {message}")]
    Hook {
        parameter: String,
        owner: String,
        message: String,
    },

    #[error("'{value}' is not a valid log condition")]
    InvalidLogCondition {
        value: String,
    },

    #[error("Invalid store configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Top-level error type for paramscope.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
    },
}

impl StoreError {
    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns true if this is a context error.
    #[must_use]
    pub const fn is_context(&self) -> bool {
        matches!(self, Self::Context(_))
    }

    /// Returns true if this is a parameter error.
    #[must_use]
    pub const fn is_parameter(&self) -> bool {
        matches!(self, Self::Parameter(_))
    }
}

/// Result type alias for paramscope operations.
pub type StoreResult<T> = Result<T, StoreError>;
