//! Alternate names for parameter slots.

use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::ParameterError;
use crate::value::Value;

use super::attrs::SetOptions;
use super::slot::Parameter;

/// A second name for a slot. Every read and write goes to the target, so
/// the two names can never disagree.
#[derive(Debug, Clone)]
pub struct ParameterAlias {
    name: String,
    target: Arc<Parameter>,
}

impl ParameterAlias {
    pub(crate) fn new(name: impl Into<String>, target: Arc<Parameter>) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn target(&self) -> &Arc<Parameter> {
        &self.target
    }

    #[must_use]
    pub fn target_name(&self) -> &str {
        self.target.name()
    }

    /// # Errors
    ///
    /// Whatever the target's getter returns.
    pub fn get(&self, context: &ExecutionContext) -> Result<Option<Value>, ParameterError> {
        self.target.get(context)
    }

    /// # Errors
    ///
    /// Whatever the target's `set` returns.
    pub fn set(
        &self,
        value: impl Into<Value>,
        context: &ExecutionContext,
        options: SetOptions,
    ) -> Result<(), ParameterError> {
        self.target.set(value, context, options)
    }
}
