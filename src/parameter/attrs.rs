//! Parameter attributes and user hooks.

use std::fmt;
use std::sync::Arc;

use crate::component::ParameterOwner;
use crate::context::ExecutionContext;
use crate::error::ParameterError;
use crate::value::{Value, ValueKind};

use super::log::LogCondition;

/// Computes a parameter's value on read.
pub type Getter = Arc<dyn Fn(&HookContext<'_>) -> Result<Value, ParameterError> + Send + Sync>;

/// Transforms a value before it is stored.
pub type Setter = Arc<dyn Fn(Value, &HookContext<'_>) -> Result<Value, ParameterError> + Send + Sync>;

/// What a getter or setter sees when it runs.
///
/// Gives access to the slot name, the active context, and the owning
/// component, so hooks can read sibling parameters under the same context.
pub struct HookContext<'a> {
    parameter: &'a str,
    owner_name: &'a str,
    context: &'a ExecutionContext,
    owner: Option<Arc<dyn ParameterOwner>>,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(
        parameter: &'a str,
        owner_name: &'a str,
        context: &'a ExecutionContext,
        owner: Option<Arc<dyn ParameterOwner>>,
    ) -> Self {
        Self {
            parameter,
            owner_name,
            context,
            owner,
        }
    }

    #[must_use]
    pub const fn parameter(&self) -> &str {
        self.parameter
    }

    #[must_use]
    pub const fn context(&self) -> &ExecutionContext {
        self.context
    }

    /// The owning component, if it is still alive.
    #[must_use]
    pub fn owner(&self) -> Option<&dyn ParameterOwner> {
        self.owner.as_deref()
    }

    /// Reads another parameter of the same owner under the active context.
    ///
    /// # Errors
    ///
    /// `ParameterError::UnknownParameter` if the owner is gone or has no such
    /// parameter, or whatever the sibling's own getter returns.
    pub fn sibling(&self, name: &str) -> Result<Option<Value>, ParameterError> {
        let owner = self.owner.as_ref().ok_or_else(|| ParameterError::UnknownParameter {
            parameter: name.to_string(),
            owner: self.owner_name.to_string(),
        })?;
        owner.parameters().get(name, self.context)
    }

    /// Hook failure attributed to this slot.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> ParameterError {
        ParameterError::Hook {
            parameter: self.parameter.to_string(),
            owner: self.owner_name.to_string(),
            message: message.into(),
        }
    }
}

/// Options for a single write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Write even if the parameter is read-only.
    pub override_read_only: bool,
    /// Do not push the previous value into history.
    pub skip_history: bool,
    /// Do not append an audit-log entry.
    pub skip_log: bool,
}

impl SetOptions {
    /// Options for internal writers of read-only parameters.
    #[must_use]
    pub const fn overriding() -> Self {
        Self {
            override_read_only: true,
            skip_history: false,
            skip_log: false,
        }
    }

    #[must_use]
    pub const fn without_history(mut self) -> Self {
        self.skip_history = true;
        self
    }

    #[must_use]
    pub const fn without_log(mut self) -> Self {
        self.skip_log = true;
        self
    }
}

/// Inheritable attributes of a parameter slot.
///
/// Every field except the per-context state (values, history, log) is an
/// attribute. A slot either owns a copy of these or reads them live from its
/// parent.
#[derive(Clone)]
pub struct ParameterAttrs {
    pub default_value: Value,
    pub stateful: bool,
    pub modulable: bool,
    pub read_only: bool,
    pub user: bool,
    pub loggable: bool,
    pub log_condition: LogCondition,
    pub history_max_length: usize,
    pub history_min_length: usize,
    pub fallback_default: bool,
    pub retain_old_simulation_data: bool,
    pub log_capacity: Option<usize>,
    pub valid_types: Option<Vec<ValueKind>>,
    pub aliases: Vec<String>,
    pub getter: Option<Getter>,
    pub setter: Option<Setter>,
}

impl Default for ParameterAttrs {
    fn default() -> Self {
        Self {
            default_value: Value::Null,
            stateful: true,
            modulable: false,
            read_only: false,
            user: true,
            loggable: true,
            log_condition: LogCondition::OFF,
            history_max_length: 1,
            history_min_length: 0,
            fallback_default: false,
            retain_old_simulation_data: false,
            log_capacity: None,
            valid_types: None,
            aliases: Vec::new(),
            getter: None,
            setter: None,
        }
    }
}

impl ParameterAttrs {
    #[must_use]
    pub fn new(default_value: impl Into<Value>) -> Self {
        Self {
            default_value: default_value.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn stateful(mut self, stateful: bool) -> Self {
        self.stateful = stateful;
        self
    }

    #[must_use]
    pub const fn modulable(mut self, modulable: bool) -> Self {
        self.modulable = modulable;
        self
    }

    #[must_use]
    pub const fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[must_use]
    pub const fn user(mut self, user: bool) -> Self {
        self.user = user;
        self
    }

    #[must_use]
    pub const fn loggable(mut self, loggable: bool) -> Self {
        self.loggable = loggable;
        self
    }

    #[must_use]
    pub const fn log_condition(mut self, condition: LogCondition) -> Self {
        self.log_condition = condition;
        self
    }

    #[must_use]
    pub const fn history_max_length(mut self, n: usize) -> Self {
        self.history_max_length = n;
        self
    }

    #[must_use]
    pub const fn history_min_length(mut self, n: usize) -> Self {
        self.history_min_length = n;
        self
    }

    #[must_use]
    pub const fn fallback_default(mut self, fallback: bool) -> Self {
        self.fallback_default = fallback;
        self
    }

    #[must_use]
    pub const fn retain_old_simulation_data(mut self, retain: bool) -> Self {
        self.retain_old_simulation_data = retain;
        self
    }

    #[must_use]
    pub const fn log_capacity(mut self, capacity: Option<usize>) -> Self {
        self.log_capacity = capacity;
        self
    }

    #[must_use]
    pub fn valid_types(mut self, kinds: impl IntoIterator<Item = ValueKind>) -> Self {
        self.valid_types = Some(kinds.into_iter().collect());
        self
    }

    #[must_use]
    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.aliases.push(name.into());
        self
    }

    #[must_use]
    pub fn getter<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> Result<Value, ParameterError> + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn setter<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, &HookContext<'_>) -> Result<Value, ParameterError> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(f));
        self
    }

    /// Checks the history bounds.
    ///
    /// # Errors
    ///
    /// `ParameterError::HistoryLength` if the maximum is below the minimum.
    pub fn check(&self, parameter: &str, owner: &str) -> Result<(), ParameterError> {
        if self.history_max_length < self.history_min_length {
            return Err(ParameterError::HistoryLength {
                parameter: parameter.to_string(),
                owner: owner.to_string(),
                requested: self.history_max_length,
                min: self.history_min_length,
            });
        }
        Ok(())
    }

    /// True if `value`'s kind is accepted.
    #[must_use]
    pub fn accepts_kind(&self, value: &Value) -> bool {
        self.valid_types
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&value.kind()))
    }
}

fn same_hook<T: ?Sized>(a: Option<&Arc<T>>, b: Option<&Arc<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

impl PartialEq for ParameterAttrs {
    fn eq(&self, other: &Self) -> bool {
        self.default_value == other.default_value
            && self.stateful == other.stateful
            && self.modulable == other.modulable
            && self.read_only == other.read_only
            && self.user == other.user
            && self.loggable == other.loggable
            && self.log_condition == other.log_condition
            && self.history_max_length == other.history_max_length
            && self.history_min_length == other.history_min_length
            && self.fallback_default == other.fallback_default
            && self.retain_old_simulation_data == other.retain_old_simulation_data
            && self.log_capacity == other.log_capacity
            && self.valid_types == other.valid_types
            && self.aliases == other.aliases
            && same_hook(self.getter.as_ref(), other.getter.as_ref())
            && same_hook(self.setter.as_ref(), other.setter.as_ref())
    }
}

impl fmt::Debug for ParameterAttrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterAttrs")
            .field("default_value", &self.default_value)
            .field("stateful", &self.stateful)
            .field("modulable", &self.modulable)
            .field("read_only", &self.read_only)
            .field("user", &self.user)
            .field("loggable", &self.loggable)
            .field("log_condition", &self.log_condition)
            .field("history_max_length", &self.history_max_length)
            .field("history_min_length", &self.history_min_length)
            .field("fallback_default", &self.fallback_default)
            .field("retain_old_simulation_data", &self.retain_old_simulation_data)
            .field("log_capacity", &self.log_capacity)
            .field("valid_types", &self.valid_types)
            .field("aliases", &self.aliases)
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .finish()
    }
}
