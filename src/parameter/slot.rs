//! A single named, context-indexed parameter slot.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, trace, warn};

use crate::component::{InitializationStatus, OwnerHandle};
use crate::context::{ContextFlags, ExecutionContext, ExecutionId, ExecutionTime};
use crate::error::ParameterError;
use crate::schema::HookTable;
use crate::value::{Value, ValueKind};

use super::attrs::{HookContext, ParameterAttrs, SetOptions};
use super::log::{LogCondition, LogEntry};

/// Key under which per-context state is stored. Non-stateful slots use `None`
/// for every context.
pub type ContextKey = Option<ExecutionId>;

#[derive(Debug, Clone, Default)]
struct SlotState {
    values: HashMap<ContextKey, Value>,
    history: HashMap<ContextKey, VecDeque<Value>>,
    log: HashMap<ContextKey, VecDeque<LogEntry>>,
}

#[derive(Clone)]
enum AttrState {
    /// Reads every attribute live from the parent slot.
    Inherited(Arc<Parameter>),
    Owned(ParameterAttrs),
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A parameter slot: attributes plus per-context values, history, and log.
///
/// Values, history, and log are never inherited. Attributes are either owned
/// by the slot or read live from the parent slot until the slot materializes
/// its own copy.
pub struct Parameter {
    name: String,
    parent: Option<Arc<Parameter>>,
    declared_default: Option<Value>,
    attrs: RwLock<AttrState>,
    /// Alias names registered on this schema level; kept apart from the
    /// attributes so registering one never detaches an inherited slot.
    registered_aliases: RwLock<Vec<String>>,
    state: RwLock<SlotState>,
    owner: Arc<OwnerHandle>,
    hooks: Arc<HookTable>,
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("owner", &self.owner.name())
            .field("inherited", &self.is_inherited())
            .finish_non_exhaustive()
    }
}

impl Parameter {
    /// Slot with its own attributes, optionally linked to a parent slot.
    pub(crate) fn declared(
        name: impl Into<String>,
        attrs: ParameterAttrs,
        parent: Option<Arc<Self>>,
        owner: Arc<OwnerHandle>,
        hooks: Arc<HookTable>,
    ) -> Self {
        Self {
            name: name.into(),
            parent,
            declared_default: Some(attrs.default_value.clone()),
            attrs: RwLock::new(AttrState::Owned(attrs)),
            registered_aliases: RwLock::new(Vec::new()),
            state: RwLock::new(SlotState::default()),
            owner,
            hooks,
        }
    }

    /// Slot that reads all attributes from `parent` until overridden.
    pub(crate) fn shadow(
        name: impl Into<String>,
        parent: Arc<Self>,
        owner: Arc<OwnerHandle>,
        hooks: Arc<HookTable>,
    ) -> Self {
        Self {
            name: name.into(),
            parent: Some(Arc::clone(&parent)),
            declared_default: None,
            attrs: RwLock::new(AttrState::Inherited(parent)),
            registered_aliases: RwLock::new(Vec::new()),
            state: RwLock::new(SlotState::default()),
            owner,
            hooks,
        }
    }

    /// Copy for a duplicated owner: same attribute source, same parent, and
    /// a copy of every context's state.
    pub(crate) fn duplicate(&self, owner: Arc<OwnerHandle>, hooks: Arc<HookTable>) -> Self {
        Self {
            name: self.name.clone(),
            parent: self.parent.clone(),
            declared_default: self.declared_default.clone(),
            attrs: RwLock::new(read_lock(&self.attrs).clone()),
            registered_aliases: RwLock::new(read_lock(&self.registered_aliases).clone()),
            state: RwLock::new(read_lock(&self.state).clone()),
            owner,
            hooks,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning component or type.
    #[must_use]
    pub fn owner_name(&self) -> &str {
        self.owner.name()
    }

    #[must_use]
    pub const fn parent(&self) -> Option<&Arc<Self>> {
        self.parent.as_ref()
    }

    /// True while every attribute is read from the parent.
    #[must_use]
    pub fn is_inherited(&self) -> bool {
        matches!(*read_lock(&self.attrs), AttrState::Inherited(_))
    }

    fn with_attrs<R>(&self, f: impl FnOnce(&ParameterAttrs) -> R) -> R {
        let guard = read_lock(&self.attrs);
        match &*guard {
            AttrState::Inherited(parent) => parent.with_attrs(f),
            AttrState::Owned(attrs) => f(attrs),
        }
    }

    /// Snapshot of the effective attributes.
    #[must_use]
    pub fn attrs(&self) -> ParameterAttrs {
        self.with_attrs(Clone::clone)
    }

    #[must_use]
    pub fn default_value(&self) -> Value {
        self.with_attrs(|a| a.default_value.clone())
    }

    #[must_use]
    pub fn stateful(&self) -> bool {
        self.with_attrs(|a| a.stateful)
    }

    #[must_use]
    pub fn modulable(&self) -> bool {
        self.with_attrs(|a| a.modulable)
    }

    #[must_use]
    pub fn read_only(&self) -> bool {
        self.with_attrs(|a| a.read_only)
    }

    #[must_use]
    pub fn user(&self) -> bool {
        self.with_attrs(|a| a.user)
    }

    #[must_use]
    pub fn loggable(&self) -> bool {
        self.with_attrs(|a| a.loggable)
    }

    #[must_use]
    pub fn log_condition(&self) -> LogCondition {
        self.with_attrs(|a| a.log_condition)
    }

    #[must_use]
    pub fn history_max_length(&self) -> usize {
        self.with_attrs(|a| a.history_max_length)
    }

    #[must_use]
    pub fn history_min_length(&self) -> usize {
        self.with_attrs(|a| a.history_min_length)
    }

    #[must_use]
    pub fn fallback_default(&self) -> bool {
        self.with_attrs(|a| a.fallback_default)
    }

    #[must_use]
    pub fn retain_old_simulation_data(&self) -> bool {
        self.with_attrs(|a| a.retain_old_simulation_data)
    }

    #[must_use]
    pub fn valid_types(&self) -> Option<Vec<ValueKind>> {
        self.with_attrs(|a| a.valid_types.clone())
    }

    /// Declared aliases, those registered on ancestor slots while this one
    /// inherits, and those registered here.
    #[must_use]
    pub fn aliases(&self) -> Vec<String> {
        let mut names = match &*read_lock(&self.attrs) {
            AttrState::Inherited(parent) => parent.aliases(),
            AttrState::Owned(attrs) => attrs.aliases.clone(),
        };
        for alias in read_lock(&self.registered_aliases).iter() {
            if !names.contains(alias) {
                names.push(alias.clone());
            }
        }
        names
    }

    #[must_use]
    pub fn has_getter(&self) -> bool {
        self.with_attrs(|a| a.getter.is_some())
    }

    #[must_use]
    pub fn has_setter(&self) -> bool {
        self.with_attrs(|a| a.setter.is_some())
    }

    fn key_for(&self, context: &ExecutionContext) -> ContextKey {
        if self.stateful() {
            context.execution_id().cloned()
        } else {
            None
        }
    }

    fn hook_context<'a>(&'a self, context: &'a ExecutionContext) -> HookContext<'a> {
        HookContext::new(&self.name, self.owner.name(), context, self.owner.upgrade())
    }

    /// Value visible under `context`.
    ///
    /// A getter, if present, is invoked on every read and its result is
    /// written back under the same context. Otherwise the stored value is
    /// returned, or the default if `fallback_default` is set.
    ///
    /// # Errors
    ///
    /// Whatever the getter returns.
    pub fn get(&self, context: &ExecutionContext) -> Result<Option<Value>, ParameterError> {
        if let Some(getter) = self.with_attrs(|a| a.getter.clone()) {
            let value = getter(&self.hook_context(context))?;
            if self.stateful() {
                self.store(value.clone(), context, SetOptions::default());
            }
            return Ok(Some(value));
        }

        let key = self.key_for(context);
        if let Some(value) = read_lock(&self.state).values.get(&key) {
            return Ok(Some(value.clone()));
        }

        debug!(
            parameter = %self.name,
            owner = %self.owner.name(),
            execution_id = ?key,
            "no value stored for execution context"
        );
        if self.fallback_default() {
            Ok(Some(self.default_value()))
        } else {
            Ok(None)
        }
    }

    /// Stored value under `context` without running the getter or falling
    /// back to the default.
    #[must_use]
    pub fn peek(&self, context: &ExecutionContext) -> Option<Value> {
        let key = self.key_for(context);
        read_lock(&self.state).values.get(&key).cloned()
    }

    /// Writes `value` under `context`.
    ///
    /// The value passes through the parser hook and the setter before it is
    /// stored. The previous value moves into history and, if the log
    /// condition is met, an audit entry is appended.
    ///
    /// # Errors
    ///
    /// `ParameterError::ReadOnly` if the slot is read-only and the options
    /// do not override it, or whatever the setter returns.
    pub fn set(
        &self,
        value: impl Into<Value>,
        context: &ExecutionContext,
        options: SetOptions,
    ) -> Result<(), ParameterError> {
        if self.read_only() {
            if !options.override_read_only {
                return Err(ParameterError::ReadOnly {
                    parameter: self.name.clone(),
                    owner: self.owner.name().to_string(),
                });
            }
            warn!(parameter = %self.name, owner = %self.owner.name(), "overriding read-only parameter");
        }
        self.write(value.into(), context, options)
    }

    /// Writes the owner's initial value under `context`, read-only or not,
    /// without touching history.
    pub(crate) fn seed(&self, value: Value, context: &ExecutionContext) -> Result<(), ParameterError> {
        self.write(value, context, SetOptions::default().without_history())
    }

    fn write(&self, value: Value, context: &ExecutionContext, options: SetOptions) -> Result<(), ParameterError> {
        let value = self.hooks.parse(&self.name, value);
        let value = match self.with_attrs(|a| a.setter.clone()) {
            Some(setter) => setter(value, &self.hook_context(context))?,
            None => value,
        };
        self.store(value, context, options);
        Ok(())
    }

    fn store(&self, value: Value, context: &ExecutionContext, options: SetOptions) {
        let key = self.key_for(context);
        let entry = if options.skip_log {
            None
        } else {
            self.log_entry(&value, context)
        };
        let (history_max, log_capacity) = self.with_attrs(|a| (a.history_max_length, a.log_capacity));

        let mut state = write_lock(&self.state);
        if !options.skip_history && history_max > 0 {
            if let Some(previous) = state.values.get(&key).cloned() {
                let history = state.history.entry(key.clone()).or_default();
                history.push_back(previous);
                while history.len() > history_max {
                    history.pop_front();
                }
            }
        }
        if let Some(entry) = entry {
            let log = state.log.entry(key.clone()).or_default();
            log.push_back(entry);
            if let Some(capacity) = log_capacity {
                while log.len() > capacity {
                    log.pop_front();
                }
            }
        }
        trace!(parameter = %self.name, execution_id = ?key, "stored value");
        state.values.insert(key, value);
    }

    fn log_entry(&self, value: &Value, context: &ExecutionContext) -> Option<LogEntry> {
        let (loggable, condition) = self.with_attrs(|a| (a.loggable, a.log_condition));
        if !loggable {
            return None;
        }

        if context.source() == ContextFlags::COMMAND_LINE {
            return Some(LogEntry::new(
                context.log_time(),
                ContextFlags::COMMAND_LINE.describe_all(),
                value.clone(),
            ));
        }

        if condition.is_off() {
            return None;
        }

        let satisfied = condition.is_satisfied_by(context.flags())
            || (condition.contains(LogCondition::INITIALIZATION)
                && self.owner.initialization_status() == Some(InitializationStatus::Initializing));
        satisfied.then(|| LogEntry::new(context.log_time(), context.describe(), value.clone()))
    }

    /// Appends a log entry for the current value under `context`, labeled as
    /// a command-line entry, regardless of the log condition.
    ///
    /// # Errors
    ///
    /// Whatever the getter returns.
    pub fn log_current(&self, context: &ExecutionContext) -> Result<bool, ParameterError> {
        let Some(value) = self.get(context)? else {
            return Ok(false);
        };
        let key = self.key_for(context);
        let entry = LogEntry::new(
            context.log_time(),
            ContextFlags::COMMAND_LINE.describe_all(),
            value,
        );
        write_lock(&self.state).log.entry(key).or_default().push_back(entry);
        Ok(true)
    }

    /// Value `index` writes back under `context`. Index 0 and indices past
    /// the retained history give `None`.
    #[must_use]
    pub fn get_previous(&self, context: &ExecutionContext, index: usize) -> Option<Value> {
        if index == 0 {
            return None;
        }
        let key = self.key_for(context);
        let state = read_lock(&self.state);
        let history = state.history.get(&key)?;
        let position = history.len().checked_sub(index)?;
        history.get(position).cloned()
    }

    /// Retained history under `context`, oldest first.
    #[must_use]
    pub fn history(&self, context: &ExecutionContext) -> Vec<Value> {
        let key = self.key_for(context);
        read_lock(&self.state)
            .history
            .get(&key)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Difference between the current value and the most recent previous one.
    ///
    /// # Errors
    ///
    /// `ParameterError::DeltaMismatch` naming both values when either is
    /// missing or they cannot be subtracted.
    pub fn get_delta(&self, context: &ExecutionContext) -> Result<Value, ParameterError> {
        let current = self.get(context)?;
        let previous = self.get_previous(context, 1);
        let delta = match (&current, &previous) {
            (Some(c), Some(p)) => c.checked_sub(p),
            _ => None,
        };
        delta.ok_or_else(|| ParameterError::DeltaMismatch {
            parameter: self.name.clone(),
            current: current.map_or_else(|| "None".to_string(), |v| v.to_string()),
            previous: previous.map_or_else(|| "None".to_string(), |v| v.to_string()),
        })
    }

    /// Log entries under `context`, oldest first.
    #[must_use]
    pub fn log_entries(&self, context: &ExecutionContext) -> Vec<LogEntry> {
        let key = self.key_for(context);
        read_lock(&self.state)
            .log
            .get(&key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every log entry, grouped by execution ID.
    #[must_use]
    pub fn log(&self) -> BTreeMap<ContextKey, Vec<LogEntry>> {
        read_lock(&self.state)
            .log
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
            .collect()
    }

    /// Every log entry as `(time, context-label, value)`, grouped by
    /// execution ID and oldest first within each group.
    #[must_use]
    pub fn export_log(&self) -> Vec<(ExecutionTime, String, Value)> {
        self.log()
            .into_values()
            .flatten()
            .map(|e| (e.time, e.context, e.value))
            .collect()
    }

    /// Execution IDs that currently hold a value.
    #[must_use]
    pub fn execution_ids(&self) -> Vec<ContextKey> {
        let mut ids: Vec<_> = read_lock(&self.state).values.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Removes the value, history, and log under `context`.
    pub fn delete(&self, context: &ExecutionContext) {
        let key = self.key_for(context);
        let mut state = write_lock(&self.state);
        state.values.remove(&key);
        state.history.remove(&key);
        state.log.remove(&key);
    }

    /// Empties the log under each of `contexts`.
    pub fn clear_log<'a>(&self, contexts: impl IntoIterator<Item = &'a ExecutionContext>) {
        let keys: Vec<_> = contexts.into_iter().map(|c| self.key_for(c)).collect();
        let mut state = write_lock(&self.state);
        for key in keys {
            if let Some(log) = state.log.get_mut(&key) {
                log.clear();
            }
        }
    }

    /// Empties the log under every context.
    pub fn clear_all_logs(&self) {
        write_lock(&self.state).log.clear();
    }

    /// Copies the value and history stored under `base` into `context`.
    ///
    /// Existing data under `context` is kept unless it is null or
    /// `override_existing` is set. Returns true if anything was copied.
    pub fn initialize_from_context(
        &self,
        context: &ExecutionContext,
        base: &ExecutionContext,
        override_existing: bool,
    ) -> bool {
        let key = self.key_for(context);
        let base_key = self.key_for(base);
        if key == base_key {
            return false;
        }

        let mut state = write_lock(&self.state);
        let missing = state.values.get(&key).map_or(true, Value::is_null);
        if !(missing || override_existing) {
            return false;
        }
        let Some(value) = state.values.get(&base_key).cloned() else {
            return false;
        };
        let history = state.history.get(&base_key).cloned();
        state.values.insert(key.clone(), value);
        match history {
            Some(h) => {
                state.history.insert(key, h);
            }
            None => {
                state.history.remove(&key);
            }
        }
        true
    }

    /// Validates `value` against the accepted kinds and the validator hook.
    ///
    /// # Errors
    ///
    /// `ParameterError::InvalidValue` with the failure reason.
    pub fn validate_value(&self, value: &Value) -> Result<(), ParameterError> {
        let invalid = |reason: String| ParameterError::InvalidValue {
            parameter: self.name.clone(),
            owner: self.owner.name().to_string(),
            value: value.to_string(),
            reason,
        };
        if !self.with_attrs(|a| a.accepts_kind(value)) {
            let names: Vec<_> = self
                .valid_types()
                .unwrap_or_default()
                .iter()
                .map(ToString::to_string)
                .collect();
            return Err(invalid(format!(
                "expected one of [{}], got {}",
                names.join(", "),
                value.kind()
            )));
        }
        self.hooks.validate(&self.name, value).map_err(invalid)
    }

    /// Applies `f` to a private copy of the attributes, checks it, and makes
    /// it this slot's own attributes. Inherited slots stop following their
    /// parent from here on.
    ///
    /// # Errors
    ///
    /// `ParameterError::HistoryLength` if the result violates the history
    /// bounds; the slot is left unchanged.
    pub fn configure(&self, f: impl FnOnce(&mut ParameterAttrs)) -> Result<(), ParameterError> {
        let mut next = self.attrs();
        f(&mut next);
        next.check(&self.name, self.owner.name())?;
        let history_max = next.history_max_length;
        *write_lock(&self.attrs) = AttrState::Owned(next);
        self.bound_history(history_max);
        Ok(())
    }

    fn bound_history(&self, max: usize) {
        let mut state = write_lock(&self.state);
        for history in state.history.values_mut() {
            while history.len() > max {
                history.pop_front();
            }
        }
    }

    /// Gives the slot its own copy of the current attributes. Idempotent.
    pub fn materialize_override(&self) {
        let mut guard = write_lock(&self.attrs);
        if let AttrState::Inherited(parent) = &*guard {
            let attrs = parent.attrs();
            debug!(parameter = %self.name, owner = %self.owner.name(), "materialized inherited attributes");
            *guard = AttrState::Owned(attrs);
        }
    }

    /// Discards owned attributes and reads from the parent again.
    ///
    /// # Errors
    ///
    /// `ParameterError::NoParent` for a slot without a parent.
    pub fn revert_to_inherited(&self) -> Result<(), ParameterError> {
        let parent = self.parent.clone().ok_or_else(|| ParameterError::NoParent {
            parameter: self.name.clone(),
            owner: self.owner.name().to_string(),
        })?;
        *write_lock(&self.attrs) = AttrState::Inherited(parent);
        self.bound_history(self.history_max_length());
        Ok(())
    }

    /// Replaces the default after parsing and validating it.
    ///
    /// # Errors
    ///
    /// `ParameterError::InvalidValue` if the parsed value fails validation.
    pub fn set_default_value(&self, value: impl Into<Value>) -> Result<(), ParameterError> {
        let value = self.hooks.parse(&self.name, value.into());
        self.validate_value(&value)?;
        self.configure(|a| a.default_value = value)
    }

    /// Changes the history bound, dropping the oldest entries past it.
    ///
    /// # Errors
    ///
    /// `ParameterError::HistoryLength` if `n` is below the minimum.
    pub fn set_history_max_length(&self, n: usize) -> Result<(), ParameterError> {
        self.configure(|a| a.history_max_length = n)
    }

    /// # Errors
    ///
    /// `ParameterError::HistoryLength` if `n` exceeds the maximum.
    pub fn set_history_min_length(&self, n: usize) -> Result<(), ParameterError> {
        self.configure(|a| a.history_min_length = n)
    }

    /// # Errors
    ///
    /// Never fails; returns `Result` for symmetry with the other setters.
    pub fn set_log_condition(&self, condition: impl Into<LogCondition>) -> Result<(), ParameterError> {
        let condition = condition.into();
        self.configure(|a| a.log_condition = condition)
    }

    /// Parses a condition name such as `"EXECUTION|CONTROL"` and applies it.
    ///
    /// # Errors
    ///
    /// `ParameterError::InvalidLogCondition` for an unknown name.
    pub fn set_log_condition_str(&self, condition: &str) -> Result<(), ParameterError> {
        let condition: LogCondition = condition.parse()?;
        self.set_log_condition(condition)
    }

    /// Restores the declared default, or the inherited attributes if the
    /// slot declared nothing itself.
    ///
    /// # Errors
    ///
    /// `ParameterError::NoResetSource` if the slot has neither.
    pub fn reset(&self) -> Result<(), ParameterError> {
        if let Some(default) = &self.declared_default {
            let default = default.clone();
            return self.configure(|a| a.default_value = default);
        }
        if self.parent.is_some() {
            return self.revert_to_inherited();
        }
        Err(ParameterError::NoResetSource {
            parameter: self.name.clone(),
            owner: self.owner.name().to_string(),
        })
    }

    pub(crate) fn register_alias(&self, alias: &str) {
        if self.aliases().iter().any(|n| n == alias) {
            return;
        }
        write_lock(&self.registered_aliases).push(alias.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::attrs::Getter;

    fn owner() -> Arc<OwnerHandle> {
        Arc::new(OwnerHandle::new("T"))
    }

    fn slot(attrs: ParameterAttrs) -> Parameter {
        Parameter::declared("rate", attrs, None, owner(), Arc::new(HookTable::default()))
    }

    fn ctx(id: &str) -> ExecutionContext {
        ExecutionContext::builder()
            .execution_id(id)
            .execution_phase(ContextFlags::PROCESSING)
            .source(ContextFlags::COMPOSITION)
            .build()
            .unwrap()
    }

    #[test]
    fn test_contexts_are_isolated() {
        let p = slot(ParameterAttrs::new(0.0));
        let (a, b) = (ctx("A"), ctx("B"));
        p.set(0.5, &a, SetOptions::default()).unwrap();
        assert_eq!(p.get(&a).unwrap(), Some(Value::Float(0.5)));
        assert_eq!(p.get(&b).unwrap(), None);
    }

    #[test]
    fn test_fallback_default_on_missing_value() {
        let p = slot(ParameterAttrs::new(2).fallback_default(true));
        assert_eq!(p.get(&ctx("A")).unwrap(), Some(Value::Int(2)));
        assert_eq!(p.peek(&ctx("A")), None);
    }

    #[test]
    fn test_non_stateful_slot_shares_one_value() {
        let p = slot(ParameterAttrs::new(0).stateful(false));
        p.set(7, &ctx("A"), SetOptions::default()).unwrap();
        assert_eq!(p.get(&ctx("B")).unwrap(), Some(Value::Int(7)));
        assert_eq!(p.get(&ExecutionContext::null()).unwrap(), Some(Value::Int(7)));
    }

    #[test]
    fn test_history_is_bounded_fifo() {
        let p = slot(ParameterAttrs::new(0).history_max_length(3));
        let a = ctx("A");
        for v in 1..=5 {
            p.set(v, &a, SetOptions::default()).unwrap();
        }
        assert_eq!(p.history(&a), vec![Value::Int(2), Value::Int(3), Value::Int(4)]);
        assert_eq!(p.get_previous(&a, 1), Some(Value::Int(4)));
        assert_eq!(p.get_previous(&a, 3), Some(Value::Int(2)));
        assert_eq!(p.get_previous(&a, 4), None);
        assert_eq!(p.get_previous(&a, 0), None);
    }

    #[test]
    fn test_skip_history_leaves_history_untouched() {
        let p = slot(ParameterAttrs::new(0));
        let a = ctx("A");
        p.set(1, &a, SetOptions::default()).unwrap();
        p.set(2, &a, SetOptions::default().without_history()).unwrap();
        assert!(p.history(&a).is_empty());
    }

    #[test]
    fn test_delta() {
        let p = slot(ParameterAttrs::new(0.0));
        let a = ctx("A");
        p.set(1.0, &a, SetOptions::default()).unwrap();
        p.set(1.5, &a, SetOptions::default()).unwrap();
        assert_eq!(p.get_delta(&a).unwrap(), Value::Float(0.5));

        let err = p.get_delta(&ctx("B")).unwrap_err();
        assert!(matches!(err, ParameterError::DeltaMismatch { .. }));
        assert!(err.to_string().contains("None"));
    }

    #[test]
    fn test_read_only_rejects_plain_writes() {
        let p = slot(ParameterAttrs::new(1).read_only(true));
        let a = ctx("A");
        let err = p.set(2, &a, SetOptions::default()).unwrap_err();
        assert!(matches!(err, ParameterError::ReadOnly { .. }));
        assert_eq!(p.peek(&a), None);

        p.set(2, &a, SetOptions::overriding()).unwrap();
        assert_eq!(p.peek(&a), Some(Value::Int(2)));
    }

    #[test]
    fn test_log_condition_gates_entries() {
        let p = slot(ParameterAttrs::new(0).log_condition(LogCondition::LEARNING));
        let a = ctx("A");
        p.set(1, &a, SetOptions::default()).unwrap();
        assert!(p.log_entries(&a).is_empty());

        let mut learning = a.clone();
        learning.set_execution_phase(ContextFlags::LEARNING).unwrap();
        p.set(2, &learning, SetOptions::default()).unwrap();
        let entries = p.log_entries(&a);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, Value::Int(2));
        assert!(entries[0].context.contains("LEARNING"));
    }

    #[test]
    fn test_command_line_writes_are_always_logged() {
        let p = slot(ParameterAttrs::new(0));
        let cli = ExecutionContext::builder()
            .execution_id("A")
            .source(ContextFlags::COMMAND_LINE)
            .build()
            .unwrap();
        p.set(3, &cli, SetOptions::default()).unwrap();
        let entries = p.log_entries(&cli);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].context.contains("COMMAND_LINE"));

        let quiet = slot(ParameterAttrs::new(0).loggable(false));
        quiet.set(3, &cli, SetOptions::default()).unwrap();
        assert!(quiet.log_entries(&cli).is_empty());
    }

    #[test]
    fn test_log_capacity_drops_oldest() {
        let p = slot(
            ParameterAttrs::new(0)
                .log_condition(LogCondition::EXECUTION)
                .log_capacity(Some(2)),
        );
        let a = ctx("A");
        for v in 1..=4 {
            p.set(v, &a, SetOptions::default()).unwrap();
        }
        let values: Vec<_> = p.log_entries(&a).into_iter().map(|e| e.value).collect();
        assert_eq!(values, vec![Value::Int(3), Value::Int(4)]);
    }

    #[test]
    fn test_getter_runs_every_read_and_writes_back() {
        let calls = Arc::new(std::sync::atomic::AtomicI64::new(0));
        let counter = Arc::clone(&calls);
        let getter: Getter = Arc::new(move |_: &HookContext<'_>| {
            let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            Ok(Value::Int(n))
        });
        let p = slot(ParameterAttrs {
            getter: Some(getter),
            ..ParameterAttrs::new(0)
        });
        let a = ctx("A");
        assert_eq!(p.get(&a).unwrap(), Some(Value::Int(1)));
        assert_eq!(p.get(&a).unwrap(), Some(Value::Int(2)));
        assert_eq!(p.peek(&a), Some(Value::Int(2)));
        assert_eq!(p.get_previous(&a, 1), Some(Value::Int(1)));
    }

    #[test]
    fn test_setter_transforms_before_store() {
        let p = slot(ParameterAttrs::new(0.0).setter(|v, _| {
            Ok(Value::Float(v.as_float().unwrap_or(0.0) * 2.0))
        }));
        let a = ctx("A");
        p.set(1.5, &a, SetOptions::default()).unwrap();
        assert_eq!(p.peek(&a), Some(Value::Float(3.0)));
    }

    #[test]
    fn test_shrinking_history_drops_oldest() {
        let p = slot(ParameterAttrs::new(0).history_max_length(4));
        let a = ctx("A");
        for v in 1..=5 {
            p.set(v, &a, SetOptions::default()).unwrap();
        }
        p.set_history_max_length(2).unwrap();
        assert_eq!(p.history(&a), vec![Value::Int(3), Value::Int(4)]);

        p.set_history_min_length(2).unwrap();
        let err = p.set_history_max_length(1).unwrap_err();
        assert!(matches!(err, ParameterError::HistoryLength { requested: 1, min: 2, .. }));
        assert_eq!(p.history_max_length(), 2);
    }

    #[test]
    fn test_initialize_from_context_copies_value_and_history() {
        let p = slot(ParameterAttrs::new(0));
        let (base, branch) = (ctx("base"), ctx("branch"));
        p.set(1, &base, SetOptions::default()).unwrap();
        p.set(2, &base, SetOptions::default()).unwrap();

        assert!(p.initialize_from_context(&branch, &base, false));
        assert_eq!(p.peek(&branch), Some(Value::Int(2)));
        assert_eq!(p.history(&branch), vec![Value::Int(1)]);

        p.set(9, &branch, SetOptions::default()).unwrap();
        assert!(!p.initialize_from_context(&branch, &base, false));
        assert_eq!(p.peek(&branch), Some(Value::Int(9)));
        assert!(p.initialize_from_context(&branch, &base, true));
        assert_eq!(p.peek(&branch), Some(Value::Int(2)));
        assert_eq!(p.peek(&base), Some(Value::Int(2)));
    }

    #[test]
    fn test_delete_removes_all_state() {
        let p = slot(ParameterAttrs::new(0).log_condition(LogCondition::EXECUTION));
        let a = ctx("A");
        p.set(1, &a, SetOptions::default()).unwrap();
        p.set(2, &a, SetOptions::default()).unwrap();
        p.delete(&a);
        assert_eq!(p.peek(&a), None);
        assert!(p.history(&a).is_empty());
        assert!(p.log_entries(&a).is_empty());
    }

    #[test]
    fn test_shadow_follows_parent_until_overridden() {
        let parent = Arc::new(slot(ParameterAttrs::new(1)));
        let child = Parameter::shadow("rate", Arc::clone(&parent), owner(), Arc::new(HookTable::default()));
        assert!(child.is_inherited());

        parent.set_default_value(2).unwrap();
        assert_eq!(child.default_value(), Value::Int(2));

        child.set_default_value(5).unwrap();
        assert!(!child.is_inherited());
        parent.set_default_value(3).unwrap();
        assert_eq!(child.default_value(), Value::Int(5));

        child.reset().unwrap();
        assert!(child.is_inherited());
        assert_eq!(child.default_value(), Value::Int(3));
    }

    #[test]
    fn test_reset_restores_declared_or_inherited() {
        let p = Parameter::shadow(
            "rate",
            Arc::new(slot(ParameterAttrs::new(1))),
            owner(),
            Arc::new(HookTable::default()),
        );
        p.reset().unwrap();

        let root = slot(ParameterAttrs::new(1));
        root.set_default_value(4).unwrap();
        root.reset().unwrap();
        assert_eq!(root.default_value(), Value::Int(1));
        assert!(matches!(root.revert_to_inherited(), Err(ParameterError::NoParent { .. })));
    }

    #[test]
    fn test_valid_types_reject_default() {
        let p = slot(ParameterAttrs::new(0.5).valid_types([ValueKind::Float]));
        let err = p.set_default_value("fast").unwrap_err();
        assert!(matches!(err, ParameterError::InvalidValue { .. }));
        assert!(err.to_string().contains("rate"));
        assert!(err.to_string().contains("expected one of [float], got string"));
        assert_eq!(p.default_value(), Value::Float(0.5));
        assert!(p.validate_value(&Value::Float(2.0)).is_ok());
    }

    #[test]
    fn test_log_condition_from_string() {
        let p = slot(ParameterAttrs::new(0));
        p.set_log_condition_str("PROCESSING|CONTROL").unwrap();
        assert_eq!(p.log_condition(), LogCondition::PROCESSING | LogCondition::CONTROL);
        assert!(p.set_log_condition_str("NEVER").is_err());
        p.set_log_condition(true).unwrap();
        assert_eq!(p.log_condition(), LogCondition::ALL_ASSIGNMENTS);
    }

    #[test]
    fn test_log_current_ignores_condition() {
        let p = slot(ParameterAttrs::new(0));
        let a = ctx("A");
        assert!(!p.log_current(&a).unwrap());
        p.set(4, &a, SetOptions::default()).unwrap();
        assert!(p.log_current(&a).unwrap());
        assert_eq!(p.log_entries(&a).len(), 1);
        p.clear_log([&a]);
        assert!(p.log_entries(&a).is_empty());
    }
}
