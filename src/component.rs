//! Component types and instances that own parameter schemas.
//!
//! A [`ComponentType`] declares parameters and may extend another type. Each
//! [`Component`] created from it gets an instance-level schema whose slots
//! shadow the type's slots until they are overridden.

use std::fmt;
use std::sync::{Arc, OnceLock, RwLock, Weak};

use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::context::{ContextCandidate, ContextFlags, ExecutionContext, ExecutionId, ExternalContext};
use crate::error::StoreResult;
use crate::parameter::{LogEntry, Parameter, ParameterAttrs, SetOptions};
use crate::schema::{
    validator_from_predicate, ContextSnapshot, Declaration, Defaults, HookTable, ParameterSchema, Parser,
    Validator,
};
use crate::value::{ComponentId, ComponentRef, Value};

/// Construction state of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitializationStatus {
    Uninitialized,
    DeferredInit,
    Initializing,
    Validating,
    Initialized,
    Reinitialized,
}

impl InitializationStatus {
    /// Matching context flag.
    #[must_use]
    pub const fn flag(self) -> ContextFlags {
        match self {
            Self::Uninitialized => ContextFlags::UNINITIALIZED,
            Self::DeferredInit => ContextFlags::DEFERRED_INIT,
            Self::Initializing => ContextFlags::INITIALIZING,
            Self::Validating => ContextFlags::VALIDATING,
            Self::Initialized => ContextFlags::INITIALIZED,
            Self::Reinitialized => ContextFlags::REINITIALIZED,
        }
    }
}

/// Anything that owns a parameter schema.
pub trait ParameterOwner: Send + Sync {
    fn name(&self) -> &str;

    fn initialization_status(&self) -> InitializationStatus;

    fn parameters(&self) -> &ParameterSchema;
}

/// Back-reference from slots to their owner, bound once the owner exists.
pub(crate) struct OwnerHandle {
    name: String,
    handle: OnceLock<Weak<dyn ParameterOwner>>,
}

impl OwnerHandle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: OnceLock::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn bind(&self, owner: Weak<dyn ParameterOwner>) {
        if self.handle.set(owner).is_err() {
            debug!(owner = %self.name, "owner already bound");
        }
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<dyn ParameterOwner>> {
        self.handle.get().and_then(Weak::upgrade)
    }

    pub(crate) fn initialization_status(&self) -> Option<InitializationStatus> {
        self.upgrade().map(|owner| owner.initialization_status())
    }
}

/// A declared kind of component: its parameters, hooks, and parent type.
pub struct ComponentType {
    name: String,
    parent: Option<Arc<ComponentType>>,
    parameters: Arc<ParameterSchema>,
    config: StoreConfig,
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.clone()))
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl ParameterOwner for ComponentType {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialization_status(&self) -> InitializationStatus {
        InitializationStatus::Initialized
    }

    fn parameters(&self) -> &ParameterSchema {
        &self.parameters
    }
}

impl ComponentType {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ComponentTypeBuilder {
        ComponentTypeBuilder::new(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn parent(&self) -> Option<&Arc<Self>> {
        self.parent.as_ref()
    }

    #[must_use]
    pub const fn parameters(&self) -> &Arc<ParameterSchema> {
        &self.parameters
    }

    /// Type-level defaults. Changes here reach every instance slot that
    /// still inherits.
    #[must_use]
    pub fn defaults(&self) -> Defaults<'_> {
        self.parameters.defaults()
    }

    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// True if this type is `other` or extends it.
    #[must_use]
    pub fn extends(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.parent.as_ref().is_some_and(|p| p.extends(other))
    }

    /// Creates an instance with the type's defaults.
    ///
    /// # Errors
    ///
    /// See [`instantiate_with`](Self::instantiate_with).
    pub fn instantiate(self: &Arc<Self>, name: impl Into<String>) -> StoreResult<Arc<Component>> {
        self.instantiate_with(name, std::iter::empty::<(&str, Value)>())
    }

    /// Creates an instance, applying `overrides` to its defaults.
    ///
    /// Every slot without a getter is seeded with its default under the null
    /// execution ID, so the null context can serve as a fork base.
    ///
    /// # Errors
    ///
    /// `StoreError::Parameter` for an unknown or invalid override.
    pub fn instantiate_with<I, K, V>(
        self: &Arc<Self>,
        name: impl Into<String>,
        overrides: I,
    ) -> StoreResult<Arc<Component>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let name = name.into();
        let parameters = ParameterSchema::instance_of(&self.parameters, name.clone())?;
        let component = Arc::new(Component {
            id: ComponentId::new(),
            name,
            component_type: Arc::clone(self),
            parameters,
            status: RwLock::new(InitializationStatus::Initializing),
            most_recent_context: RwLock::new(ExecutionContext::null()),
            adapter: ExternalContext::command_line(),
        });
        let weak = Arc::downgrade(&component);
        let owner: Weak<dyn ParameterOwner> = weak;
        component.parameters.bind_owner(owner);

        component.parameters.defaults().apply(overrides)?;
        let construction = ExecutionContext::builder().source(ContextFlags::CONSTRUCTOR).build()?;
        for slot in component.parameters.slots() {
            if !slot.has_getter() {
                slot.seed(slot.default_value(), &construction)?;
            }
        }
        component.set_initialization_status(InitializationStatus::Initialized);
        info!(component = %component.name, component_type = %self.name, "instantiated component");
        Ok(component)
    }
}

enum PendingDeclaration {
    Simple { name: String, default: Value },
    Full(Declaration),
}

/// Builder for [`ComponentType`].
pub struct ComponentTypeBuilder {
    name: String,
    parent: Option<Arc<ComponentType>>,
    declarations: Vec<PendingDeclaration>,
    hooks: HookTable,
    config: Option<StoreConfig>,
}

impl ComponentTypeBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            declarations: Vec::new(),
            hooks: HookTable::new(),
            config: None,
        }
    }

    /// Type to extend. Undeclared names are inherited from it.
    #[must_use]
    pub fn parent(mut self, parent: &Arc<ComponentType>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    /// Settings for parameters declared with [`parameter`](Self::parameter).
    /// Defaults to the parent's configuration.
    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Declares a parameter with `default` and the configured settings.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.declarations.push(PendingDeclaration::Simple {
            name: name.into(),
            default: default.into(),
        });
        self
    }

    /// Declares a parameter with explicit attributes.
    #[must_use]
    pub fn declare(mut self, name: impl Into<String>, attrs: ParameterAttrs) -> Self {
        self.declarations
            .push(PendingDeclaration::Full(Declaration::parameter(name, attrs)));
        self
    }

    /// New default for a parameter inherited from the parent type.
    #[must_use]
    pub fn override_default(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.declarations
            .push(PendingDeclaration::Full(Declaration::default_override(name, value)));
        self
    }

    #[must_use]
    pub fn alias(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.declarations
            .push(PendingDeclaration::Full(Declaration::alias(name, target)));
        self
    }

    #[must_use]
    pub fn validator(mut self, parameter: impl Into<String>, validator: Validator) -> Self {
        self.hooks.insert_validator(parameter, validator);
        self
    }

    /// Registers a boolean predicate as the validator for `parameter`.
    #[must_use]
    pub fn validate_with<F>(self, parameter: impl Into<String>, label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validator(parameter, validator_from_predicate(label, predicate))
    }

    #[must_use]
    pub fn parser(mut self, parameter: impl Into<String>, parser: Parser) -> Self {
        self.hooks.insert_parser(parameter, parser);
        self
    }

    /// # Errors
    ///
    /// `StoreError::Parameter` for an invalid configuration or any schema
    /// construction failure.
    pub fn build(self) -> StoreResult<Arc<ComponentType>> {
        let config = self
            .config
            .or_else(|| self.parent.as_ref().map(|p| p.config.clone()))
            .unwrap_or_default();
        config.validate()?;

        let declarations = self
            .declarations
            .into_iter()
            .map(|pending| match pending {
                PendingDeclaration::Simple { name, default } => {
                    Declaration::parameter(name, config.attrs_for(default))
                }
                PendingDeclaration::Full(declaration) => declaration,
            })
            .collect();

        let parameters = ParameterSchema::build(
            self.name.clone(),
            self.parent.as_ref().map(|p| Arc::clone(&p.parameters)),
            declarations,
            self.hooks,
        )?;
        let component_type = Arc::new(ComponentType {
            name: self.name,
            parent: self.parent,
            parameters,
            config,
        });
        let weak = Arc::downgrade(&component_type);
        let owner: Weak<dyn ParameterOwner> = weak;
        component_type.parameters.bind_owner(owner);
        debug!(component_type = %component_type.name, "built component type");
        Ok(component_type)
    }
}

/// A component instance. Public operations accept any
/// [`ContextCandidate`]; passing none uses the most recent context.
pub struct Component {
    id: ComponentId,
    name: String,
    component_type: Arc<ComponentType>,
    parameters: Arc<ParameterSchema>,
    status: RwLock<InitializationStatus>,
    most_recent_context: RwLock<ExecutionContext>,
    adapter: ExternalContext,
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("component_type", &self.component_type.name)
            .field("status", &self.initialization_status())
            .finish_non_exhaustive()
    }
}

impl ParameterOwner for Component {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialization_status(&self) -> InitializationStatus {
        match self.status.read() {
            Ok(g) => *g,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn parameters(&self) -> &ParameterSchema {
        &self.parameters
    }
}

impl Component {
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn component_type(&self) -> &Arc<ComponentType> {
        &self.component_type
    }

    /// Handle for storing this component in another component's parameter.
    #[must_use]
    pub fn handle(&self) -> ComponentRef {
        ComponentRef::new(self.id, self.name.clone())
    }

    #[must_use]
    pub const fn parameters(&self) -> &Arc<ParameterSchema> {
        &self.parameters
    }

    /// Instance-level defaults.
    #[must_use]
    pub fn defaults(&self) -> Defaults<'_> {
        self.parameters.defaults()
    }

    #[must_use]
    pub fn initialization_status(&self) -> InitializationStatus {
        ParameterOwner::initialization_status(self)
    }

    pub fn set_initialization_status(&self, status: InitializationStatus) {
        let mut guard = match self.status.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = status;
    }

    #[must_use]
    pub fn most_recent_context(&self) -> ExecutionContext {
        match self.most_recent_context.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Records `context` as the one used when callers pass none.
    pub fn set_most_recent_context(&self, context: ExecutionContext) {
        let mut guard = match self.most_recent_context.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = context;
    }

    /// Resolves `candidate` into a context.
    ///
    /// No context means the most recent context, re-flagged as a
    /// command-line access.
    ///
    /// # Errors
    ///
    /// `StoreError::Context` if the resolved flags are malformed.
    pub fn resolve(&self, candidate: impl Into<ContextCandidate>) -> StoreResult<ExecutionContext> {
        let candidate = candidate.into();
        if candidate.is_absent() {
            let mut context = self.most_recent_context();
            context.set_execution_phase(self.adapter.execution_phase())?;
            context.set_source(self.adapter.source())?;
            return Ok(context);
        }
        Ok(self.adapter.resolve(candidate)?)
    }

    /// # Errors
    ///
    /// `UnknownParameter`, a context error, or the slot's getter error.
    pub fn get(&self, name: &str, context: impl Into<ContextCandidate>) -> StoreResult<Option<Value>> {
        let context = self.resolve(context)?;
        Ok(self.parameters.get(name, &context)?)
    }

    /// # Errors
    ///
    /// `UnknownParameter`, `ReadOnly`, a context error, or the setter's error.
    pub fn set(&self, name: &str, value: impl Into<Value>, context: impl Into<ContextCandidate>) -> StoreResult<()> {
        self.set_with(name, value, context, SetOptions::default())
    }

    /// # Errors
    ///
    /// See [`set`](Self::set).
    pub fn set_with(
        &self,
        name: &str,
        value: impl Into<Value>,
        context: impl Into<ContextCandidate>,
        options: SetOptions,
    ) -> StoreResult<()> {
        let context = self.resolve(context)?;
        Ok(self.parameters.set_with(name, value, &context, options)?)
    }

    /// # Errors
    ///
    /// `UnknownParameter` or a context error.
    pub fn get_previous(
        &self,
        name: &str,
        context: impl Into<ContextCandidate>,
        index: usize,
    ) -> StoreResult<Option<Value>> {
        let context = self.resolve(context)?;
        Ok(self.parameters.get_previous(name, &context, index)?)
    }

    /// # Errors
    ///
    /// `UnknownParameter`, `DeltaMismatch`, or a context error.
    pub fn get_delta(&self, name: &str, context: impl Into<ContextCandidate>) -> StoreResult<Value> {
        let context = self.resolve(context)?;
        Ok(self.parameters.get_delta(name, &context)?)
    }

    /// # Errors
    ///
    /// `UnknownParameter` or `NoResetSource`.
    pub fn reset(&self, name: &str) -> StoreResult<()> {
        Ok(self.parameters.reset(name)?)
    }

    /// # Errors
    ///
    /// `UnknownParameter` or a context error.
    pub fn delete(&self, name: &str, context: impl Into<ContextCandidate>) -> StoreResult<()> {
        let context = self.resolve(context)?;
        Ok(self.parameters.delete(name, &context)?)
    }

    /// # Errors
    ///
    /// `UnknownParameter` or a context error.
    pub fn log_entries(&self, name: &str, context: impl Into<ContextCandidate>) -> StoreResult<Vec<LogEntry>> {
        let context = self.resolve(context)?;
        Ok(self.parameters.slot(name)?.log_entries(&context))
    }

    /// Logs the current value of `name` as a command-line entry. Returns
    /// false if there is no value to log.
    ///
    /// # Errors
    ///
    /// `UnknownParameter`, a context error, or the slot's getter error.
    pub fn log_current(&self, name: &str, context: impl Into<ContextCandidate>) -> StoreResult<bool> {
        let context = self.resolve(context)?;
        Ok(self.parameters.slot(name)?.log_current(&context)?)
    }

    #[must_use]
    pub fn values(&self, show_all: bool) -> std::collections::BTreeMap<String, Value> {
        self.parameters.values(show_all)
    }

    #[must_use]
    pub fn names(&self, show_all: bool) -> Vec<String> {
        self.parameters.names(show_all)
    }

    #[must_use]
    pub fn show(&self, show_all: bool) -> String {
        self.parameters.show(show_all)
    }

    /// Opens a simulation branch keyed by `branch_id`, seeded from `base`.
    ///
    /// # Errors
    ///
    /// A context error if `base` cannot be resolved.
    pub fn fork_context(
        &self,
        base: impl Into<ContextCandidate>,
        branch_id: impl Into<ExecutionId>,
    ) -> StoreResult<ExecutionContext> {
        let base = self.resolve(base)?;
        let branch = base.fork(branch_id);
        self.parameters.initialize_from_context(&branch, &base, false);
        debug!(component = %self.name, branch = ?branch.execution_id(), "forked context");
        Ok(branch)
    }

    /// Seeds `context` from `base` in every slot.
    ///
    /// # Errors
    ///
    /// A context error if either cannot be resolved.
    pub fn initialize_from_context(
        &self,
        context: impl Into<ContextCandidate>,
        base: impl Into<ContextCandidate>,
        override_existing: bool,
    ) -> StoreResult<usize> {
        let context = self.resolve(context)?;
        let base = self.resolve(base)?;
        Ok(self.parameters.initialize_from_context(&context, &base, override_existing))
    }

    /// Drops a finished branch, keeping slots that retain simulation data.
    ///
    /// # Errors
    ///
    /// A context error if `context` cannot be resolved.
    pub fn discard_context(&self, context: impl Into<ContextCandidate>) -> StoreResult<usize> {
        let context = self.resolve(context)?;
        Ok(self.parameters.discard_context(&context))
    }

    /// # Errors
    ///
    /// A context error if `context` cannot be resolved.
    pub fn delete_context(&self, context: impl Into<ContextCandidate>) -> StoreResult<()> {
        let context = self.resolve(context)?;
        self.parameters.delete_context(&context);
        Ok(())
    }

    pub fn clear_log(&self, contexts: &[ExecutionContext]) {
        self.parameters.clear_log(contexts);
    }

    /// # Errors
    ///
    /// A context error if `context` cannot be resolved.
    pub fn snapshot(&self, context: impl Into<ContextCandidate>) -> StoreResult<ContextSnapshot> {
        let context = self.resolve(context)?;
        Ok(self.parameters.snapshot(&context))
    }

    /// Adds an instance-only parameter.
    ///
    /// # Errors
    ///
    /// See [`ParameterSchema::declare_parameter`].
    pub fn declare_parameter(&self, name: &str, attrs: ParameterAttrs) -> StoreResult<Arc<Parameter>> {
        Ok(self.parameters.declare_parameter(name, attrs)?)
    }

    /// Copy of this component under a new name and ID.
    ///
    /// Owned values are copied; component handles stored in parameters keep
    /// pointing at the same components.
    #[must_use]
    pub fn duplicate(&self, name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let copy = Arc::new(Self {
            id: ComponentId::new(),
            name: name.clone(),
            component_type: Arc::clone(&self.component_type),
            parameters: self.parameters.duplicate(name),
            status: RwLock::new(self.initialization_status()),
            most_recent_context: RwLock::new(self.most_recent_context()),
            adapter: self.adapter.clone(),
        });
        let weak = Arc::downgrade(&copy);
        let owner: Weak<dyn ParameterOwner> = weak;
        copy.parameters.bind_owner(owner);
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ParameterError, StoreError};
    use crate::parameter::LogCondition;

    fn mechanism() -> Arc<ComponentType> {
        ComponentType::builder("Mechanism")
            .parameter("rate", 1.0)
            .declare("variable", ParameterAttrs::new(0.0).read_only(true).user(false))
            .validate_with("rate", "non_negative", |v| v.as_float().map_or(false, |x| x >= 0.0))
            .build()
            .unwrap()
    }

    #[test]
    fn test_instance_is_seeded_under_null_context() {
        let ty = mechanism();
        let c = ty.instantiate("m1").unwrap();
        assert_eq!(c.initialization_status(), InitializationStatus::Initialized);
        assert_eq!(c.get("rate", ()).unwrap(), Some(Value::Float(1.0)));
        assert_eq!(c.get("rate", "other").unwrap(), None);
    }

    #[test]
    fn test_overrides_are_validated() {
        let ty = mechanism();
        let c = ty.instantiate_with("m1", [("rate", 0.25)]).unwrap();
        assert_eq!(c.defaults().get("rate").unwrap(), Value::Float(0.25));
        assert_eq!(ty.defaults().get("rate").unwrap(), Value::Float(1.0));

        let err = ty.instantiate_with("m2", [("rate", -1.0)]).unwrap_err();
        assert!(matches!(err, StoreError::Parameter(ParameterError::InvalidValue { .. })));
        let err = ty.instantiate_with("m3", [("gain", 1.0)]).unwrap_err();
        assert!(matches!(err, StoreError::Parameter(ParameterError::UnknownParameter { .. })));
    }

    #[test]
    fn test_absent_context_uses_most_recent() {
        let c = mechanism().instantiate("m1").unwrap();
        c.set_most_recent_context(ExecutionContext::new("run-7"));
        c.set("rate", 0.5, ()).unwrap();
        assert_eq!(c.get("rate", "run-7").unwrap(), Some(Value::Float(0.5)));
        assert_eq!(c.get("rate", ExecutionContext::null()).unwrap(), Some(Value::Float(1.0)));
    }

    #[test]
    fn test_read_only_needs_override() {
        let c = mechanism().instantiate("m1").unwrap();
        let err = c.set("variable", 2.0, "A").unwrap_err();
        assert!(matches!(err, StoreError::Parameter(ParameterError::ReadOnly { .. })));
        c.set_with("variable", 2.0, "A", SetOptions::overriding()).unwrap();
        assert_eq!(c.get("variable", "A").unwrap(), Some(Value::Float(2.0)));
    }

    #[test]
    fn test_initialization_logging_during_construction() {
        let ty = ComponentType::builder("Logged")
            .declare("rate", ParameterAttrs::new(1.0).log_condition(LogCondition::INITIALIZATION))
            .build()
            .unwrap();
        let c = ty.instantiate("m1").unwrap();
        let entries = c.log_entries("rate", ExecutionContext::null()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, Value::Float(1.0));

        c.set("rate", 2.0, ExecutionContext::new("A")).unwrap();
        assert!(c.log_entries("rate", "A").unwrap().is_empty());
    }

    #[test]
    fn test_subtype_extends_parent() {
        let base = mechanism();
        let sub = ComponentType::builder("Transfer")
            .parent(&base)
            .override_default("rate", 2.0)
            .parameter("gain", 1)
            .build()
            .unwrap();
        assert!(sub.extends(&base));
        assert!(!base.extends(&sub));
        assert_eq!(sub.defaults().get("rate").unwrap(), Value::Float(2.0));
        assert_eq!(sub.parameters().names(false), vec!["gain", "rate"]);
    }

    #[test]
    fn test_config_applies_to_simple_parameters() {
        let ty = ComponentType::builder("Tracked")
            .config(StoreConfig {
                history_max_length: 3,
                fallback_default: true,
                ..StoreConfig::default()
            })
            .parameter("rate", 1.0)
            .build()
            .unwrap();
        let slot = ty.parameters().slot("rate").unwrap();
        assert_eq!(slot.history_max_length(), 3);
        assert!(slot.fallback_default());

        let c = ty.instantiate("t1").unwrap();
        assert_eq!(c.get("rate", "never-written").unwrap(), Some(Value::Float(1.0)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ComponentType::builder("Bad")
            .config(StoreConfig {
                history_max_length: 0,
                history_min_length: 1,
                ..StoreConfig::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, StoreError::Parameter(ParameterError::InvalidConfig { .. })));
    }

    #[test]
    fn test_hooks_read_siblings_through_owner() {
        let ty = ComponentType::builder("Scaled")
            .parameter("gain", 2.0)
            .declare(
                "scaled",
                ParameterAttrs::new(0.0).getter(|hook| {
                    let gain = hook.sibling("gain")?.and_then(|v| v.as_float()).unwrap_or(0.0);
                    Ok(Value::Float(gain * 10.0))
                }),
            )
            .build()
            .unwrap();
        let c = ty.instantiate("s1").unwrap();
        c.set("gain", 3.0, "A").unwrap();
        assert_eq!(c.get("scaled", "A").unwrap(), Some(Value::Float(30.0)));
        assert_eq!(c.get("scaled", "B").unwrap(), Some(Value::Float(0.0)));
    }

    #[test]
    fn test_duplicate_shares_component_handles() {
        let ty = ComponentType::builder("Holder").parameter("function", Value::Null).build().unwrap();
        let inner = mechanism().instantiate("inner").unwrap();
        let holder = ty.instantiate("h1").unwrap();
        holder.set("function", inner.handle(), "A").unwrap();
        holder.set_most_recent_context(ExecutionContext::new("A"));

        let copy = holder.duplicate("h2");
        assert_ne!(copy.id(), holder.id());
        assert_eq!(copy.get("function", "A").unwrap(), Some(Value::Component(inner.handle())));
        assert_eq!(copy.most_recent_context().execution_id(), holder.most_recent_context().execution_id());
        assert_eq!(copy.parameters().owner_name(), "h2");
    }

    fn owner_reporter() -> Arc<ComponentType> {
        ComponentType::builder("Reporter")
            .declare(
                "owner",
                ParameterAttrs::new(Value::Null).getter(|hook| {
                    let owner = hook.owner().ok_or_else(|| hook.error("owner not bound"))?;
                    Ok(Value::String(format!("{}:{:?}", owner.name(), owner.initialization_status())))
                }),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_owner_is_bound_for_types_instances_and_copies() {
        let ty = owner_reporter();
        let at_type = ty.parameters().slot("owner").unwrap().get(&ExecutionContext::null()).unwrap();
        assert_eq!(at_type, Some(Value::String("Reporter:Initialized".into())));

        let c = ty.instantiate("r1").unwrap();
        assert_eq!(c.get("owner", "A").unwrap(), Some(Value::String("r1:Initialized".into())));

        c.set_initialization_status(InitializationStatus::Reinitialized);
        let copy = c.duplicate("r2");
        assert_eq!(copy.get("owner", "A").unwrap(), Some(Value::String("r2:Reinitialized".into())));
        assert_eq!(c.get("owner", "A").unwrap(), Some(Value::String("r1:Reinitialized".into())));
    }

    struct WarnCounter(Arc<std::sync::atomic::AtomicUsize>);

    impl tracing::Subscriber for WarnCounter {
        fn enabled(&self, _: &tracing::Metadata<'_>) -> bool {
            true
        }

        fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
            tracing::span::Id::from_u64(1)
        }

        fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}

        fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}

        fn event(&self, event: &tracing::Event<'_>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }

        fn enter(&self, _: &tracing::span::Id) {}

        fn exit(&self, _: &tracing::span::Id) {}
    }

    fn count_warnings(f: impl FnOnce()) -> usize {
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        tracing::subscriber::with_default(WarnCounter(Arc::clone(&count)), f);
        count.load(std::sync::atomic::Ordering::SeqCst)
    }

    #[test]
    fn test_construction_seeds_read_only_without_warning() {
        let ty = mechanism();
        let mut instance = None;
        assert_eq!(count_warnings(|| instance = Some(ty.instantiate("m1").unwrap())), 0);
        let c = instance.unwrap();
        assert_eq!(c.get("variable", ()).unwrap(), Some(Value::Float(0.0)));
        assert!(c.parameters().slot("variable").unwrap().history(&ExecutionContext::null()).is_empty());

        let warnings = count_warnings(|| {
            c.set_with("variable", 2.0, "A", SetOptions::overriding()).unwrap();
        });
        assert_eq!(warnings, 1);
    }

    #[test]
    fn test_fork_and_discard() {
        let c = mechanism().instantiate("m1").unwrap();
        let base = ExecutionContext::new("base");
        c.set("rate", 0.3, &base).unwrap();

        let branch = c.fork_context(&base, "base-sim").unwrap();
        assert!(branch.is_simulation());
        assert_eq!(c.get("rate", &branch).unwrap(), Some(Value::Float(0.3)));

        c.set("rate", 0.9, &branch).unwrap();
        assert_eq!(c.get("rate", &base).unwrap(), Some(Value::Float(0.3)));

        assert!(c.discard_context(&branch).unwrap() > 0);
        assert_eq!(c.get("rate", &branch).unwrap(), None);
    }
}
