//! Parameter schemas: the named set of slots attached to a type or instance.
//!
//! A schema is built from an ordered list of declarations plus an optional
//! parent schema. Names declared locally get their own slots; every other
//! name the parent knows gets a shadow slot that reads its attributes from
//! the parent's slot. Aliases are resolved after all slots exist.

mod defaults;
mod hooks;
mod snapshot;

pub use defaults::Defaults;
pub use hooks::{validator_from_predicate, HookTable, Parser, Validator};
pub use snapshot::ContextSnapshot;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use regex::Regex;
use tracing::debug;

use crate::component::{OwnerHandle, ParameterOwner};
use crate::context::ExecutionContext;
use crate::error::ParameterError;
use crate::parameter::{Parameter, ParameterAlias, ParameterAttrs, SetOptions};
use crate::value::Value;

static NAME_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

/// True if `name` can name a parameter or alias.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").ok())
        .as_ref()
        .map_or(false, |re| re.is_match(name))
}

fn check_name(name: &str) -> Result<(), ParameterError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(ParameterError::InvalidName {
            name: name.to_string(),
        })
    }
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

/// One entry of a schema's declaration list.
#[derive(Debug, Clone)]
pub enum Declaration {
    /// A slot with fully specified attributes.
    Parameter { name: String, attrs: ParameterAttrs },
    /// A new default for a slot inherited from the parent schema; every other
    /// attribute is copied from the parent.
    DefaultOverride { name: String, value: Value },
    /// A second name for an existing slot.
    Alias { name: String, target: String },
}

impl Declaration {
    #[must_use]
    pub fn parameter(name: impl Into<String>, attrs: ParameterAttrs) -> Self {
        Self::Parameter {
            name: name.into(),
            attrs,
        }
    }

    #[must_use]
    pub fn default_override(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::DefaultOverride {
            name: name.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn alias(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Alias {
            name: name.into(),
            target: target.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Parameter { name, .. }
            | Self::DefaultOverride { name, .. }
            | Self::Alias { name, .. } => name,
        }
    }
}

/// A name in a schema: either a slot or an alias of one.
#[derive(Debug, Clone)]
pub enum SchemaEntry {
    Parameter(Arc<Parameter>),
    Alias(ParameterAlias),
}

impl SchemaEntry {
    /// The slot this entry reads and writes.
    #[must_use]
    pub const fn slot(&self) -> &Arc<Parameter> {
        match self {
            Self::Parameter(slot) => slot,
            Self::Alias(alias) => alias.target(),
        }
    }

    #[must_use]
    pub const fn is_alias(&self) -> bool {
        matches!(self, Self::Alias(_))
    }
}

/// The parameter slots of one component type or instance.
pub struct ParameterSchema {
    owner: Arc<OwnerHandle>,
    parent: Option<Arc<ParameterSchema>>,
    hooks: Arc<HookTable>,
    entries: RwLock<BTreeMap<String, SchemaEntry>>,
}

impl fmt::Debug for ParameterSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSchema")
            .field("owner", &self.owner.name())
            .field("parent", &self.parent.as_ref().map(|p| p.owner_name().to_string()))
            .field("names", &self.all_names())
            .finish()
    }
}

impl ParameterSchema {
    /// Builds a schema from `declarations`, inheriting every other name from
    /// `parent`.
    ///
    /// # Errors
    ///
    /// - `InvalidName` or `DuplicateParameter` for a bad declaration name
    /// - `UnknownParameter` for a default override the parent does not know
    /// - `AliasTargetMissing` for an alias to a name that does not exist
    /// - `HistoryLength` for inconsistent history bounds
    /// - `InvalidValue` if any default fails validation
    pub fn build(
        owner_name: impl Into<String>,
        parent: Option<Arc<Self>>,
        declarations: Vec<Declaration>,
        hooks: HookTable,
    ) -> Result<Arc<Self>, ParameterError> {
        let hooks = Arc::new(hooks.with_parent(parent.as_ref().map(|p| Arc::clone(&p.hooks))));
        let schema = Self {
            owner: Arc::new(OwnerHandle::new(owner_name)),
            parent,
            hooks,
            entries: RwLock::new(BTreeMap::new()),
        };
        schema.populate(declarations)?;
        Ok(Arc::new(schema))
    }

    /// Schema for an instance of the type described by `parent`: every name
    /// starts as a shadow of the type's slot.
    ///
    /// # Errors
    ///
    /// `InvalidValue` if an inherited default fails validation.
    pub fn instance_of(parent: &Arc<Self>, owner_name: impl Into<String>) -> Result<Arc<Self>, ParameterError> {
        Self::build(owner_name, Some(Arc::clone(parent)), Vec::new(), HookTable::new())
    }

    fn populate(&self, declarations: Vec<Declaration>) -> Result<(), ParameterError> {
        let mut entries: BTreeMap<String, SchemaEntry> = BTreeMap::new();
        let mut aliases: Vec<(String, String)> = Vec::new();

        for declaration in declarations {
            check_name(declaration.name())?;
            match declaration {
                Declaration::Parameter { name, attrs } => {
                    self.ensure_free(&entries, &name)?;
                    attrs.check(&name, self.owner.name())?;
                    aliases.extend(attrs.aliases.iter().map(|a| (a.clone(), name.clone())));
                    let slot = self.new_slot(&name, attrs);
                    entries.insert(name, SchemaEntry::Parameter(Arc::new(slot)));
                }
                Declaration::DefaultOverride { name, value } => {
                    let inherited = self
                        .parent
                        .as_ref()
                        .and_then(|p| p.resolve_entry(&name))
                        .map(|e| Arc::clone(e.slot()))
                        .ok_or_else(|| ParameterError::UnknownParameter {
                            parameter: name.clone(),
                            owner: self.owner.name().to_string(),
                        })?;
                    let canonical = inherited.name().to_string();
                    self.ensure_free(&entries, &canonical)?;
                    let mut attrs = inherited.attrs();
                    attrs.default_value = self.hooks.parse(&canonical, value);
                    let slot = Parameter::declared(
                        canonical.clone(),
                        attrs,
                        Some(inherited),
                        Arc::clone(&self.owner),
                        Arc::clone(&self.hooks),
                    );
                    entries.insert(canonical, SchemaEntry::Parameter(Arc::new(slot)));
                }
                Declaration::Alias { name, target } => aliases.push((name, target)),
            }
        }

        if let Some(parent) = &self.parent {
            for name in parent.all_names() {
                if entries.contains_key(&name) || aliases.iter().any(|(a, _)| *a == name) {
                    continue;
                }
                match parent.resolve_entry(&name) {
                    Some(SchemaEntry::Parameter(inherited)) => {
                        let slot = self.shadow_of(&name, inherited);
                        entries.insert(name, SchemaEntry::Parameter(Arc::new(slot)));
                    }
                    Some(SchemaEntry::Alias(alias)) => {
                        let target = alias.target_name().to_string();
                        aliases.push((name, target));
                    }
                    None => {}
                }
            }
        }

        for (alias, target) in aliases {
            check_name(&alias)?;
            self.ensure_free(&entries, &alias)?;
            let slot = entries
                .get(&target)
                .map(|e| Arc::clone(e.slot()))
                .ok_or_else(|| ParameterError::AliasTargetMissing {
                    alias: alias.clone(),
                    target: target.clone(),
                    owner: self.owner.name().to_string(),
                })?;
            slot.register_alias(&alias);
            entries.insert(alias.clone(), SchemaEntry::Alias(ParameterAlias::new(alias, slot)));
        }

        for entry in entries.values() {
            if let SchemaEntry::Parameter(slot) = entry {
                slot.validate_value(&slot.default_value())?;
            }
        }

        *write_lock(&self.entries) = entries;
        Ok(())
    }

    fn ensure_free(&self, entries: &BTreeMap<String, SchemaEntry>, name: &str) -> Result<(), ParameterError> {
        if entries.contains_key(name) {
            return Err(ParameterError::DuplicateParameter {
                parameter: name.to_string(),
                owner: self.owner.name().to_string(),
            });
        }
        Ok(())
    }

    fn shadow_of(&self, name: &str, inherited: Arc<Parameter>) -> Parameter {
        Parameter::shadow(name, inherited, Arc::clone(&self.owner), Arc::clone(&self.hooks))
    }

    /// Slot for a local declaration; identical to the parent's slot means a
    /// plain shadow.
    fn new_slot(&self, name: &str, attrs: ParameterAttrs) -> Parameter {
        let inherited = self
            .parent
            .as_ref()
            .and_then(|p| p.resolve_entry(name))
            .and_then(|e| match e {
                SchemaEntry::Parameter(slot) => Some(slot),
                SchemaEntry::Alias(_) => None,
            });
        match inherited {
            Some(parent) if parent.attrs() == attrs => self.shadow_of(name, parent),
            parent => Parameter::declared(
                name,
                attrs,
                parent,
                Arc::clone(&self.owner),
                Arc::clone(&self.hooks),
            ),
        }
    }

    /// Local entry for `name`, creating a shadow on first access if only an
    /// ancestor knows it.
    fn resolve_entry(&self, name: &str) -> Option<SchemaEntry> {
        if let Some(entry) = read_lock(&self.entries).get(name) {
            return Some(entry.clone());
        }
        let inherited = self.parent.as_ref()?.resolve_entry(name)?;
        let entry = match inherited {
            SchemaEntry::Parameter(slot) => {
                debug!(parameter = %name, owner = %self.owner.name(), "created shadow slot on access");
                SchemaEntry::Parameter(Arc::new(self.shadow_of(name, slot)))
            }
            SchemaEntry::Alias(alias) => {
                let target = Arc::clone(self.resolve_entry(alias.target_name())?.slot());
                SchemaEntry::Alias(ParameterAlias::new(name, target))
            }
        };
        let mut entries = write_lock(&self.entries);
        Some(entries.entry(name.to_string()).or_insert(entry).clone())
    }

    /// Every name known here or in an ancestor, sorted.
    fn all_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read_lock(&self.entries).keys().cloned().collect();
        if let Some(parent) = &self.parent {
            names.extend(parent.all_names());
        }
        names.sort();
        names.dedup();
        names
    }

    pub(crate) fn bind_owner(&self, owner: Weak<dyn ParameterOwner>) {
        self.owner.bind(owner);
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

    #[must_use]
    pub fn hooks(&self) -> &HookTable {
        &self.hooks
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.resolve_entry(name).is_some()
    }

    /// # Errors
    ///
    /// `ParameterError::UnknownParameter` if no slot or alias has that name.
    pub fn entry(&self, name: &str) -> Result<SchemaEntry, ParameterError> {
        self.resolve_entry(name).ok_or_else(|| ParameterError::UnknownParameter {
            parameter: name.to_string(),
            owner: self.owner.name().to_string(),
        })
    }

    /// Slot for `name`, following aliases.
    ///
    /// # Errors
    ///
    /// `ParameterError::UnknownParameter` if no slot or alias has that name.
    pub fn slot(&self, name: &str) -> Result<Arc<Parameter>, ParameterError> {
        self.entry(name).map(|e| Arc::clone(e.slot()))
    }

    /// Every slot, sorted by name. Aliases are not repeated.
    #[must_use]
    pub fn slots(&self) -> Vec<Arc<Parameter>> {
        self.all_names()
            .iter()
            .filter_map(|name| match self.resolve_entry(name)? {
                SchemaEntry::Parameter(slot) => Some(slot),
                SchemaEntry::Alias(_) => None,
            })
            .collect()
    }

    /// Alias name to target name.
    #[must_use]
    pub fn aliases(&self) -> BTreeMap<String, String> {
        self.all_names()
            .iter()
            .filter_map(|name| match self.resolve_entry(name)? {
                SchemaEntry::Alias(alias) => Some((name.clone(), alias.target_name().to_string())),
                SchemaEntry::Parameter(_) => None,
            })
            .collect()
    }

    /// # Errors
    ///
    /// `UnknownParameter`, or whatever the slot's getter returns.
    pub fn get(&self, name: &str, context: &ExecutionContext) -> Result<Option<Value>, ParameterError> {
        self.slot(name)?.get(context)
    }

    /// # Errors
    ///
    /// `UnknownParameter`, `ReadOnly`, or whatever the slot's setter returns.
    pub fn set(&self, name: &str, value: impl Into<Value>, context: &ExecutionContext) -> Result<(), ParameterError> {
        self.set_with(name, value, context, SetOptions::default())
    }

    /// # Errors
    ///
    /// See [`set`](Self::set).
    pub fn set_with(
        &self,
        name: &str,
        value: impl Into<Value>,
        context: &ExecutionContext,
        options: SetOptions,
    ) -> Result<(), ParameterError> {
        self.slot(name)?.set(value, context, options)
    }

    /// # Errors
    ///
    /// `ParameterError::UnknownParameter`.
    pub fn get_previous(
        &self,
        name: &str,
        context: &ExecutionContext,
        index: usize,
    ) -> Result<Option<Value>, ParameterError> {
        Ok(self.slot(name)?.get_previous(context, index))
    }

    /// # Errors
    ///
    /// `UnknownParameter` or `DeltaMismatch`.
    pub fn get_delta(&self, name: &str, context: &ExecutionContext) -> Result<Value, ParameterError> {
        self.slot(name)?.get_delta(context)
    }

    /// # Errors
    ///
    /// `UnknownParameter` or `NoResetSource`.
    pub fn reset(&self, name: &str) -> Result<(), ParameterError> {
        self.slot(name)?.reset()
    }

    /// # Errors
    ///
    /// `ParameterError::UnknownParameter`.
    pub fn delete(&self, name: &str, context: &ExecutionContext) -> Result<(), ParameterError> {
        self.slot(name)?.delete(context);
        Ok(())
    }

    #[must_use]
    pub const fn defaults(&self) -> Defaults<'_> {
        Defaults::new(self)
    }

    /// Names of the user-facing slots, or of every slot if `show_all`.
    #[must_use]
    pub fn names(&self, show_all: bool) -> Vec<String> {
        self.slots()
            .into_iter()
            .filter(|slot| show_all || slot.user())
            .map(|slot| slot.name().to_string())
            .collect()
    }

    /// Default value of each user-facing slot, or of every slot if `show_all`.
    #[must_use]
    pub fn values(&self, show_all: bool) -> BTreeMap<String, Value> {
        self.slots()
            .into_iter()
            .filter(|slot| show_all || slot.user())
            .map(|slot| (slot.name().to_string(), slot.default_value()))
            .collect()
    }

    /// Multi-line listing of [`values`](Self::values), one `name = value`
    /// per line.
    #[must_use]
    pub fn show(&self, show_all: bool) -> String {
        let mut out = String::from("(\n");
        for (name, value) in self.values(show_all) {
            out.push_str(&format!("\t{name} = {value},\n"));
        }
        out.push(')');
        out
    }

    #[must_use]
    pub fn modulable_names(&self) -> Vec<String> {
        self.slots()
            .into_iter()
            .filter(|slot| slot.modulable())
            .map(|slot| slot.name().to_string())
            .collect()
    }

    /// Minimum history each slot needs retained, for slots that need any.
    #[must_use]
    pub fn required_history(&self) -> BTreeMap<String, usize> {
        self.slots()
            .into_iter()
            .filter(|slot| slot.history_min_length() > 0)
            .map(|slot| (slot.name().to_string(), slot.history_min_length()))
            .collect()
    }

    /// Adds a slot to a live schema. A name the parent already knows becomes
    /// an override of the parent's slot.
    ///
    /// # Errors
    ///
    /// `InvalidName`, `DuplicateParameter` if this schema already declared
    /// the name, `HistoryLength`, `InvalidValue`, or `AliasTargetMissing`.
    pub fn declare_parameter(&self, name: &str, attrs: ParameterAttrs) -> Result<Arc<Parameter>, ParameterError> {
        check_name(name)?;
        attrs.check(name, self.owner.name())?;
        if let Some(existing) = read_lock(&self.entries).get(name) {
            let is_shadow = matches!(existing, SchemaEntry::Parameter(slot) if slot.is_inherited());
            if !is_shadow {
                return Err(ParameterError::DuplicateParameter {
                    parameter: name.to_string(),
                    owner: self.owner.name().to_string(),
                });
            }
        }
        let aliases = attrs.aliases.clone();
        let slot = Arc::new(self.new_slot(name, attrs));
        slot.validate_value(&slot.default_value())?;
        write_lock(&self.entries).insert(name.to_string(), SchemaEntry::Parameter(Arc::clone(&slot)));
        for alias in aliases {
            self.declare_alias(&alias, name)?;
        }
        debug!(parameter = %name, owner = %self.owner.name(), "declared parameter");
        Ok(slot)
    }

    /// Adds an alias to a live schema.
    ///
    /// # Errors
    ///
    /// `InvalidName`, `DuplicateParameter` if a slot already has the name,
    /// or `AliasTargetMissing`.
    pub fn declare_alias(&self, name: &str, target: &str) -> Result<(), ParameterError> {
        check_name(name)?;
        let slot = self.resolve_entry(target).map(|e| Arc::clone(e.slot())).ok_or_else(|| {
            ParameterError::AliasTargetMissing {
                alias: name.to_string(),
                target: target.to_string(),
                owner: self.owner.name().to_string(),
            }
        })?;
        if matches!(self.resolve_entry(name), Some(SchemaEntry::Parameter(_))) {
            return Err(ParameterError::DuplicateParameter {
                parameter: name.to_string(),
                owner: self.owner.name().to_string(),
            });
        }
        slot.register_alias(name);
        write_lock(&self.entries).insert(name.to_string(), SchemaEntry::Alias(ParameterAlias::new(name, slot)));
        Ok(())
    }

    /// Seeds `context` from `base` in every slot. Returns the number of slots
    /// that copied a value.
    pub fn initialize_from_context(
        &self,
        context: &ExecutionContext,
        base: &ExecutionContext,
        override_existing: bool,
    ) -> usize {
        let copied = self
            .slots()
            .iter()
            .filter(|slot| slot.initialize_from_context(context, base, override_existing))
            .count();
        debug!(owner = %self.owner.name(), copied, "initialized context from base");
        copied
    }

    /// Removes all state under `context` from every slot.
    pub fn delete_context(&self, context: &ExecutionContext) {
        for slot in self.slots() {
            slot.delete(context);
        }
    }

    /// Removes state under `context` from every slot that does not retain
    /// simulation data. Returns the number of slots cleared.
    pub fn discard_context(&self, context: &ExecutionContext) -> usize {
        let mut cleared = 0;
        for slot in self.slots() {
            if !slot.retain_old_simulation_data() {
                slot.delete(context);
                cleared += 1;
            }
        }
        debug!(owner = %self.owner.name(), cleared, "discarded context");
        cleared
    }

    /// Empties the log under each of `contexts` in every slot.
    pub fn clear_log(&self, contexts: &[ExecutionContext]) {
        for slot in self.slots() {
            slot.clear_log(contexts);
        }
    }

    pub fn clear_all_logs(&self) {
        for slot in self.slots() {
            slot.clear_all_logs();
        }
    }

    /// Stored value of every slot under `context`. Slots without a value
    /// there are left out.
    #[must_use]
    pub fn snapshot(&self, context: &ExecutionContext) -> ContextSnapshot {
        let values = self
            .slots()
            .into_iter()
            .filter_map(|slot| slot.peek(context).map(|v| (slot.name().to_string(), v)))
            .collect();
        ContextSnapshot::new(self.owner.name(), context.execution_id().cloned(), values)
    }

    /// Copy of this schema for a duplicated owner. Slots keep their parents
    /// and attribute sources; per-context state is copied.
    pub(crate) fn duplicate(&self, owner_name: impl Into<String>) -> Arc<Self> {
        let owner = Arc::new(OwnerHandle::new(owner_name));
        let source = read_lock(&self.entries);
        let mut entries: BTreeMap<String, SchemaEntry> = source
            .iter()
            .filter_map(|(name, entry)| match entry {
                SchemaEntry::Parameter(slot) => Some((
                    name.clone(),
                    SchemaEntry::Parameter(Arc::new(
                        slot.duplicate(Arc::clone(&owner), Arc::clone(&self.hooks)),
                    )),
                )),
                SchemaEntry::Alias(_) => None,
            })
            .collect();
        for (name, entry) in source.iter() {
            if let SchemaEntry::Alias(alias) = entry {
                if let Some(SchemaEntry::Parameter(target)) = entries.get(alias.target_name()) {
                    let alias = ParameterAlias::new(name.clone(), Arc::clone(target));
                    entries.insert(name.clone(), SchemaEntry::Alias(alias));
                }
            }
        }
        Arc::new(Self {
            owner,
            parent: self.parent.clone(),
            hooks: Arc::clone(&self.hooks),
            entries: RwLock::new(entries),
        })
    }
}
