//! Execution contexts: the unit of isolation for parameter state.

use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ContextError;

use super::flags::{ContextFlags, FlagField};

const SEPARATOR_BAR: &str = " || ";

/// Opaque identifier of one run or simulation branch.
///
/// Integers, strings, and UUIDs are all accepted; they are normalized to
/// their string form so any of them can key the same maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Creates a new random execution ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Deterministic ID for a branch labelled `label` under `base`.
    ///
    /// The same base and label always produce the same ID, so a controller
    /// that re-runs the same candidate lands in the same simulation branch.
    #[must_use]
    pub fn derived(base: &Self, label: &str) -> Self {
        let namespace = Uuid::new_v5(&Uuid::NAMESPACE_OID, base.0.as_bytes());
        Self(Uuid::new_v5(&namespace, label.as_bytes()).to_string())
    }

    /// Borrows the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(v: &str) -> Self {
        Self(v.to_string())
    }
}

impl From<String> for ExecutionId {
    fn from(v: String) -> Self {
        Self(v)
    }
}

impl From<u64> for ExecutionId {
    fn from(v: u64) -> Self {
        Self(v.to_string())
    }
}

impl From<Uuid> for ExecutionId {
    fn from(v: Uuid) -> Self {
        Self(v.to_string())
    }
}

/// Logical timestamp of a scheduler: run, trial, pass, and time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ExecutionTime {
    pub run: Option<u64>,
    pub trial: Option<u64>,
    pub pass: Option<u64>,
    pub time_step: Option<u64>,
}

impl ExecutionTime {
    /// Creates a fully specified time.
    #[must_use]
    pub const fn new(run: u64, trial: u64, pass: u64, time_step: u64) -> Self {
        Self {
            run: Some(run),
            trial: Some(trial),
            pass: Some(pass),
            time_step: Some(time_step),
        }
    }

    /// True if no field is set.
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        self.run.is_none() && self.trial.is_none() && self.pass.is_none() && self.time_step.is_none()
    }
}

impl fmt::Display for ExecutionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |v: Option<u64>| v.map_or_else(|| "-".to_string(), |n| n.to_string());
        write!(
            f,
            "{}:{}:{}:{}",
            part(self.run),
            part(self.trial),
            part(self.pass),
            part(self.time_step)
        )
    }
}

/// A graph of components that executes them under its own execution IDs.
///
/// Contexts refer to their composition weakly; the composition's scheduler
/// may supply the clock used to timestamp log entries.
pub trait Composition: Send + Sync {
    /// Display name.
    fn name(&self) -> &str;

    /// Execution ID used when the composition itself is passed as a context.
    fn default_execution_id(&self) -> ExecutionId;

    /// Current scheduler time for `context`, if the composition keeps a clock.
    fn execution_time(&self, _context: &ExecutionContext) -> Option<ExecutionTime> {
        None
    }
}

/// Identifier plus metadata describing one run or simulation branch.
///
/// # Examples
///
/// ```
/// use paramscope::{ContextFlags, ExecutionContext};
///
/// let ctx = ExecutionContext::builder()
///     .execution_id("trial-run")
///     .execution_phase(ContextFlags::PROCESSING)
///     .source(ContextFlags::COMPOSITION)
///     .build()
///     .unwrap();
/// assert_eq!(ctx.describe(), "PROCESSING, COMPOSITION");
/// ```
#[derive(Clone)]
pub struct ExecutionContext {
    execution_id: Option<ExecutionId>,
    execution_phase: ContextFlags,
    source: ContextFlags,
    composition: Option<Weak<dyn Composition>>,
    execution_time: Option<ExecutionTime>,
    string: String,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", &self.execution_id)
            .field("execution_phase", &self.execution_phase)
            .field("source", &self.source)
            .field(
                "composition",
                &self.composition().map(|c| c.name().to_string()),
            )
            .field("execution_time", &self.execution_time)
            .finish_non_exhaustive()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            execution_id: None,
            execution_phase: ContextFlags::IDLE,
            source: ContextFlags::NONE,
            composition: None,
            execution_time: None,
            string: String::new(),
        }
    }
}

impl ExecutionContext {
    /// Idle context with no source under `execution_id`.
    #[must_use]
    pub fn new(execution_id: impl Into<ExecutionId>) -> Self {
        Self {
            execution_id: Some(execution_id.into()),
            ..Self::default()
        }
    }

    /// Context keyed by the null execution ID.
    #[must_use]
    pub fn null() -> Self {
        Self::default()
    }

    /// Starts building a context.
    #[must_use]
    pub fn builder() -> ExecutionContextBuilder {
        ExecutionContextBuilder::default()
    }

    #[must_use]
    pub const fn execution_id(&self) -> Option<&ExecutionId> {
        self.execution_id.as_ref()
    }

    pub fn set_execution_id(&mut self, execution_id: Option<ExecutionId>) {
        self.execution_id = execution_id;
    }

    #[must_use]
    pub const fn execution_phase(&self) -> ContextFlags {
        self.execution_phase
    }

    #[must_use]
    pub const fn source(&self) -> ContextFlags {
        self.source
    }

    /// Combined phase and source flags.
    #[must_use]
    pub const fn flags(&self) -> ContextFlags {
        self.execution_phase.union(self.source)
    }

    /// True while the simulation flag is set.
    #[must_use]
    pub const fn is_simulation(&self) -> bool {
        self.execution_phase.contains(ContextFlags::SIMULATION)
    }

    /// Validated execution-phase assignment.
    ///
    /// An empty flag means `IDLE`. At most one of `PROCESSING`, `LEARNING`,
    /// `CONTROL` may be set, optionally combined with `SIMULATION`.
    ///
    /// # Errors
    ///
    /// `ContextError` if `flag` carries non-phase bits or more than one
    /// mutually exclusive phase.
    pub fn set_execution_phase(&mut self, flag: ContextFlags) -> Result<(), ContextError> {
        self.execution_phase = validate_execution_phase(flag)?;
        Ok(())
    }

    /// Validated source assignment. An empty flag means `NONE`.
    ///
    /// # Errors
    ///
    /// `ContextError` if `flag` is not exactly one source flag.
    pub fn set_source(&mut self, flag: ContextFlags) -> Result<(), ContextError> {
        self.source = validate_source(flag)?;
        Ok(())
    }

    /// Splits `flags` into phase and source and assigns both.
    ///
    /// # Errors
    ///
    /// `ContextError` if either field is malformed; the context is left
    /// unchanged in that case.
    pub fn set_flags(&mut self, flags: ContextFlags) -> Result<(), ContextError> {
        let phase = validate_execution_phase(flags.execution_phase())?;
        let source = validate_source(flags.source())?;
        self.execution_phase = phase;
        self.source = source;
        Ok(())
    }

    /// Adds `flag` to whichever field it belongs to.
    ///
    /// # Errors
    ///
    /// `ContextError` if the result is malformed or `flag` mixes fields.
    pub fn add_flag(&mut self, flag: ContextFlags) -> Result<(), ContextError> {
        self.change_flags(&[flag], |attr, blank, flags| attr.difference(blank) | flags[0])
    }

    /// Removes `flag`; an emptied field falls back to `IDLE` or `NONE`.
    ///
    /// # Errors
    ///
    /// `ContextError` if `flag` mixes fields.
    pub fn remove_flag(&mut self, flag: ContextFlags) -> Result<(), ContextError> {
        self.change_flags(&[flag], |attr, blank, flags| {
            if attr.intersects(flags[0]) {
                let res = attr.difference(flags[0]);
                if res.is_empty() {
                    blank
                } else {
                    res
                }
            } else {
                attr
            }
        })
    }

    /// Replaces `old` with `new` within one field.
    ///
    /// # Errors
    ///
    /// `ContextError` if the flags span fields or the result is malformed.
    pub fn replace_flag(&mut self, old: ContextFlags, new: ContextFlags) -> Result<(), ContextError> {
        self.change_flags(&[old, new], |attr, _, flags| attr.difference(flags[0]) | flags[1])
    }

    fn change_flags(
        &mut self,
        flags: &[ContextFlags],
        operation: impl Fn(ContextFlags, ContextFlags, &[ContextFlags]) -> ContextFlags,
    ) -> Result<(), ContextError> {
        if flags.iter().all(|f| f.is_execution_phase_flag()) {
            let next = operation(self.execution_phase, ContextFlags::IDLE, flags);
            self.set_execution_phase(next)
        } else if flags.iter().all(|f| f.is_source_flag()) {
            let next = operation(self.source, ContextFlags::NONE, flags);
            self.set_source(next)
        } else {
            let combined = flags.iter().fold(ContextFlags::UNSET, |acc, f| acc | *f);
            Err(ContextError::MixedFlagFields { flags: combined })
        }
    }

    /// Human-readable label of the active flags. Never empty.
    #[must_use]
    pub fn describe(&self) -> String {
        self.flags().describe(&[FlagField::ExecutionPhase, FlagField::Source])
    }

    /// Composition this context runs under, if it is still alive.
    #[must_use]
    pub fn composition(&self) -> Option<Arc<dyn Composition>> {
        self.composition.as_ref().and_then(Weak::upgrade)
    }

    pub fn set_composition(&mut self, composition: Option<&Arc<dyn Composition>>) {
        self.composition = composition.map(Arc::downgrade);
    }

    /// Composition this context runs under.
    ///
    /// # Errors
    ///
    /// `ContextError::NoComposition` if there is none or it has been dropped.
    pub fn require_composition(&self, operation: &str) -> Result<Arc<dyn Composition>, ContextError> {
        self.composition().ok_or_else(|| ContextError::NoComposition {
            operation: operation.to_string(),
        })
    }

    #[must_use]
    pub const fn execution_time(&self) -> Option<ExecutionTime> {
        self.execution_time
    }

    pub fn set_execution_time(&mut self, time: Option<ExecutionTime>) {
        self.execution_time = time;
    }

    /// Refreshes the execution time from the composition's clock.
    ///
    /// # Errors
    ///
    /// `ContextError::NoComposition` if the context is not executing or has
    /// no composition.
    pub fn update_execution_time(&mut self) -> Result<(), ContextError> {
        if !self.execution_phase.intersects(ContextFlags::EXECUTING) {
            return Err(ContextError::NoComposition {
                operation: "update_execution_time while not executing".to_string(),
            });
        }
        let composition = self.require_composition("update_execution_time")?;
        self.execution_time = composition.execution_time(self);
        Ok(())
    }

    /// Time used to stamp log entries: the context's own time, else the
    /// composition's clock, else an empty time.
    #[must_use]
    pub fn log_time(&self) -> ExecutionTime {
        self.execution_time
            .or_else(|| self.composition().and_then(|c| c.execution_time(self)))
            .unwrap_or_default()
    }

    /// Free-form message attached to the context.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.string
    }

    /// Appends `message` to the context message.
    pub fn add_to_string(&mut self, message: &str) {
        if self.string.is_empty() {
            self.string = message.to_string();
        } else {
            self.string = format!("{}{SEPARATOR_BAR}{message}", self.string);
        }
    }

    /// New context for a simulation branch seeded from this one.
    ///
    /// The branch keeps the composition and time, gains the `SIMULATION`
    /// phase flag, and is keyed by `execution_id`.
    #[must_use]
    pub fn fork(&self, execution_id: impl Into<ExecutionId>) -> Self {
        let mut branch = self.clone();
        branch.execution_id = Some(execution_id.into());
        branch.execution_phase = if branch.execution_phase == ContextFlags::IDLE {
            ContextFlags::SIMULATION
        } else {
            branch.execution_phase | ContextFlags::SIMULATION
        };
        branch
    }
}

fn validate_execution_phase(flag: ContextFlags) -> Result<ContextFlags, ContextError> {
    if flag.is_empty() {
        return Ok(ContextFlags::IDLE);
    }
    if flag.intersects(!ContextFlags::EXECUTION_PHASE_MASK) {
        return Err(ContextError::NotAnExecutionPhase { flag });
    }
    let without_simulation = flag.difference(ContextFlags::SIMULATION);
    let accepted = flag.is_execution_phase_flag()
        || (flag.contains(ContextFlags::SIMULATION)
            && (without_simulation == ContextFlags::PROCESSING
                || without_simulation == ContextFlags::LEARNING
                || without_simulation == ContextFlags::CONTROL));
    if accepted {
        Ok(flag)
    } else {
        Err(ContextError::MultipleExecutionPhases { flag })
    }
}

fn validate_source(flag: ContextFlags) -> Result<ContextFlags, ContextError> {
    if flag.is_empty() {
        return Ok(ContextFlags::NONE);
    }
    if flag.is_source_flag() {
        return Ok(flag);
    }
    if !flag.intersects(ContextFlags::SOURCE_MASK) || flag.intersects(!ContextFlags::SOURCE_MASK) {
        return Err(ContextError::NotASource { flag });
    }
    Err(ContextError::MultipleSources { flag })
}

/// Builder for [`ExecutionContext`]; malformed flag combinations are rejected
/// by [`build`](Self::build).
#[derive(Default)]
pub struct ExecutionContextBuilder {
    execution_id: Option<ExecutionId>,
    execution_phase: Option<ContextFlags>,
    source: Option<ContextFlags>,
    flags: Option<ContextFlags>,
    composition: Option<Weak<dyn Composition>>,
    execution_time: Option<ExecutionTime>,
    string: String,
}

impl ExecutionContextBuilder {
    #[must_use]
    pub fn execution_id(mut self, id: impl Into<ExecutionId>) -> Self {
        self.execution_id = Some(id.into());
        self
    }

    #[must_use]
    pub const fn execution_phase(mut self, flag: ContextFlags) -> Self {
        self.execution_phase = Some(flag);
        self
    }

    #[must_use]
    pub const fn source(mut self, flag: ContextFlags) -> Self {
        self.source = Some(flag);
        self
    }

    /// Combined flags; must agree with any explicit phase or source.
    #[must_use]
    pub const fn flags(mut self, flags: ContextFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    #[must_use]
    pub fn composition(mut self, composition: &Arc<dyn Composition>) -> Self {
        self.composition = Some(Arc::downgrade(composition));
        self
    }

    #[must_use]
    pub const fn execution_time(mut self, time: ExecutionTime) -> Self {
        self.execution_time = Some(time);
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.string = message.into();
        self
    }

    /// Validates and builds the context.
    ///
    /// # Errors
    ///
    /// `ContextError` for malformed phase or source flags, or when `flags`
    /// conflicts with an explicit phase or source.
    pub fn build(self) -> Result<ExecutionContext, ContextError> {
        let mut phase = self.execution_phase;
        let mut source = self.source;

        if let Some(flags) = self.flags {
            let flag_phase = flags.execution_phase();
            let flag_source = flags.source();
            match phase {
                Some(p) if !flag_phase.is_empty() && !flag_phase.intersects(p) => {
                    return Err(ContextError::ConflictingFlags {
                        field: "execution_phase",
                        flags: flag_phase.describe(&[FlagField::ExecutionPhase]),
                        value: p.describe(&[FlagField::ExecutionPhase]),
                    });
                }
                Some(_) => {}
                None => phase = Some(flag_phase),
            }
            match source {
                Some(s) if !flag_source.is_empty() && !flag_source.intersects(s) => {
                    return Err(ContextError::ConflictingFlags {
                        field: "source",
                        flags: flag_source.describe(&[FlagField::Source]),
                        value: s.describe(&[FlagField::Source]),
                    });
                }
                Some(_) => {}
                None => source = Some(flag_source),
            }
        }

        Ok(ExecutionContext {
            execution_id: self.execution_id,
            execution_phase: validate_execution_phase(phase.unwrap_or(ContextFlags::IDLE))?,
            source: validate_source(source.unwrap_or(ContextFlags::NONE))?,
            composition: self.composition,
            execution_time: self.execution_time,
            string: self.string,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Clocked {
        time: ExecutionTime,
    }

    impl Composition for Clocked {
        fn name(&self) -> &str {
            "clocked"
        }

        fn default_execution_id(&self) -> ExecutionId {
            ExecutionId::from("clocked-default")
        }

        fn execution_time(&self, _context: &ExecutionContext) -> Option<ExecutionTime> {
            Some(self.time)
        }
    }

    #[test]
    fn test_default_context_is_idle_with_no_source() {
        let ctx = ExecutionContext::default();
        assert_eq!(ctx.execution_phase(), ContextFlags::IDLE);
        assert_eq!(ctx.source(), ContextFlags::NONE);
        assert_eq!(ctx.describe(), "IDLE, NONE");
        assert!(ctx.execution_id().is_none());
    }

    #[test]
    fn test_execution_phase_accepts_simulation_with_one_phase() {
        let mut ctx = ExecutionContext::new("a");
        ctx.set_execution_phase(ContextFlags::CONTROL | ContextFlags::SIMULATION)
            .unwrap();
        assert!(ctx.is_simulation());
        ctx.set_execution_phase(ContextFlags::SIMULATION).unwrap();
        ctx.set_execution_phase(ContextFlags::UNSET).unwrap();
        assert_eq!(ctx.execution_phase(), ContextFlags::IDLE);
    }

    #[test]
    fn test_execution_phase_rejects_multiple_phases_and_wrong_field() {
        let mut ctx = ExecutionContext::new("a");
        let err = ctx
            .set_execution_phase(ContextFlags::PROCESSING | ContextFlags::LEARNING)
            .unwrap_err();
        assert!(matches!(err, ContextError::MultipleExecutionPhases { .. }));

        let err = ctx.set_execution_phase(ContextFlags::COMMAND_LINE).unwrap_err();
        assert!(matches!(err, ContextError::NotAnExecutionPhase { .. }));

        let err = ctx
            .set_execution_phase(ContextFlags::IDLE | ContextFlags::SIMULATION)
            .unwrap_err();
        assert!(matches!(err, ContextError::MultipleExecutionPhases { .. }));
        assert_eq!(ctx.execution_phase(), ContextFlags::IDLE);
    }

    #[test]
    fn test_source_requires_exactly_one_flag() {
        let mut ctx = ExecutionContext::new("a");
        ctx.set_source(ContextFlags::METHOD).unwrap();
        assert_eq!(ctx.source(), ContextFlags::METHOD);

        let err = ctx
            .set_source(ContextFlags::METHOD | ContextFlags::PROPERTY)
            .unwrap_err();
        assert!(matches!(err, ContextError::MultipleSources { .. }));

        let err = ctx.set_source(ContextFlags::PROCESSING).unwrap_err();
        assert!(matches!(err, ContextError::NotASource { .. }));

        ctx.set_source(ContextFlags::UNSET).unwrap();
        assert_eq!(ctx.source(), ContextFlags::NONE);
    }

    #[test]
    fn test_add_remove_replace_flags() {
        let mut ctx = ExecutionContext::new("a");
        ctx.add_flag(ContextFlags::PROCESSING).unwrap();
        assert_eq!(ctx.execution_phase(), ContextFlags::PROCESSING);
        ctx.add_flag(ContextFlags::SIMULATION).unwrap();
        assert_eq!(
            ctx.execution_phase(),
            ContextFlags::PROCESSING | ContextFlags::SIMULATION
        );
        ctx.remove_flag(ContextFlags::SIMULATION).unwrap();
        ctx.remove_flag(ContextFlags::PROCESSING).unwrap();
        assert_eq!(ctx.execution_phase(), ContextFlags::IDLE);

        ctx.add_flag(ContextFlags::COMMAND_LINE).unwrap();
        ctx.replace_flag(ContextFlags::COMMAND_LINE, ContextFlags::COMPOSITION)
            .unwrap();
        assert_eq!(ctx.source(), ContextFlags::COMPOSITION);

        let err = ctx
            .replace_flag(ContextFlags::COMPOSITION, ContextFlags::LEARNING)
            .unwrap_err();
        assert!(matches!(err, ContextError::MixedFlagFields { .. }));
    }

    #[test]
    fn test_builder_rejects_conflicting_flags() {
        let err = ExecutionContext::builder()
            .flags(ContextFlags::PROCESSING | ContextFlags::COMMAND_LINE)
            .execution_phase(ContextFlags::LEARNING)
            .build()
            .unwrap_err();
        assert!(matches!(err, ContextError::ConflictingFlags { field: "execution_phase", .. }));

        let ctx = ExecutionContext::builder()
            .flags(ContextFlags::PROCESSING | ContextFlags::COMMAND_LINE)
            .build()
            .unwrap();
        assert_eq!(ctx.execution_phase(), ContextFlags::PROCESSING);
        assert_eq!(ctx.source(), ContextFlags::COMMAND_LINE);
    }

    #[test]
    fn test_composition_is_weak() {
        let comp: Arc<dyn Composition> = Arc::new(Clocked {
            time: ExecutionTime::new(1, 2, 0, 3),
        });
        let mut ctx = ExecutionContext::builder()
            .execution_id("a")
            .execution_phase(ContextFlags::PROCESSING)
            .composition(&comp)
            .build()
            .unwrap();
        assert_eq!(ctx.log_time(), ExecutionTime::new(1, 2, 0, 3));
        ctx.update_execution_time().unwrap();
        assert_eq!(ctx.execution_time(), Some(ExecutionTime::new(1, 2, 0, 3)));

        drop(comp);
        assert!(ctx.composition().is_none());
        assert!(ctx.require_composition("schedule").is_err());
    }

    #[test]
    fn test_fork_adds_simulation_and_new_id() {
        let base = ExecutionContext::builder()
            .execution_id("base")
            .execution_phase(ContextFlags::CONTROL)
            .build()
            .unwrap();
        let branch = base.fork(ExecutionId::derived(base.execution_id().unwrap(), "candidate-0"));
        assert!(branch.is_simulation());
        assert_eq!(branch.execution_phase().difference(ContextFlags::SIMULATION), ContextFlags::CONTROL);
        assert_ne!(branch.execution_id(), base.execution_id());

        let again = ExecutionId::derived(base.execution_id().unwrap(), "candidate-0");
        assert_eq!(branch.execution_id(), Some(&again));
    }

    #[test]
    fn test_add_to_string_uses_separator() {
        let mut ctx = ExecutionContext::new(7u64);
        ctx.add_to_string("first");
        ctx.add_to_string("second");
        assert_eq!(ctx.message(), "first || second");
        assert_eq!(ctx.execution_id().map(ExecutionId::as_str), Some("7"));
    }
}
