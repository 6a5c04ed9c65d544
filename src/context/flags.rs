//! Context flags: initialization status, execution phase, and call source
//! packed into one bitset.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

use serde::{Deserialize, Serialize};

/// Bitset identifying the initialization status, execution phase, and source
/// of call under which a parameter is accessed.
///
/// The three fields occupy disjoint bits. An [`ExecutionContext`] only ever
/// carries the phase and source fields; initialization flags describe the
/// owning component.
///
/// [`ExecutionContext`]: crate::ExecutionContext
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextFlags(u32);

/// Which field of [`ContextFlags`] to render in [`ContextFlags::describe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagField {
    ExecutionPhase,
    Source,
}

impl ContextFlags {
    pub const UNSET: Self = Self(0);

    // initialization status
    pub const DEFERRED_INIT: Self = Self(1 << 1);
    pub const INITIALIZING: Self = Self(1 << 2);
    pub const VALIDATING: Self = Self(1 << 3);
    pub const INITIALIZED: Self = Self(1 << 4);
    pub const REINITIALIZED: Self = Self(1 << 19);
    pub const UNINITIALIZED: Self = Self(1 << 16);

    // execution phase
    pub const PROCESSING: Self = Self(1 << 5);
    pub const LEARNING: Self = Self(1 << 6);
    pub const CONTROL: Self = Self(1 << 7);
    pub const SIMULATION: Self = Self(1 << 8);
    pub const IDLE: Self = Self(1 << 17);

    // source of call
    pub const COMMAND_LINE: Self = Self(1 << 9);
    pub const CONSTRUCTOR: Self = Self(1 << 10);
    pub const INSTANTIATE: Self = Self(1 << 11);
    pub const COMPONENT: Self = Self(1 << 12);
    pub const METHOD: Self = Self(1 << 13);
    pub const PROPERTY: Self = Self(1 << 14);
    pub const COMPOSITION: Self = Self(1 << 15);
    pub const NONE: Self = Self(1 << 18);

    pub const INITIALIZATION_MASK: Self = Self(
        Self::DEFERRED_INIT.0
            | Self::INITIALIZING.0
            | Self::VALIDATING.0
            | Self::INITIALIZED.0
            | Self::REINITIALIZED.0
            | Self::UNINITIALIZED.0,
    );
    pub const EXECUTING: Self =
        Self(Self::PROCESSING.0 | Self::LEARNING.0 | Self::CONTROL.0 | Self::SIMULATION.0);
    pub const EXECUTION_PHASE_MASK: Self = Self(Self::EXECUTING.0 | Self::IDLE.0);
    pub const SOURCE_MASK: Self = Self(
        Self::COMMAND_LINE.0
            | Self::CONSTRUCTOR.0
            | Self::INSTANTIATE.0
            | Self::COMPONENT.0
            | Self::METHOD.0
            | Self::PROPERTY.0
            | Self::COMPOSITION.0
            | Self::NONE.0,
    );
    pub const ALL_FLAGS: Self = Self(
        Self::INITIALIZATION_MASK.0 | Self::EXECUTION_PHASE_MASK.0 | Self::SOURCE_MASK.0,
    );

    /// Single execution-phase flags, in rendering order.
    pub const EXECUTION_PHASE_FLAGS: [Self; 5] = [
        Self::PROCESSING,
        Self::LEARNING,
        Self::CONTROL,
        Self::SIMULATION,
        Self::IDLE,
    ];

    /// Single source flags, in rendering order.
    pub const SOURCE_FLAGS: [Self; 8] = [
        Self::COMMAND_LINE,
        Self::CONSTRUCTOR,
        Self::INSTANTIATE,
        Self::COMPONENT,
        Self::METHOD,
        Self::PROPERTY,
        Self::COMPOSITION,
        Self::NONE,
    ];

    const NAMED: [(Self, &'static str); 19] = [
        (Self::DEFERRED_INIT, "DEFERRED_INIT"),
        (Self::INITIALIZING, "INITIALIZING"),
        (Self::VALIDATING, "VALIDATING"),
        (Self::INITIALIZED, "INITIALIZED"),
        (Self::REINITIALIZED, "REINITIALIZED"),
        (Self::UNINITIALIZED, "UNINITIALIZED"),
        (Self::PROCESSING, "PROCESSING"),
        (Self::LEARNING, "LEARNING"),
        (Self::CONTROL, "CONTROL"),
        (Self::SIMULATION, "SIMULATION"),
        (Self::IDLE, "IDLE"),
        (Self::COMMAND_LINE, "COMMAND_LINE"),
        (Self::CONSTRUCTOR, "CONSTRUCTOR"),
        (Self::INSTANTIATE, "INSTANTIATE"),
        (Self::COMPONENT, "COMPONENT"),
        (Self::METHOD, "METHOD"),
        (Self::PROPERTY, "PROPERTY"),
        (Self::COMPOSITION, "COMPOSITION"),
        (Self::NONE, "NONE"),
    ];

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Builds flags from raw bits, dropping bits that name no flag.
    #[must_use]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL_FLAGS.0)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set in `self`.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// True if exactly one bit is set.
    #[must_use]
    pub const fn is_single(self) -> bool {
        self.0 != 0 && self.0 & (self.0 - 1) == 0
    }

    /// Execution-phase field of these flags.
    #[must_use]
    pub const fn execution_phase(self) -> Self {
        Self(self.0 & Self::EXECUTION_PHASE_MASK.0)
    }

    /// Source field of these flags.
    #[must_use]
    pub const fn source(self) -> Self {
        Self(self.0 & Self::SOURCE_MASK.0)
    }

    /// True if `self` is a single execution-phase flag.
    #[must_use]
    pub fn is_execution_phase_flag(self) -> bool {
        Self::EXECUTION_PHASE_FLAGS.contains(&self)
    }

    /// True if `self` is a single source flag.
    #[must_use]
    pub fn is_source_flag(self) -> bool {
        Self::SOURCE_FLAGS.contains(&self)
    }

    /// Renders the names of the flags set in the requested fields.
    ///
    /// An empty execution-phase field renders as `IDLE` and an empty source
    /// field as `NONE`, so the label is never empty.
    #[must_use]
    pub fn describe(self, fields: &[FlagField]) -> String {
        if self == Self::ALL_FLAGS {
            return "ALL_FLAGS".to_string();
        }
        if self == Self::UNSET {
            return "UNSET".to_string();
        }

        let mut items: Vec<&'static str> = Vec::new();
        if fields.contains(&FlagField::ExecutionPhase) {
            if self.intersects(Self::EXECUTION_PHASE_MASK) {
                items.extend(Self::name_list(self, &Self::EXECUTION_PHASE_FLAGS));
            } else {
                items.push("IDLE");
            }
        }
        if fields.contains(&FlagField::Source) {
            if self.intersects(Self::SOURCE_MASK) {
                items.extend(Self::name_list(self, &Self::SOURCE_FLAGS));
            } else {
                items.push("NONE");
            }
        }
        items.join(", ")
    }

    /// Renders both the execution-phase and source fields.
    #[must_use]
    pub fn describe_all(self) -> String {
        self.describe(&[FlagField::ExecutionPhase, FlagField::Source])
    }

    fn name_list(flags: Self, candidates: &[Self]) -> Vec<&'static str> {
        candidates
            .iter()
            .filter(|c| flags.contains(**c))
            .filter_map(|c| Self::name_of(*c))
            .collect()
    }

    fn name_of(flag: Self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(f, _)| *f == flag)
            .map(|(_, name)| *name)
    }

    /// Parses a single flag name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_uppercase();
        Self::NAMED
            .iter()
            .find(|(_, n)| *n == wanted)
            .map(|(f, _)| *f)
    }
}

impl fmt::Display for ContextFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("UNSET");
        }
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join("|"))
    }
}

impl fmt::Debug for ContextFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextFlags({self})")
    }
}

impl BitOr for ContextFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ContextFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ContextFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for ContextFlags {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for ContextFlags {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & Self::ALL_FLAGS.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_are_disjoint() {
        assert!(!ContextFlags::INITIALIZATION_MASK.intersects(ContextFlags::EXECUTION_PHASE_MASK));
        assert!(!ContextFlags::INITIALIZATION_MASK.intersects(ContextFlags::SOURCE_MASK));
        assert!(!ContextFlags::EXECUTION_PHASE_MASK.intersects(ContextFlags::SOURCE_MASK));
    }

    #[test]
    fn test_describe_special_cases() {
        assert_eq!(ContextFlags::UNSET.describe_all(), "UNSET");
        assert_eq!(ContextFlags::ALL_FLAGS.describe_all(), "ALL_FLAGS");
        assert_eq!(ContextFlags::COMMAND_LINE.describe_all(), "IDLE, COMMAND_LINE");
        assert_eq!(ContextFlags::PROCESSING.describe_all(), "PROCESSING, NONE");
    }

    #[test]
    fn test_describe_single_field() {
        let flags = ContextFlags::CONTROL | ContextFlags::SIMULATION | ContextFlags::COMPOSITION;
        assert_eq!(flags.describe(&[FlagField::ExecutionPhase]), "CONTROL, SIMULATION");
        assert_eq!(flags.describe(&[FlagField::Source]), "COMPOSITION");
        assert_eq!(flags.describe_all(), "CONTROL, SIMULATION, COMPOSITION");
    }

    #[test]
    fn test_single_flag_detection() {
        assert!(ContextFlags::LEARNING.is_single());
        assert!(!(ContextFlags::LEARNING | ContextFlags::CONTROL).is_single());
        assert!(!ContextFlags::UNSET.is_single());
        assert!(ContextFlags::IDLE.is_execution_phase_flag());
        assert!(!ContextFlags::IDLE.is_source_flag());
        assert!(ContextFlags::NONE.is_source_flag());
    }

    #[test]
    fn test_not_stays_within_known_bits() {
        let inverted = !ContextFlags::PROCESSING;
        assert!(!inverted.contains(ContextFlags::PROCESSING));
        assert!(inverted.contains(ContextFlags::LEARNING));
        assert_eq!(inverted.bits() & !ContextFlags::ALL_FLAGS.bits(), 0);
    }

    #[test]
    fn test_from_name_roundtrips_display() {
        for flag in ContextFlags::SOURCE_FLAGS {
            assert_eq!(ContextFlags::from_name(&flag.to_string()), Some(flag));
        }
        assert_eq!(ContextFlags::from_name("processing"), Some(ContextFlags::PROCESSING));
        assert_eq!(ContextFlags::from_name("bogus"), None);
    }
}
