//! Audit-log types: which writes are recorded, and what a record holds.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{ContextFlags, ExecutionTime};
use crate::error::ParameterError;
use crate::value::Value;

/// Predicate over context flags deciding whether a write is logged.
///
/// Conditions share bit positions with [`ContextFlags`], so a condition is
/// satisfied when it intersects the flags of the writing context.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogCondition(u32);

impl LogCondition {
    pub const OFF: Self = Self(0);
    pub const INITIALIZATION: Self = Self(ContextFlags::INITIALIZING.bits());
    pub const VALIDATION: Self = Self(ContextFlags::VALIDATING.bits());
    pub const EXECUTION: Self = Self(ContextFlags::EXECUTING.bits());
    pub const PROCESSING: Self = Self(ContextFlags::PROCESSING.bits());
    pub const LEARNING: Self = Self(ContextFlags::LEARNING.bits());
    pub const CONTROL: Self = Self(ContextFlags::CONTROL.bits());
    pub const SIMULATION: Self = Self(ContextFlags::SIMULATION.bits());
    pub const ALL_ASSIGNMENTS: Self =
        Self(Self::INITIALIZATION.0 | Self::VALIDATION.0 | Self::EXECUTION.0);

    const NAMED: [(Self, &'static str); 7] = [
        (Self::INITIALIZATION, "INITIALIZATION"),
        (Self::VALIDATION, "VALIDATION"),
        (Self::PROCESSING, "PROCESSING"),
        (Self::LEARNING, "LEARNING"),
        (Self::CONTROL, "CONTROL"),
        (Self::SIMULATION, "SIMULATION"),
        (Self::EXECUTION, "EXECUTION"),
    ];

    #[must_use]
    pub const fn is_off(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if a write under `flags` satisfies this condition.
    #[must_use]
    pub const fn is_satisfied_by(self, flags: ContextFlags) -> bool {
        self.0 & flags.bits() != 0
    }
}

impl BitOr for LogCondition {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl From<bool> for LogCondition {
    fn from(v: bool) -> Self {
        if v {
            Self::ALL_ASSIGNMENTS
        } else {
            Self::OFF
        }
    }
}

impl FromStr for LogCondition {
    type Err = ParameterError;

    /// Parses `OFF`, `ALL_ASSIGNMENTS`, or names joined with `|`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = Self::OFF;
        for part in s.split('|') {
            let name = part.trim().to_ascii_uppercase();
            let flag = match name.as_str() {
                "OFF" => Self::OFF,
                "ALL_ASSIGNMENTS" => Self::ALL_ASSIGNMENTS,
                other => Self::NAMED
                    .iter()
                    .find(|(_, n)| *n == other)
                    .map(|(c, _)| *c)
                    .ok_or_else(|| ParameterError::InvalidLogCondition {
                        value: s.to_string(),
                    })?,
            };
            out = out | flag;
        }
        Ok(out)
    }
}

impl TryFrom<String> for LogCondition {
    type Error = ParameterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LogCondition> for String {
    fn from(v: LogCondition) -> Self {
        v.to_string()
    }
}

impl fmt::Display for LogCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_off() {
            return f.write_str("OFF");
        }
        if *self == Self::ALL_ASSIGNMENTS {
            return f.write_str("ALL_ASSIGNMENTS");
        }
        let mut remaining = *self;
        let mut names = Vec::new();
        if remaining.contains(Self::EXECUTION) {
            names.push("EXECUTION");
            remaining = Self(remaining.0 & !Self::EXECUTION.0);
        }
        for (flag, name) in Self::NAMED {
            if flag != Self::EXECUTION && remaining.contains(flag) {
                names.push(name);
            }
        }
        f.write_str(&names.join("|"))
    }
}

impl fmt::Debug for LogCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogCondition({self})")
    }
}

/// One recorded write: scheduler time, context label, and stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: ExecutionTime,
    pub context: String,
    pub value: Value,
    pub recorded_at: DateTime<Utc>,
}

impl LogEntry {
    #[must_use]
    pub fn new(time: ExecutionTime, context: impl Into<String>, value: Value) -> Self {
        Self {
            time,
            context: context.into(),
            value,
            recorded_at: Utc::now(),
        }
    }

    /// `(timestamp, context-label, value)` view used by reporting code.
    #[must_use]
    pub fn as_tuple(&self) -> (ExecutionTime, &str, &Value) {
        (self.time, &self.context, &self.value)
    }
}
