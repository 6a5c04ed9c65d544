//! Store-wide defaults applied to parameters declared without explicit
//! attributes.

use serde::{Deserialize, Serialize};

use crate::error::{ParameterError, StoreError};
use crate::parameter::{LogCondition, ParameterAttrs};
use crate::value::Value;

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// History retained per context for new parameters.
    pub history_max_length: usize,
    /// History a new parameter requires the scheduler to keep.
    pub history_min_length: usize,
    /// Return the default when a context has no value.
    pub fallback_default: bool,
    /// Log condition for new parameters.
    pub log_condition: LogCondition,
    /// Maximum log entries per context; unbounded if `None`.
    pub log_capacity: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_max_length: 1,
            history_min_length: 0,
            fallback_default: false,
            log_condition: LogCondition::OFF,
            log_capacity: None,
        }
    }
}

impl StoreConfig {
    /// # Errors
    ///
    /// `ParameterError::InvalidConfig` if the history bounds are inverted or
    /// the log capacity is zero.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.history_max_length < self.history_min_length {
            return Err(ParameterError::InvalidConfig {
                reason: format!(
                    "history_max_length ({}) is below history_min_length ({})",
                    self.history_max_length, self.history_min_length
                ),
            });
        }
        if self.log_capacity == Some(0) {
            return Err(ParameterError::InvalidConfig {
                reason: "log_capacity must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Attributes for a parameter with `default` and otherwise this
    /// configuration's settings.
    #[must_use]
    pub fn attrs_for(&self, default: impl Into<Value>) -> ParameterAttrs {
        ParameterAttrs::new(default)
            .history_max_length(self.history_max_length)
            .history_min_length(self.history_min_length)
            .fallback_default(self.fallback_default)
            .log_condition(self.log_condition)
            .log_capacity(self.log_capacity)
    }

    /// Parses and validates a JSON configuration. Missing fields take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// `StoreError::Serialization` for malformed JSON, or
    /// `StoreError::Parameter` if validation fails.
    pub fn from_json(s: &str) -> Result<Self, StoreError> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| StoreError::serialization(format!("parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// `StoreError::Serialization` if encoding fails.
    pub fn to_json_pretty(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(self).map_err(|e| StoreError::serialization(format!("serialize config: {e}")))
    }
}
