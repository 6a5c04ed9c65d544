//! Attribute-style view of a schema's default values.

use std::collections::BTreeMap;

use crate::error::ParameterError;
use crate::value::Value;

use super::ParameterSchema;

/// Reads and writes defaults by name. Writes go through the same parsing and
/// validation as any default change and make the slot own its attributes.
#[derive(Debug, Clone, Copy)]
pub struct Defaults<'a> {
    schema: &'a ParameterSchema,
}

impl<'a> Defaults<'a> {
    pub(crate) const fn new(schema: &'a ParameterSchema) -> Self {
        Self { schema }
    }

    /// # Errors
    ///
    /// `ParameterError::UnknownParameter` if no slot or alias has that name.
    pub fn get(&self, name: &str) -> Result<Value, ParameterError> {
        Ok(self.schema.slot(name)?.default_value())
    }

    /// # Errors
    ///
    /// `ParameterError::UnknownParameter`, or `InvalidValue` if the parsed
    /// value fails validation.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), ParameterError> {
        self.schema.slot(name)?.set_default_value(value)
    }

    /// Applies each override in turn, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// The first failing [`set`](Self::set).
    pub fn apply<I, K, V>(&self, overrides: I) -> Result<(), ParameterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in overrides {
            self.set(name.as_ref(), value)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn values(&self, show_all: bool) -> BTreeMap<String, Value> {
        self.schema.values(show_all)
    }

    #[must_use]
    pub fn names(&self, show_all: bool) -> Vec<String> {
        self.schema.names(show_all)
    }
}
