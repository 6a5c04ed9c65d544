//! Per-parameter validation and parsing hooks, looked up by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// Checks a candidate default. `Err` carries the reason it was rejected.
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Normalizes a value before it is validated or stored.
pub type Parser = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Wraps a boolean predicate as a validator.
///
/// A `false` result is reported as `"<label> returned False"`.
pub fn validator_from_predicate<F>(label: impl Into<String>, predicate: F) -> Validator
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    let label = label.into();
    Arc::new(move |value: &Value| {
        if predicate(value) {
            Ok(())
        } else {
            Err(format!("{label} returned False"))
        }
    })
}

/// Validators and parsers registered on one schema, falling back to the
/// parent schema's table for names it does not define.
#[derive(Clone, Default)]
pub struct HookTable {
    validators: HashMap<String, Validator>,
    parsers: HashMap<String, Parser>,
    parent: Option<Arc<HookTable>>,
}

impl fmt::Debug for HookTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut validators: Vec<_> = self.validators.keys().collect();
        validators.sort();
        let mut parsers: Vec<_> = self.parsers.keys().collect();
        parsers.sort();
        f.debug_struct("HookTable")
            .field("validators", &validators)
            .field("parsers", &parsers)
            .field("parent", &self.parent)
            .finish()
    }
}

impl HookTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_validator(&mut self, parameter: impl Into<String>, validator: Validator) {
        self.validators.insert(parameter.into(), validator);
    }

    pub fn insert_parser(&mut self, parameter: impl Into<String>, parser: Parser) {
        self.parsers.insert(parameter.into(), parser);
    }

    pub(crate) fn with_parent(mut self, parent: Option<Arc<Self>>) -> Self {
        self.parent = parent;
        self
    }

    /// Closest validator registered for `parameter`.
    #[must_use]
    pub fn validator(&self, parameter: &str) -> Option<&Validator> {
        self.validators
            .get(parameter)
            .or_else(|| self.parent.as_deref().and_then(|p| p.validator(parameter)))
    }

    /// Closest parser registered for `parameter`.
    #[must_use]
    pub fn parser(&self, parameter: &str) -> Option<&Parser> {
        self.parsers
            .get(parameter)
            .or_else(|| self.parent.as_deref().and_then(|p| p.parser(parameter)))
    }

    /// Runs the validator for `parameter`, if any.
    ///
    /// # Errors
    ///
    /// The validator's rejection reason.
    pub fn validate(&self, parameter: &str, value: &Value) -> Result<(), String> {
        self.validator(parameter).map_or(Ok(()), |v| v(value))
    }

    /// Runs the parser for `parameter`, or returns `value` unchanged.
    #[must_use]
    pub fn parse(&self, parameter: &str, value: Value) -> Value {
        match self.parser(parameter) {
            Some(parser) => parser(value),
            None => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_negative() -> Validator {
        validator_from_predicate("non_negative", |v| v.as_float().map_or(false, |x| x >= 0.0))
    }

    #[test]
    fn test_predicate_failure_message() {
        let v = non_negative();
        assert!(v(&Value::Float(1.0)).is_ok());
        assert_eq!(v(&Value::Float(-1.0)).unwrap_err(), "non_negative returned False");
    }

    #[test]
    fn test_lookup_falls_back_to_parent() {
        let mut parent = HookTable::new();
        parent.insert_validator("leak", non_negative());
        parent.insert_parser("leak", Arc::new(|v: Value| match v {
            #[allow(clippy::cast_precision_loss)]
            Value::Int(i) => Value::Float(i as f64),
            other => other,
        }));

        let child = HookTable::new().with_parent(Some(Arc::new(parent)));
        assert!(child.validate("leak", &Value::Float(-0.5)).is_err());
        assert!(child.validate("rate", &Value::Float(-0.5)).is_ok());
        assert_eq!(child.parse("leak", Value::Int(2)), Value::Float(2.0));
        assert_eq!(child.parse("rate", Value::Int(2)), Value::Int(2));
    }

    #[test]
    fn test_child_hook_shadows_parent() {
        let mut parent = HookTable::new();
        parent.insert_validator("leak", non_negative());
        let mut child = HookTable::new().with_parent(Some(Arc::new(parent)));
        child.insert_validator("leak", Arc::new(|_: &Value| Ok(())));
        assert!(child.validate("leak", &Value::Float(-0.5)).is_ok());
    }
}
