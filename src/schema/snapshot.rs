//! Point-in-time export of one context's parameter values.

use std::collections::BTreeMap;

use blake3::Hasher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ExecutionId;
use crate::error::StoreError;
use crate::value::Value;

/// Every stored value of one owner under one execution ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub owner: String,
    pub execution_id: Option<ExecutionId>,
    pub values: BTreeMap<String, Value>,
    pub taken_at: DateTime<Utc>,
}

impl ContextSnapshot {
    #[must_use]
    pub fn new(
        owner: impl Into<String>,
        execution_id: Option<ExecutionId>,
        values: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            owner: owner.into(),
            execution_id,
            values,
            taken_at: Utc::now(),
        }
    }

    /// Hex BLAKE3 digest of owner, execution ID, and values.
    ///
    /// Two snapshots with equal content have equal digests regardless of
    /// when they were taken.
    ///
    /// # Errors
    ///
    /// `StoreError::Serialization` if a value cannot be encoded.
    pub fn digest(&self) -> Result<String, StoreError> {
        let content = serde_json::to_vec(&(&self.owner, &self.execution_id, &self.values))
            .map_err(|e| StoreError::serialization(format!("encode snapshot: {e}")))?;
        let mut h = Hasher::new();
        h.update(&content);
        Ok(h.finalize().to_hex().to_string())
    }

    /// # Errors
    ///
    /// `StoreError::Serialization` if a value cannot be encoded.
    pub fn to_json_pretty(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::serialization(format!("serialize snapshot: {e}")))
    }

    /// # Errors
    ///
    /// `StoreError::Serialization` if `s` is not a valid snapshot.
    pub fn from_json(s: &str) -> Result<Self, StoreError> {
        serde_json::from_str(s).map_err(|e| StoreError::serialization(format!("deserialize snapshot: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ContextSnapshot {
        let mut values = BTreeMap::new();
        values.insert("rate".to_string(), Value::Float(0.5));
        values.insert("weights".to_string(), Value::Array(vec![1.0, -1.0]));
        ContextSnapshot::new("lca-1", Some(ExecutionId::from("A")), values)
    }

    #[test]
    fn test_json_roundtrip_works() {
        let snap = sample();
        let json = snap.to_json_pretty().unwrap();
        assert_eq!(ContextSnapshot::from_json(&json).unwrap(), snap);
        assert!(ContextSnapshot::from_json("{").is_err());
    }

    #[test]
    fn test_digest_ignores_timestamp() {
        let a = sample();
        let mut b = sample();
        b.taken_at = a.taken_at + chrono::Duration::seconds(30);
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_eq!(a.digest().unwrap().len(), 64);

        b.values.insert("rate".to_string(), Value::Float(0.6));
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
    }
}
