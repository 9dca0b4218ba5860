//! Append-only persistence of completed runs and the robustness-curve
//! reduction over them.
mod curve;
mod jsonl;
mod memory;

pub use curve::{aggregate_curve, RobustnessCurvePoint};
pub use jsonl::JsonLinesStore;
pub use memory::InMemoryStore;

use crate::error::StoreError;
use crate::NNVFloat;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Fields a record must carry before it is accepted.
pub const REQUIRED_FIELDS: [&str; 7] = [
    "model_name",
    "attack",
    "epsilon",
    "clean_accuracy",
    "robust_accuracy",
    "attack_success_rate",
    "total_samples",
];

/// Store-assigned surrogate key, monotonic from 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A run result as submitted, before the store stamps it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NewRunRecord {
    pub model_name: String,
    pub attack: String,
    pub epsilon: NNVFloat,
    pub clean_accuracy: NNVFloat,
    pub robust_accuracy: NNVFloat,
    pub attack_success_rate: NNVFloat,
    pub total_samples: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<NNVFloat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iters: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewRunRecord {
    /// Parses a loosely typed record, listing every absent required field at
    /// once.
    ///
    /// # Errors
    /// [`StoreError::MissingFields`] if any of [`REQUIRED_FIELDS`] is absent,
    /// [`StoreError::InvalidRecord`] if a field has the wrong type or fails
    /// [`NewRunRecord::validate`].
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        let object = value
            .as_object()
            .ok_or_else(|| StoreError::InvalidRecord("expected a JSON object".to_string()))?;
        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| !object.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::MissingFields(missing));
        }
        let record: Self =
            serde_json::from_value(value).map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
        record.validate()?;
        Ok(record)
    }

    /// # Errors
    /// Empty identifiers, or a negative or non-finite epsilon or metric.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.model_name.is_empty() {
            return Err(StoreError::InvalidRecord("model_name is empty".to_string()));
        }
        if self.attack.is_empty() {
            return Err(StoreError::InvalidRecord("attack is empty".to_string()));
        }
        let metrics = [
            ("epsilon", self.epsilon),
            ("clean_accuracy", self.clean_accuracy),
            ("robust_accuracy", self.robust_accuracy),
            ("attack_success_rate", self.attack_success_rate),
        ];
        for (name, value) in metrics {
            if !value.is_finite() || value < 0. {
                return Err(StoreError::InvalidRecord(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// A persisted run. Never mutated after the store creates it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RunRecord {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub record: NewRunRecord,
}

impl RunRecord {
    /// Newest first: descending timestamp, then descending id.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id))
    }
}

/// Single writer, many readers. Every query returns records newest-first.
pub trait ResultStore {
    /// Validates, stamps and appends `record`.
    ///
    /// # Errors
    /// Validation or write failure; nothing is stored in either case.
    fn save(&mut self, record: NewRunRecord) -> Result<RecordId, StoreError>;

    /// # Errors
    /// Read failure of the backing medium.
    fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError>;

    /// # Errors
    /// Read failure of the backing medium.
    fn by_model(&self, model_name: &str) -> Result<Vec<RunRecord>, StoreError>;

    /// Records for one (model, attack) pair, optionally restricted to an
    /// exactly equal epsilon.
    ///
    /// # Errors
    /// Read failure of the backing medium.
    fn by_attack(
        &self,
        model_name: &str,
        attack: &str,
        epsilon: Option<NNVFloat>,
    ) -> Result<Vec<RunRecord>, StoreError>;

    /// One point per distinct epsilon, ascending. Recomputed on every call.
    ///
    /// # Errors
    /// Read failure of the backing medium.
    fn robustness_curve(
        &self,
        model_name: &str,
        attack: &str,
    ) -> Result<Vec<RobustnessCurvePoint>, StoreError> {
        Ok(aggregate_curve(&self.by_attack(model_name, attack, None)?))
    }
}
