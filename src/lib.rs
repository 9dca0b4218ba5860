#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]
//! Adversarial robustness evaluation for neural network classifiers.
//!
//! The crate perturbs labelled batches with L∞-bounded attacks (FGSM, PGD),
//! scores clean and perturbed predictions, and persists the resulting runs so
//! repeated sweeps can be reduced into robustness curves.
extern crate ndarray;
extern crate ndarray_rand;
extern crate ndarray_stats;
extern crate num;
extern crate rand;

pub mod affine;
pub mod attack;
pub mod bounds;
pub mod config;
pub mod context;
pub mod dataset;
pub mod dnn;
pub mod error;
pub mod evaluate;
pub mod logging;
pub mod models;
pub mod oracle;
pub mod store;
pub mod sweep;
pub mod tensorshape;

#[cfg(test)]
mod test_util;

pub type NNVFloat = f64;

pub use crate::attack::{Attack, AttackConfig, AttackKind, AttackOverrides, Fgsm, Pgd};
pub use crate::context::{Device, ExecutionContext};
pub use crate::dataset::{Batch, InMemoryDataset, Sample};
pub use crate::error::{ConfigError, OracleError, ResourceError, RunError, StoreError};
pub use crate::evaluate::{evaluate, EvaluationResult};
pub use crate::models::{FileModelProvider, ModelId, ModelProvider, ModelSpec};
pub use crate::oracle::ModelOracle;
pub use crate::store::{
    InMemoryStore, JsonLinesStore, NewRunRecord, RecordId, ResultStore, RobustnessCurvePoint,
    RunRecord,
};
pub use crate::sweep::{Persistence, RunOutcome, RunReport, RunRequest, SweepOrchestrator};
