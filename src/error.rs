//! Error taxonomy. Each fallible layer has its own type so callers can tell a
//! failed evaluation apart from a failed write of an otherwise valid result.
use crate::tensorshape::TensorShape;
use std::path::PathBuf;
use thiserror::Error;

/// Rejected before any computation starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown model `{name}`, supported models: {supported}")]
    UnknownModel { name: String, supported: String },
    #[error("unknown attack `{name}`, supported attacks: fgsm, pgd")]
    UnknownAttack { name: String },
    #[error("epsilon must be > 0 and <= {max}, got {value}")]
    Epsilon { value: f64, max: f64 },
    #[error("alpha must be > 0, got {value}")]
    Alpha { value: f64 },
    #[error("iters must be >= 1 and <= {max}, got {value}")]
    Iters { value: usize, max: usize },
    #[error("batch_size must be >= 1 and <= {max}, got {value}")]
    BatchSize { value: usize, max: usize },
    #[error("num_samples must be >= 1 and <= {max}, got {value}")]
    NumSamples { value: usize, max: usize },
    #[error("invalid settings: {0}")]
    Settings(String),
}

/// A resource the run depends on could not be produced.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("model weights not found: {}", path.display())]
    ModelNotFound { path: PathBuf },
    #[error("dataset not found: {}", path.display())]
    DatasetNotFound { path: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("sample {index} in {} has shape {found}, expected {expected}", path.display())]
    SampleShape {
        path: PathBuf,
        index: usize,
        found: TensorShape,
        expected: TensorShape,
    },
    #[error("sample {index} in {} has label {label}, expected fewer than {num_classes}", path.display())]
    LabelOutOfRange {
        path: PathBuf,
        index: usize,
        label: usize,
        num_classes: usize,
    },
    #[error("dataset {} is empty", path.display())]
    EmptyDataset { path: PathBuf },
    #[error("model {} is unusable: {reason}", path.display())]
    InvalidModel { path: PathBuf, reason: String },
}

/// Failure inside a forward or gradient call, or while post-processing its
/// output. Aborts the whole evaluation pass.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OracleError {
    #[error("no differentiable path to the input: {0}")]
    NoGradient(String),
    #[error("device failure: {0}")]
    Device(String),
    #[error("gradient shape {gradient:?} does not match input shape {input:?}")]
    GradientShape {
        input: Vec<usize>,
        gradient: Vec<usize>,
    },
    #[error("oracle returned {rows} rows of logits for {samples} samples")]
    LogitRows { rows: usize, samples: usize },
    #[error("label {label} out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },
    #[error("logits for sample {sample} are not comparable (NaN)")]
    NonFiniteLogits { sample: usize },
    #[error("input value range is undefined (empty batch or NaN input)")]
    UndefinedRange,
    #[error("input shape {shape:?} is incompatible with the model: {reason}")]
    InputShape { shape: Vec<usize>, reason: String },
}

/// Persistence failure. Never invalidates an already computed evaluation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("missing required fields: {0:?}")]
    MissingFields(Vec<&'static str>),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("store i/o failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt record on line {line} of {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why a single run did not produce an evaluation.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Compute(#[from] OracleError),
}
