//! Runtime settings, loaded with the `config` crate from an optional file and
//! `NNV_ROBUST_*` environment variables.
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "NNV_ROBUST";

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub models_dir: PathBuf,
    pub data_dir: PathBuf,
    /// JSON-lines file backing the result store.
    pub store_path: PathBuf,
    pub default_batch_size: usize,
    pub default_num_samples: Option<usize>,
    /// Seeds dataset subsampling. Unset means the first `num_samples` are used.
    pub subsample_seed: Option<u64>,
    pub limits: Limits,
    pub logging: LoggingSettings,
}

/// Upper bounds a run request must respect.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Limits {
    pub max_epsilon: f64,
    pub max_num_samples: usize,
    pub max_batch_size: usize,
    pub max_iters: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// One of `error`, `warn`, `info`, `debug`, `trace`.
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            data_dir: PathBuf::from("data"),
            store_path: PathBuf::from("results.jsonl"),
            default_batch_size: 128,
            default_num_samples: Some(1000),
            subsample_seed: None,
            limits: Limits::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_epsilon: 1.0,
            max_num_samples: 10_000,
            max_batch_size: 512,
            max_iters: 100,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Settings {
    /// Environment only, e.g. `NNV_ROBUST_MODELS_DIR=/srv/models`.
    ///
    /// # Errors
    /// If a variable cannot be deserialized into its field.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Layers an optional settings file (any format `config` understands)
    /// under the environment.
    ///
    /// # Errors
    /// If the file exists but cannot be parsed, or a value has the wrong type.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| ConfigError::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// # Errors
    /// If a default or limit is itself out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;
        if !(limits.max_epsilon.is_finite() && limits.max_epsilon > 0.) {
            return Err(ConfigError::Settings(format!(
                "limits.max_epsilon must be positive, got {}",
                limits.max_epsilon
            )));
        }
        if self.default_batch_size == 0 || self.default_batch_size > limits.max_batch_size {
            return Err(ConfigError::BatchSize {
                value: self.default_batch_size,
                max: limits.max_batch_size,
            });
        }
        if let Some(n) = self.default_num_samples {
            if n == 0 || n > limits.max_num_samples {
                return Err(ConfigError::NumSamples {
                    value: n,
                    max: limits.max_num_samples,
                });
            }
        }
        Ok(())
    }
}
