//! L∞-bounded perturbation attacks.
//!
//! Every attack returns a batch of the same shape as its input, clamped to the
//! value range observed in that input batch (not a fixed pixel domain), so the
//! valid range follows whatever normalisation the caller applied.
mod fgsm;
mod pgd;

pub use fgsm::Fgsm;
pub use pgd::Pgd;

use crate::context::ExecutionContext;
use crate::dataset::Batch;
use crate::error::{ConfigError, OracleError};
use crate::oracle::ModelOracle;
use crate::NNVFloat;
use enum_dispatch::enum_dispatch;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_PGD_ITERS: usize = 40;
/// PGD step size, as a fraction of epsilon, when none is given.
pub const DEFAULT_ALPHA_FRACTION: NNVFloat = 0.1;

#[enum_dispatch]
pub trait Attack {
    /// Perturbed copy of `batch.inputs`.
    ///
    /// # Errors
    /// Oracle failures are returned as-is; nothing is retried.
    fn generate(
        &self,
        ctx: &ExecutionContext,
        oracle: &dyn ModelOracle,
        batch: &Batch,
    ) -> Result<ArrayD<NNVFloat>, OracleError>;

    fn epsilon(&self) -> NNVFloat;

    fn kind(&self) -> AttackKind;
}

#[enum_dispatch(Attack)]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AttackConfig {
    Fgsm(Fgsm),
    Pgd(Pgd),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackKind {
    Fgsm,
    Pgd,
}

impl AttackKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fgsm => "fgsm",
            Self::Pgd => "pgd",
        }
    }
}

impl FromStr for AttackKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "fgsm" => Ok(Self::Fgsm),
            "pgd" => Ok(Self::Pgd),
            _ => Err(ConfigError::UnknownAttack { name: s.to_string() }),
        }
    }
}

impl fmt::Display for AttackKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-supplied PGD parameters; unset fields take the defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct AttackOverrides {
    pub alpha: Option<NNVFloat>,
    pub iters: Option<usize>,
}

impl AttackConfig {
    /// Builds a validated configuration, filling PGD defaults
    /// (`alpha = epsilon / 10`, `iters = 40`). FGSM ignores the overrides.
    ///
    /// # Errors
    /// Non-positive (or non-finite) epsilon or alpha, zero iterations.
    pub fn resolve(
        kind: AttackKind,
        epsilon: NNVFloat,
        overrides: AttackOverrides,
    ) -> Result<Self, ConfigError> {
        let config = match kind {
            AttackKind::Fgsm => Self::Fgsm(Fgsm::new(epsilon)),
            AttackKind::Pgd => Self::Pgd(Pgd::new(
                epsilon,
                overrides.alpha.unwrap_or(epsilon * DEFAULT_ALPHA_FRACTION),
                overrides.iters.unwrap_or(DEFAULT_PGD_ITERS),
            )),
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// See [`AttackConfig::resolve`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let epsilon = self.epsilon();
        if !(epsilon.is_finite() && epsilon > 0.) {
            return Err(ConfigError::Epsilon {
                value: epsilon,
                max: NNVFloat::INFINITY,
            });
        }
        if let Self::Pgd(pgd) = self {
            if !(pgd.alpha.is_finite() && pgd.alpha > 0.) {
                return Err(ConfigError::Alpha { value: pgd.alpha });
            }
            if pgd.iters == 0 {
                return Err(ConfigError::Iters {
                    value: 0,
                    max: usize::MAX,
                });
            }
        }
        Ok(())
    }

    pub const fn alpha(&self) -> Option<NNVFloat> {
        match self {
            Self::Fgsm(_) => None,
            Self::Pgd(pgd) => Some(pgd.alpha),
        }
    }

    pub const fn iters(&self) -> Option<usize> {
        match self {
            Self::Fgsm(_) => None,
            Self::Pgd(pgd) => Some(pgd.iters),
        }
    }
}

impl fmt::Display for AttackConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Fgsm(fgsm) => write!(f, "FGSM(epsilon={})", fgsm.epsilon),
            Self::Pgd(pgd) => write!(
                f,
                "PGD(epsilon={}, alpha={}, iters={})",
                pgd.epsilon, pgd.alpha, pgd.iters
            ),
        }
    }
}

/// Zero maps to zero.
pub(crate) fn sign(x: NNVFloat) -> NNVFloat {
    if x > 0. {
        1.
    } else if x < 0. {
        -1.
    } else {
        0.
    }
}

/// Gradient at `inputs`, rejected unless it has the input's shape.
pub(crate) fn checked_gradient(
    oracle: &dyn ModelOracle,
    inputs: &ArrayD<NNVFloat>,
    batch: &Batch,
) -> Result<ArrayD<NNVFloat>, OracleError> {
    let grad = oracle.input_gradient(inputs, &batch.labels)?;
    if grad.shape() != inputs.shape() {
        return Err(OracleError::GradientShape {
            input: inputs.shape().to_vec(),
            gradient: grad.shape().to_vec(),
        });
    }
    Ok(grad)
}
