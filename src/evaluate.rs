//! Reduces clean/perturbed predictions over a full dataset pass into
//! robustness counters.
use crate::attack::{Attack, AttackConfig};
use crate::context::ExecutionContext;
use crate::dataset::Batch;
use crate::error::OracleError;
use crate::oracle::{argmax_rows, ModelOracle};
use crate::NNVFloat;
use itertools::izip;
use log::{debug, info};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Counters accumulated over one evaluation pass. Accumulation is
/// commutative, so batch order only affects throughput.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EvaluationResult {
    pub total_samples: usize,
    pub clean_correct: usize,
    pub robust_correct: usize,
    /// Correct on the clean input, wrong on the perturbed one.
    pub flipped_correct_to_incorrect: usize,
}

impl EvaluationResult {
    /// Counts for one batch of predictions.
    ///
    /// # Panics
    /// If the three arrays differ in length.
    pub fn from_predictions(
        labels: ArrayView1<usize>,
        clean_preds: ArrayView1<usize>,
        robust_preds: ArrayView1<usize>,
    ) -> Self {
        assert_eq!(labels.len(), clean_preds.len());
        assert_eq!(labels.len(), robust_preds.len());
        izip!(labels, clean_preds, robust_preds).fold(
            Self::default(),
            |mut acc, (label, clean, robust)| {
                let clean_ok = clean == label;
                let robust_ok = robust == label;
                acc.total_samples += 1;
                acc.clean_correct += usize::from(clean_ok);
                acc.robust_correct += usize::from(robust_ok);
                acc.flipped_correct_to_incorrect += usize::from(clean_ok && !robust_ok);
                acc
            },
        )
    }

    fn percent(numerator: usize, denominator: usize) -> NNVFloat {
        if denominator == 0 {
            return 0.;
        }
        100. * numerator as NNVFloat / denominator as NNVFloat
    }

    pub fn clean_accuracy(&self) -> NNVFloat {
        Self::percent(self.clean_correct, self.total_samples)
    }

    pub fn robust_accuracy(&self) -> NNVFloat {
        Self::percent(self.robust_correct, self.total_samples)
    }

    /// Share of clean-correct samples the attack flipped; 0 when nothing was
    /// classified correctly to begin with.
    pub fn attack_success_rate(&self) -> NNVFloat {
        Self::percent(self.flipped_correct_to_incorrect, self.clean_correct)
    }
}

impl AddAssign for EvaluationResult {
    fn add_assign(&mut self, rhs: Self) {
        self.total_samples += rhs.total_samples;
        self.clean_correct += rhs.clean_correct;
        self.robust_correct += rhs.robust_correct;
        self.flipped_correct_to_incorrect += rhs.flipped_correct_to_incorrect;
    }
}

impl Add for EvaluationResult {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

/// Clean prediction, attack, robust prediction for one batch.
///
/// # Errors
/// Any oracle failure.
pub fn evaluate_batch(
    ctx: &ExecutionContext,
    oracle: &dyn ModelOracle,
    batch: &Batch,
    attack: &AttackConfig,
) -> Result<EvaluationResult, OracleError> {
    let clean_preds = predict_labels(oracle, &batch.inputs, batch.len())?;
    let adversarial = attack.generate(ctx, oracle, batch)?;
    let robust_preds = predict_labels(oracle, &adversarial, batch.len())?;
    Ok(EvaluationResult::from_predictions(
        batch.labels.view(),
        clean_preds.view(),
        robust_preds.view(),
    ))
}

fn predict_labels(
    oracle: &dyn ModelOracle,
    inputs: &ndarray::ArrayD<NNVFloat>,
    samples: usize,
) -> Result<Array1<usize>, OracleError> {
    let logits = oracle.predict(inputs)?;
    if logits.nrows() != samples {
        return Err(OracleError::LogitRows {
            rows: logits.nrows(),
            samples,
        });
    }
    argmax_rows(&logits)
}

/// Runs `attack` over every batch, strictly in sequence. The first failure
/// aborts the pass and no partial result is returned.
///
/// # Errors
/// The oracle failure that stopped the pass, unmodified.
pub fn evaluate<I>(
    ctx: &ExecutionContext,
    oracle: &dyn ModelOracle,
    batches: I,
    attack: &AttackConfig,
) -> Result<EvaluationResult, OracleError>
where
    I: IntoIterator<Item = Batch>,
{
    let mut result = EvaluationResult::default();
    for (idx, batch) in batches.into_iter().enumerate() {
        let counts = evaluate_batch(ctx, oracle, &batch, attack)?;
        debug!(
            target: ctx.target(),
            "batch {}: {}/{} clean, {}/{} robust",
            idx,
            counts.clean_correct,
            counts.total_samples,
            counts.robust_correct,
            counts.total_samples
        );
        result += counts;
    }
    info!(
        target: ctx.target(),
        "{} over {} samples: clean {:.2}%, robust {:.2}%, attack success {:.2}%",
        attack,
        result.total_samples,
        result.clean_accuracy(),
        result.robust_accuracy(),
        result.attack_success_rate()
    );
    Ok(result)
}
