//! The model oracle seam: forward inference plus the input gradient of the
//! cross-entropy loss. Oracles are frozen and run in inference mode.
use crate::error::OracleError;
use crate::NNVFloat;
use ndarray::{Array1, Array2, ArrayD, Axis, Zip};
use ndarray_stats::QuantileExt;

/// Differentiable classifier consumed by the attacks and the evaluator.
///
/// Implementations need not be reentrant; callers drive one oracle from a
/// single thread of control.
pub trait ModelOracle {
    fn num_classes(&self) -> usize;

    /// Logits of shape `(samples, classes)` for a batch whose axis 0 is the
    /// sample axis.
    ///
    /// # Errors
    /// Device or shape failures, passed through unmodified.
    fn predict(&self, inputs: &ArrayD<NNVFloat>) -> Result<Array2<NNVFloat>, OracleError>;

    /// Gradient of the mean cross-entropy between `predict(inputs)` and
    /// `labels`, with respect to `inputs`. Same shape as `inputs`.
    ///
    /// # Errors
    /// [`OracleError::NoGradient`] when no differentiable path exists.
    fn input_gradient(
        &self,
        inputs: &ArrayD<NNVFloat>,
        labels: &Array1<usize>,
    ) -> Result<ArrayD<NNVFloat>, OracleError>;
}

impl<T: ModelOracle + ?Sized> ModelOracle for Box<T> {
    fn num_classes(&self) -> usize {
        (**self).num_classes()
    }

    fn predict(&self, inputs: &ArrayD<NNVFloat>) -> Result<Array2<NNVFloat>, OracleError> {
        (**self).predict(inputs)
    }

    fn input_gradient(
        &self,
        inputs: &ArrayD<NNVFloat>,
        labels: &Array1<usize>,
    ) -> Result<ArrayD<NNVFloat>, OracleError> {
        (**self).input_gradient(inputs, labels)
    }
}

/// Row-wise softmax, shifted by the row max for stability.
pub fn softmax_rows(logits: &Array2<NNVFloat>) -> Array2<NNVFloat> {
    let mut probs = logits.clone();
    for mut row in probs.rows_mut() {
        let max = row.fold(NNVFloat::NEG_INFINITY, |m, &x| m.max(x));
        row.mapv_inplace(|x| (x - max).exp());
        let total = row.sum();
        row.mapv_inplace(|x| x / total);
    }
    probs
}

fn check_labels(logits: &Array2<NNVFloat>, labels: &Array1<usize>) -> Result<(), OracleError> {
    if logits.nrows() != labels.len() {
        return Err(OracleError::LogitRows {
            rows: logits.nrows(),
            samples: labels.len(),
        });
    }
    let classes = logits.ncols();
    match labels.iter().find(|&&l| l >= classes) {
        Some(&label) => Err(OracleError::LabelOutOfRange { label, classes }),
        None => Ok(()),
    }
}

/// Mean cross-entropy over the batch.
///
/// # Errors
/// If the logits and labels disagree in length, or a label is out of range.
pub fn cross_entropy(
    logits: &Array2<NNVFloat>,
    labels: &Array1<usize>,
) -> Result<NNVFloat, OracleError> {
    check_labels(logits, labels)?;
    let probs = softmax_rows(logits);
    let total: NNVFloat = Zip::from(probs.rows())
        .and(labels)
        .fold(0., |acc, row, &label| acc - row[label].ln());
    Ok(total / labels.len() as NNVFloat)
}

/// Gradient of [`cross_entropy`] with respect to the logits:
/// `(softmax(logits) - onehot(labels)) / n`.
///
/// # Errors
/// Same as [`cross_entropy`].
pub fn cross_entropy_grad(
    logits: &Array2<NNVFloat>,
    labels: &Array1<usize>,
) -> Result<Array2<NNVFloat>, OracleError> {
    check_labels(logits, labels)?;
    let n = labels.len() as NNVFloat;
    let mut grad = softmax_rows(logits);
    Zip::from(grad.rows_mut())
        .and(labels)
        .for_each(|mut row, &label| row[label] -= 1.);
    grad.mapv_inplace(|g| g / n);
    Ok(grad)
}

/// Predicted class per row. Ties resolve to the lowest class index.
///
/// # Errors
/// If a row contains NaN.
pub fn argmax_rows(logits: &Array2<NNVFloat>) -> Result<Array1<usize>, OracleError> {
    logits
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(sample, row)| row.argmax().map_err(|_| OracleError::NonFiniteLogits { sample }))
        .collect::<Result<Vec<_>, _>>()
        .map(Array1::from)
}
