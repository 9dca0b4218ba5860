use super::{checked_gradient, sign, Attack, AttackKind};
use crate::bounds::ValueRange;
use crate::context::ExecutionContext;
use crate::dataset::Batch;
use crate::error::OracleError;
use crate::oracle::ModelOracle;
use crate::NNVFloat;
use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

/// Fast Gradient Sign Method: one step of size `epsilon` along the sign of
/// the loss gradient.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Fgsm {
    pub epsilon: NNVFloat,
}

impl Fgsm {
    pub const fn new(epsilon: NNVFloat) -> Self {
        Self { epsilon }
    }
}

impl Attack for Fgsm {
    fn generate(
        &self,
        _ctx: &ExecutionContext,
        oracle: &dyn ModelOracle,
        batch: &Batch,
    ) -> Result<ArrayD<NNVFloat>, OracleError> {
        let range = ValueRange::observed(&batch.inputs.view())?;
        let grad = checked_gradient(oracle, &batch.inputs, batch)?;
        let epsilon = self.epsilon;
        let mut perturbed = Zip::from(&batch.inputs)
            .and(&grad)
            .map_collect(|&x, &g| x + epsilon * sign(g));
        range.clamp_inplace(&mut perturbed);
        Ok(perturbed)
    }

    fn epsilon(&self) -> NNVFloat {
        self.epsilon
    }

    fn kind(&self) -> AttackKind {
        AttackKind::Fgsm
    }
}
