use super::{checked_gradient, sign, Attack, AttackKind};
use crate::bounds::{LinfBall, ValueRange};
use crate::context::ExecutionContext;
use crate::dataset::Batch;
use crate::error::OracleError;
use crate::oracle::ModelOracle;
use crate::NNVFloat;
use log::trace;
use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

/// Projected Gradient Descent without random start: `iters` signed steps of
/// size `alpha`, each followed by projection onto the `epsilon` ball around
/// the clean batch and clamping to the batch's value range.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Pgd {
    pub epsilon: NNVFloat,
    pub alpha: NNVFloat,
    pub iters: usize,
}

impl Pgd {
    pub const fn new(epsilon: NNVFloat, alpha: NNVFloat, iters: usize) -> Self {
        Self {
            epsilon,
            alpha,
            iters,
        }
    }

    /// One iteration. Consumes the previous adversarial batch and returns the
    /// next one; the clean batch is only ever borrowed.
    fn step(
        &self,
        oracle: &dyn ModelOracle,
        batch: &Batch,
        ball: &LinfBall<'_, ndarray::IxDyn>,
        range: &ValueRange,
        adv: ArrayD<NNVFloat>,
    ) -> Result<ArrayD<NNVFloat>, OracleError> {
        let grad = checked_gradient(oracle, &adv, batch)?;
        let alpha = self.alpha;
        let mut next = Zip::from(&adv)
            .and(&grad)
            .map_collect(|&x, &g| x + alpha * sign(g));
        ball.project_inplace(&mut next);
        range.clamp_inplace(&mut next);
        Ok(next)
    }
}

impl Attack for Pgd {
    fn generate(
        &self,
        ctx: &ExecutionContext,
        oracle: &dyn ModelOracle,
        batch: &Batch,
    ) -> Result<ArrayD<NNVFloat>, OracleError> {
        let range = ValueRange::observed(&batch.inputs.view())?;
        let ball = LinfBall::new(batch.inputs.view(), self.epsilon);
        (0..self.iters).try_fold(batch.inputs.clone(), |adv, iteration| {
            trace!(target: ctx.target(), "pgd iteration {}/{}", iteration + 1, self.iters);
            self.step(oracle, batch, &ball, &range, adv)
        })
    }

    fn epsilon(&self) -> NNVFloat {
        self.epsilon
    }

    fn kind(&self) -> AttackKind {
        AttackKind::Pgd
    }
}
