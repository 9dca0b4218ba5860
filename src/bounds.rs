#![allow(clippy::module_name_repetitions)]
//! Box constraints used by the attacks: the value range observed in a batch
//! and the L∞ ball around the original inputs.
use crate::error::OracleError;
use crate::NNVFloat;
use ndarray::{Array, ArrayView, Dimension, Zip};
use ndarray_stats::QuantileExt;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Scalar `[lower, upper]` interval shared by every element of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct ValueRange {
    lower: NNVFloat,
    upper: NNVFloat,
}

impl ValueRange {
    /// The min/max of the values actually present in `data`.
    ///
    /// # Errors
    /// If `data` is empty or contains NaN.
    pub fn observed<D: Dimension>(data: &ArrayView<NNVFloat, D>) -> Result<Self, OracleError> {
        let lower = *data.min().map_err(|_| OracleError::UndefinedRange)?;
        let upper = *data.max().map_err(|_| OracleError::UndefinedRange)?;
        Ok(Self { lower, upper })
    }

    pub const fn lower(&self) -> NNVFloat {
        self.lower
    }

    pub const fn upper(&self) -> NNVFloat {
        self.upper
    }

    pub fn clamp(&self, x: NNVFloat) -> NNVFloat {
        x.max(self.lower).min(self.upper)
    }

    pub fn clamp_inplace<D: Dimension>(&self, data: &mut Array<NNVFloat, D>) {
        data.mapv_inplace(|x| self.clamp(x));
    }

    pub fn contains<D: Dimension>(&self, data: &ArrayView<NNVFloat, D>) -> bool {
        data.iter().all(|&x| self.lower <= x && x <= self.upper)
    }
}

impl Display for ValueRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

/// Per-element box `center ± radius`.
#[derive(Clone, Debug)]
pub struct LinfBall<'a, D: Dimension> {
    center: ArrayView<'a, NNVFloat, D>,
    radius: NNVFloat,
}

impl<'a, D: Dimension> LinfBall<'a, D> {
    pub const fn new(center: ArrayView<'a, NNVFloat, D>, radius: NNVFloat) -> Self {
        Self { center, radius }
    }

    /// `x := center + clamp(x - center, -radius, radius)`. With a zero radius
    /// the result is exactly `center`.
    ///
    /// # Panics
    /// If `x` and the center differ in shape.
    pub fn project_inplace(&self, x: &mut Array<NNVFloat, D>) {
        let radius = self.radius;
        Zip::from(x).and(&self.center).for_each(|x, &c| {
            let eta = (*x - c).max(-radius).min(radius);
            *x = c + eta;
        });
    }

    /// Largest absolute element-wise deviation of `x` from the center.
    ///
    /// # Panics
    /// If `x` and the center differ in shape.
    pub fn distance(&self, x: &ArrayView<NNVFloat, D>) -> NNVFloat {
        Zip::from(x)
            .and(&self.center)
            .fold(0., |acc: NNVFloat, &x, &c| acc.max((x - c).abs()))
    }

    pub fn contains(&self, x: &ArrayView<NNVFloat, D>, tolerance: NNVFloat) -> bool {
        self.distance(x) <= self.radius + tolerance
    }
}
