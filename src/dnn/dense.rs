use crate::affine::Affine2;
use crate::dnn::layer::Layer;
use crate::NNVFloat;
use ndarray::Array1;
use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Dense {
    aff: Affine2,
}

impl Dense {
    pub const fn new(aff: Affine2) -> Self {
        Self { aff }
    }

    pub fn from_parts(mul: Array2<NNVFloat>, add: Array1<NNVFloat>) -> Self {
        Self {
            aff: Affine2::new(mul, add),
        }
    }

    pub fn random<R: Rng>(input_dim: usize, output_dim: usize, rng: &mut R) -> Self {
        Self::new(Affine2::random(input_dim, output_dim, rng))
    }

    pub const fn affine(&self) -> &Affine2 {
        &self.aff
    }
}

#[typetag::serde]
impl Layer for Dense {
    fn input_dims(&self) -> Option<usize> {
        Some(self.aff.input_dim())
    }

    fn output_dims(&self) -> Option<usize> {
        Some(self.aff.output_dim())
    }

    fn forward2(&self, input: &Array2<NNVFloat>) -> Array2<NNVFloat> {
        self.aff.apply_matrix(&input.view())
    }

    fn backward2(
        &self,
        _input: &Array2<NNVFloat>,
        grad_output: &Array2<NNVFloat>,
    ) -> Array2<NNVFloat> {
        self.aff.backprop(&grad_output.view())
    }
}

impl fmt::Display for Dense {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Dense {}", self.aff.output_dim())
    }
}
