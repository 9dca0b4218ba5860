use crate::dnn::layer::Layer;
use crate::NNVFloat;
use ndarray::Array2;
use ndarray::Zip;
use num::Zero;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ReLU {
    ndims: usize,
}

impl ReLU {
    pub const fn new(ndims: usize) -> Self {
        Self { ndims }
    }
}

impl Display for ReLU {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "ReLU")
    }
}

#[typetag::serde]
impl Layer for ReLU {
    fn input_dims(&self) -> Option<usize> {
        Some(self.ndims)
    }

    fn forward2(&self, input: &Array2<NNVFloat>) -> Array2<NNVFloat> {
        input.mapv(|x| if x.lt(&0.) { 0. } else { x })
    }

    /// Subgradient 0 at the kink.
    fn backward2(
        &self,
        input: &Array2<NNVFloat>,
        grad_output: &Array2<NNVFloat>,
    ) -> Array2<NNVFloat> {
        Zip::from(input)
            .and(grad_output)
            .map_collect(|&x, &g| if x > NNVFloat::zero() { g } else { NNVFloat::zero() })
    }

    fn is_activation(&self) -> bool {
        true
    }
}
