use crate::dnn::layer::Layer;
use crate::NNVFloat;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dropout in inference mode, i.e. the identity. Kept as a layer so trained
/// architectures deserialize unchanged; `prob` is informational.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Dropout {
    prob: NNVFloat,
}

impl Dropout {
    pub const fn new(prob: NNVFloat) -> Self {
        Self { prob }
    }

    pub const fn prob(&self) -> NNVFloat {
        self.prob
    }
}

#[typetag::serde]
impl Layer for Dropout {
    fn input_dims(&self) -> Option<usize> {
        None
    }

    fn forward2(&self, input: &Array2<NNVFloat>) -> Array2<NNVFloat> {
        input.clone()
    }

    fn backward2(
        &self,
        _input: &Array2<NNVFloat>,
        grad_output: &Array2<NNVFloat>,
    ) -> Array2<NNVFloat> {
        grad_output.clone()
    }
}

impl fmt::Display for Dropout {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Dropout({})", self.prob)
    }
}
