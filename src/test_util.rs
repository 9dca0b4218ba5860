#![cfg(test)]
use crate::dataset::Batch;
use crate::dnn::{Dense, ReLU, DNN};
use crate::error::OracleError;
use crate::affine::Affine2;
use crate::oracle::ModelOracle;
use crate::tensorshape::TensorShape;
use crate::NNVFloat;
use ndarray::{Array1, Array2, ArrayD, ArrayView1, Axis};
use proptest::arbitrary::functor::ArbitraryF1;
use proptest::prelude::*;
use proptest::sample::SizeRange;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

prop_compose! {
    pub fn array1(len: usize)(v in Vec::lift1_with(-10. .. 10., SizeRange::new(len..=len))) -> Array1<f64> {
        Array1::from_vec(v)
    }
}

prop_compose! {
    pub fn array2(rows: usize, cols: usize)(v in Vec::lift1_with(array1(cols), SizeRange::new(rows..=rows))) -> Array2<f64> {
        assert!(rows > 0);
        ndarray::stack(Axis(0), &v.iter().map(|x| x.view()).collect::<Vec<ArrayView1<f64>>>()).unwrap()
    }
}

prop_compose! {
    pub fn affine2(in_dim: usize, out_dim: usize)(basis in array2(out_dim, in_dim), shift in array1(out_dim)) -> Affine2 {
        Affine2::new(basis, shift)
    }
}

prop_compose! {
    /// Dense/ReLU network whose last layer emits `output_size` logits.
    pub fn fc_dnn(input_size: usize, output_size: usize, nlayers: usize, max_layer_width: usize)(repr_sizes in Vec::lift1_with(1..max_layer_width, SizeRange::new(nlayers..=nlayers)).prop_map(move |mut x| {x.insert(0, input_size); x.push(output_size); x}))(affines in {let pairs = repr_sizes.iter().zip(repr_sizes.iter().skip(1)); pairs.map(|(&x, &y)| affine2(x,y)).collect::<Vec<_>>()}) -> DNN {
        let mut dnn = DNN::new(TensorShape::from(vec![input_size]), vec![]);
        let n = affines.len();
        affines.into_iter().enumerate().for_each(|(i, aff)| {
            let output_dim = aff.output_dim();
            dnn.add_layer(Box::new(Dense::new(aff)));
            if i + 1 < n {
                dnn.add_layer(Box::new(ReLU::new(output_dim)));
            }
        });
        dnn
    }
}

pub fn random_labels(n: usize, classes: usize, seed: u64) -> Array1<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(0..classes)).collect()
}

/// Linear 2-class model: class 0 scores `-sum(x)`, class 1 scores `sum(x)`.
/// For label 0 the loss gradient is positive on every element.
pub fn two_class_linear_oracle(features: usize) -> DNN {
    let mut basis = Array2::ones((2, features));
    basis.row_mut(0).fill(-1.);
    let mut dnn = DNN::new(TensorShape::from(vec![features]), vec![]);
    dnn.add_layer(Box::new(Dense::from_parts(basis, Array1::zeros(2))));
    dnn
}

/// `n` samples in `[-1, 1)`, labelled by the sign of their sum, i.e. what
/// [`two_class_linear_oracle`] predicts.
pub fn synthetic_batch(n: usize, features: usize, seed: u64) -> Batch {
    let mut rng = StdRng::seed_from_u64(seed);
    let inputs = Array2::from_shape_fn((n, features), |_| rng.gen_range(-1.0..1.0));
    let labels = inputs
        .axis_iter(Axis(0))
        .map(|row| usize::from(row.sum() > 0.))
        .collect();
    Batch::new(inputs.into_dyn(), labels)
}

/// Oracle whose every call fails with the given message.
pub struct FailingOracle {
    message: String,
}

impl FailingOracle {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl ModelOracle for FailingOracle {
    fn num_classes(&self) -> usize {
        2
    }

    fn predict(&self, inputs: &ArrayD<NNVFloat>) -> Result<Array2<NNVFloat>, OracleError> {
        Ok(Array2::zeros((inputs.shape()[0], 2)))
    }

    fn input_gradient(
        &self,
        _inputs: &ArrayD<NNVFloat>,
        _labels: &Array1<usize>,
    ) -> Result<ArrayD<NNVFloat>, OracleError> {
        Err(OracleError::NoGradient(self.message.clone()))
    }
}
