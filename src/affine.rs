#![allow(clippy::module_name_repetitions)]
//! Representation of affine transformations
use crate::NNVFloat;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Affine map `x -> basis · x + shift`, with `basis` of shape `(out, in)`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Affine2 {
    basis: Array2<NNVFloat>,
    shift: Array1<NNVFloat>,
}

impl Display for Affine2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        write!(
            f,
            "Basis {:?} Shift {:?}",
            self.basis.shape(),
            self.shift.shape()
        )
    }
}

impl Affine2 {
    pub fn new(basis: Array2<NNVFloat>, shift: Array1<NNVFloat>) -> Self {
        debug_assert_eq!(basis.shape()[0], shift.len());
        Self { basis, shift }
    }

    /// Standard-normal weights scaled by `1/sqrt(in)`, zero shift.
    ///
    /// # Panics
    /// If `input_dim` is zero.
    pub fn random<R: Rng>(input_dim: usize, output_dim: usize, rng: &mut R) -> Self {
        let std = 1. / (input_dim as NNVFloat).sqrt();
        let dist = Normal::new(0., std).unwrap();
        Self {
            basis: Array2::random_using((output_dim, input_dim), dist, rng),
            shift: Array1::zeros(output_dim),
        }
    }

    pub fn basis(&self) -> ArrayView2<NNVFloat> {
        self.basis.view()
    }

    pub fn shift(&self) -> ArrayView1<NNVFloat> {
        self.shift.view()
    }

    pub fn input_dim(&self) -> usize {
        self.basis.shape()[1]
    }

    pub fn output_dim(&self) -> usize {
        self.shift.len()
    }

    pub fn apply(&self, x: &ArrayView1<NNVFloat>) -> Array1<NNVFloat> {
        self.basis.dot(x) + &self.shift
    }

    /// Applies the map to every row of `x` (one sample per row).
    pub fn apply_matrix(&self, x: &ArrayView2<NNVFloat>) -> Array2<NNVFloat> {
        x.dot(&self.basis.t()) + &self.shift
    }

    /// Pulls a gradient with respect to the outputs back to the inputs.
    /// Rows of `grad_output` are samples.
    pub fn backprop(&self, grad_output: &ArrayView2<NNVFloat>) -> Array2<NNVFloat> {
        debug_assert_eq!(grad_output.ncols(), self.output_dim());
        grad_output.dot(&self.basis)
    }
}
