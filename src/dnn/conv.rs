#![allow(non_snake_case, clippy::module_name_repetitions)]
//! 2-D convolution, lowered to an equivalent dense affine map over flattened
//! channels-last samples.
use crate::affine::Affine2;
use crate::dnn::layer::Layer;
use crate::tensorshape::TensorShape;
use crate::NNVFloat;
use itertools::Itertools;
use ndarray::{Array1, Array2, Array4};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Serialized form of a [`Conv`]; the lowered affine map is rebuilt on load.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ConvSpec {
    kernel: Array4<NNVFloat>,         // (K_h, K_w, C_in, C_out) following tf convention
    bias: Array1<NNVFloat>,           // (C_out)
    input_shape: (usize, usize, usize), // (H, W, C_in)
    strides: (usize, usize),
    padding: ((usize, usize), (usize, usize)), // ((top, bottom), (left, right))
}

/// Assumes that data is always in a flattened state.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(try_from = "ConvSpec", into = "ConvSpec")]
pub struct Conv {
    spec: ConvSpec,
    affine: Affine2,
}

impl Conv {
    /// # Panics
    /// If the kernel does not fit the bias or the input, or a stride is zero.
    pub fn new(
        kernel: Array4<NNVFloat>,
        bias: Array1<NNVFloat>,
        input_shape: (usize, usize, usize),
        strides: (usize, usize),
        padding: ((usize, usize), (usize, usize)),
    ) -> Self {
        Self::try_from(ConvSpec {
            kernel,
            bias,
            input_shape,
            strides,
            padding,
        })
        .unwrap_or_else(|e| panic!("{}", e))
    }

    pub fn input_shape(&self) -> TensorShape {
        let (h, w, c) = self.spec.input_shape;
        TensorShape::from(vec![h, w, c])
    }

    pub fn output_shape(&self) -> TensorShape {
        let (h, w, c) = output_hwc(&self.spec);
        TensorShape::from(vec![h, w, c])
    }

    pub const fn get_affine(&self) -> &Affine2 {
        &self.affine
    }
}

fn output_hwc(spec: &ConvSpec) -> (usize, usize, usize) {
    let (h_in, w_in, _) = spec.input_shape;
    let k_h = spec.kernel.shape()[0];
    let k_w = spec.kernel.shape()[1];
    let h_out = (h_in + spec.padding.0 .0 + spec.padding.0 .1 - k_h) / spec.strides.0 + 1;
    let w_out = (w_in + spec.padding.1 .0 + spec.padding.1 .1 - k_w) / spec.strides.1 + 1;
    (h_out, w_out, spec.kernel.shape()[3])
}

fn construct_affine(spec: &ConvSpec) -> Affine2 {
    let (h_in, w_in, c_in) = spec.input_shape;
    let (h_out, w_out, c_out) = output_hwc(spec);
    let k_h = spec.kernel.shape()[0];
    let k_w = spec.kernel.shape()[1];

    let input_dims = h_in * w_in * c_in;
    let output_dims = h_out * w_out * c_out;

    let mut weight = Array2::<NNVFloat>::zeros((output_dims, input_dims));
    for (y_out, x_out) in (0..h_out).cartesian_product(0..w_out) {
        let y_0 = y_out * spec.strides.0;
        let x_0 = x_out * spec.strides.1;

        for k_y in 0..k_h {
            if y_0 + k_y < spec.padding.0 .0 || y_0 + k_y >= h_in + spec.padding.0 .0 {
                // zero padding
                continue;
            }
            let y_in = y_0 + k_y - spec.padding.0 .0;
            for k_x in 0..k_w {
                if x_0 + k_x < spec.padding.1 .0 || x_0 + k_x >= w_in + spec.padding.1 .0 {
                    continue;
                }
                let x_in = x_0 + k_x - spec.padding.1 .0;

                for f_in in 0..c_in {
                    let input_idx = y_in * (w_in * c_in) + x_in * c_in + f_in;
                    for f_out in 0..c_out {
                        let output_idx = y_out * (w_out * c_out) + x_out * c_out + f_out;
                        weight[[output_idx, input_idx]] = spec.kernel[[k_y, k_x, f_in, f_out]];
                    }
                }
            }
        }
    }

    let bias = Array1::from_iter(
        (0..h_out * w_out)
            .flat_map(|_| spec.bias.iter().copied())
            .collect::<Vec<_>>(),
    );
    Affine2::new(weight, bias)
}

impl TryFrom<ConvSpec> for Conv {
    type Error = String;

    fn try_from(spec: ConvSpec) -> Result<Self, Self::Error> {
        let k = spec.kernel.shape();
        if k[3] != spec.bias.len() {
            return Err(format!("kernel has {} output channels, bias has {}", k[3], spec.bias.len()));
        }
        if k[2] != spec.input_shape.2 {
            return Err(format!("kernel expects {} input channels, input has {}", k[2], spec.input_shape.2));
        }
        if spec.strides.0 == 0 || spec.strides.1 == 0 {
            return Err("strides must be positive".to_string());
        }
        let padded_h = spec.input_shape.0 + spec.padding.0 .0 + spec.padding.0 .1;
        let padded_w = spec.input_shape.1 + spec.padding.1 .0 + spec.padding.1 .1;
        if k[0] > padded_h || k[1] > padded_w {
            return Err(format!("{}x{} kernel exceeds padded input {}x{}", k[0], k[1], padded_h, padded_w));
        }
        let affine = construct_affine(&spec);
        Ok(Self { spec, affine })
    }
}

impl From<Conv> for ConvSpec {
    fn from(conv: Conv) -> Self {
        conv.spec
    }
}

#[typetag::serde]
impl Layer for Conv {
    fn input_dims(&self) -> Option<usize> {
        Some(self.affine.input_dim())
    }

    fn output_dims(&self) -> Option<usize> {
        Some(self.affine.output_dim())
    }

    fn forward2(&self, input: &Array2<NNVFloat>) -> Array2<NNVFloat> {
        self.affine.apply_matrix(&input.view())
    }

    fn backward2(
        &self,
        _input: &Array2<NNVFloat>,
        grad_output: &Array2<NNVFloat>,
    ) -> Array2<NNVFloat> {
        self.affine.backprop(&grad_output.view())
    }
}

impl fmt::Display for Conv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Conv {}x{}x{}",
            self.spec.kernel.shape()[0],
            self.spec.kernel.shape()[1],
            self.spec.kernel.shape()[3]
        )
    }
}
