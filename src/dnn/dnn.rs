use crate::dnn::{Dense, Layer, ReLU};
use crate::error::OracleError;
use crate::oracle::{cross_entropy_grad, ModelOracle};
use crate::tensorshape::TensorShape;
use crate::NNVFloat;
use ndarray::{Array1, Array2, ArrayD};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequential classifier over flattened samples. Runs in inference mode only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DNN {
    input_shape: TensorShape,
    layers: Vec<Box<dyn Layer>>,
}

impl DNN {
    pub fn new(input_shape: TensorShape, layers: Vec<Box<dyn Layer>>) -> Self {
        Self {
            input_shape,
            layers,
        }
    }

    /// Dense/ReLU stack with random weights; `widths` lists every
    /// representation width from input to logits.
    ///
    /// # Panics
    /// If fewer than two widths are given.
    pub fn dense_relu<R: Rng>(input_shape: TensorShape, widths: &[usize], rng: &mut R) -> Self {
        assert!(widths.len() >= 2);
        let mut dnn = Self::new(input_shape, vec![]);
        let pairs = widths.iter().zip(widths.iter().skip(1)).enumerate();
        for (i, (&in_dim, &out_dim)) in pairs {
            dnn.add_layer(Box::new(Dense::random(in_dim, out_dim, rng)));
            if i + 2 < widths.len() {
                dnn.add_layer(Box::new(ReLU::new(out_dim)));
            }
        }
        dnn
    }

    pub fn add_layer(&mut self, layer: Box<dyn Layer>) {
        self.layers.push(layer);
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub const fn input_shape(&self) -> &TensorShape {
        &self.input_shape
    }

    /// Width of the logits, i.e. the last layer with a fixed width.
    pub fn output_dims(&self) -> Option<usize> {
        self.layers.iter().rev().find_map(|l| l.output_dims())
    }

    /// Checks that consecutive layer widths line up with each other and with
    /// the declared input shape.
    ///
    /// # Errors
    /// Names the first layer whose input width disagrees.
    pub fn validate(&self) -> Result<(), String> {
        let mut width = self.input_shape.dims();
        for (idx, layer) in self.layers.iter().enumerate() {
            if let (Some(expected), Some(found)) = (width, layer.input_dims()) {
                if expected != found {
                    return Err(format!(
                        "layer {} ({}) expects width {}, receives {}",
                        idx, layer, found, expected
                    ));
                }
            }
            width = layer.output_dims().or(width);
        }
        if self.output_dims().is_none() {
            return Err("network has no layer with a fixed output width".to_string());
        }
        Ok(())
    }

    pub fn forward2(&self, input: &Array2<NNVFloat>) -> Array2<NNVFloat> {
        self.layers
            .iter()
            .fold(input.clone(), |repr, layer| layer.forward2(&repr))
    }

    /// Input to every layer followed by the logits.
    fn forward_trace(&self, input: Array2<NNVFloat>) -> Vec<Array2<NNVFloat>> {
        let mut trace = Vec::with_capacity(self.layers.len() + 1);
        trace.push(input);
        for layer in &self.layers {
            let next = layer.forward2(&trace[trace.len() - 1]);
            trace.push(next);
        }
        trace
    }

    fn flatten(&self, inputs: &ArrayD<NNVFloat>) -> Result<Array2<NNVFloat>, OracleError> {
        let shape = inputs.shape().to_vec();
        if shape.is_empty() || !self.input_shape.matches(&shape[1..]) {
            return Err(OracleError::InputShape {
                shape,
                reason: format!("expected (batch, {})", self.input_shape),
            });
        }
        let n = shape[0];
        let width: usize = shape[1..].iter().product();
        inputs
            .as_standard_layout()
            .to_owned()
            .into_shape((n, width))
            .map_err(|e| OracleError::InputShape {
                shape,
                reason: e.to_string(),
            })
    }
}

impl ModelOracle for DNN {
    fn num_classes(&self) -> usize {
        self.output_dims().unwrap_or(0)
    }

    fn predict(&self, inputs: &ArrayD<NNVFloat>) -> Result<Array2<NNVFloat>, OracleError> {
        let flat = self.flatten(inputs)?;
        Ok(self.forward2(&flat))
    }

    fn input_gradient(
        &self,
        inputs: &ArrayD<NNVFloat>,
        labels: &Array1<usize>,
    ) -> Result<ArrayD<NNVFloat>, OracleError> {
        if self.layers.is_empty() {
            return Err(OracleError::NoGradient("network has no layers".to_string()));
        }
        let flat = self.flatten(inputs)?;
        let mut trace = self.forward_trace(flat);
        let logits = trace
            .pop()
            .ok_or_else(|| OracleError::NoGradient("empty forward trace".to_string()))?;
        let mut grad = cross_entropy_grad(&logits, labels)?;
        for (layer, layer_input) in self.layers.iter().zip(trace.iter()).rev() {
            grad = layer.backward2(layer_input, &grad);
        }
        grad.into_shape(inputs.raw_dim())
            .map_err(|e| OracleError::NoGradient(e.to_string()))
    }
}

impl fmt::Display for DNN {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let layers: Vec<String> = self.layers.iter().map(|x| format!("{}", x)).collect();
        write!(f, "Input {} => {}", self.input_shape, layers.join(" => "))
    }
}
