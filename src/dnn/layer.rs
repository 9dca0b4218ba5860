use crate::NNVFloat;
use dyn_clone::DynClone;
use ndarray::Array2;
use std::fmt::{Debug, Display};

/// A differentiable, stateless layer over flattened samples (one per row).
///
/// Layers run in inference mode only: identical inputs give identical outputs.
#[typetag::serde(tag = "type")]
pub trait Layer: DynClone + Display + Debug + Send + Sync {
    /// Flattened input width, or `None` when the layer accepts any width and
    /// preserves it.
    fn input_dims(&self) -> Option<usize>;

    fn output_dims(&self) -> Option<usize> {
        self.input_dims()
    }

    fn forward2(&self, input: &Array2<NNVFloat>) -> Array2<NNVFloat>;

    /// Gradient of the loss with respect to `input`, given the gradient with
    /// respect to this layer's output at `input`.
    fn backward2(&self, input: &Array2<NNVFloat>, grad_output: &Array2<NNVFloat>)
        -> Array2<NNVFloat>;

    fn is_activation(&self) -> bool {
        // This should be implemented in activation layers to return true
        false
    }
}

// This implements `Clone` for the trait
dyn_clone::clone_trait_object!(Layer);
