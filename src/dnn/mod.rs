pub mod conv;
pub mod dense;
pub mod dnn;
pub mod dropout;
pub mod layer;
pub mod relu;

pub use conv::Conv;
pub use dense::Dense;
pub use dnn::DNN;
pub use dropout::Dropout;
pub use layer::Layer;
pub use relu::ReLU;
