pub mod args;
pub mod prediction;

/// Dense numeric tensor used for states, time and predictions.
pub type Tensor = ndarray::ArrayD<f32>;
