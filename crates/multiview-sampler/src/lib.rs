pub mod euler;
pub mod network;

pub use euler::{EulerSampler, StepRecord};
pub use network::AnchorNetwork;
