//! Multi-view injection for single-view iterative samplers.
//!
//! A sampler exposes its per-step prediction function through [`Generator`].
//! [`MultiViewSession`] swaps that function for a wrapper that either selects
//! one view per step ([`ViewMode::Stochastic`]) or evaluates every view and
//! fuses the results ([`ViewMode::Multidiffusion`]), and puts the original
//! back when the session ends.

pub mod condition;
pub mod config;
pub mod dynamics;
pub mod fuse;
pub mod inject;
pub mod model;
pub mod observer;
pub mod pose;
pub mod stochastic;

pub use condition::{ConditionLayout, ConditionResolver, ViewConditions};
pub use config::{ConfigError, MultiViewConfig, ViewMode};
pub use dynamics::{BoxError, Dynamics, DynamicsError, DynamicsHandle, Generator};
pub use fuse::PredictionFuser;
pub use inject::{MultiViewSession, with_multi_view};
pub use model::Tensor;
pub use model::args::{Arg, CallArgs};
pub use model::prediction::{LatentState, Prediction};
pub use observer::{ViewObserver, ViewTrace};
pub use pose::{POSE_FIELDS, PoseFieldSet, is_pose_field};
pub use stochastic::StochasticSelector;
