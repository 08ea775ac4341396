//! Prediction-function interface shared by samplers and multi-view wrappers.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::model::Tensor;
use crate::model::args::CallArgs;
use crate::model::prediction::{LatentState, Prediction};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while computing a prediction for one sampler step.
#[derive(Debug, Error)]
pub enum DynamicsError {
    #[error("prediction network failed: {0}")]
    Network(#[source] BoxError),
    #[error("view {view} prediction does not match view 0: {detail}")]
    StructureMismatch { view: usize, detail: String },
    #[error("cannot stack view predictions: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("sampler update failed: {0}")]
    Sampler(String),
}

impl DynamicsError {
    pub fn network(err: impl Into<BoxError>) -> Self {
        DynamicsError::Network(err.into())
    }

    pub fn mismatch(view: usize, detail: impl Into<String>) -> Self {
        DynamicsError::StructureMismatch {
            view,
            detail: detail.into(),
        }
    }

    pub fn sampler(detail: impl Into<String>) -> Self {
        DynamicsError::Sampler(detail.into())
    }
}

/// Per-step prediction function: `(state, time, args) -> prediction`.
pub trait Dynamics {
    fn predict(
        &mut self,
        state: &LatentState,
        time: &Tensor,
        args: &CallArgs,
    ) -> Result<Prediction, DynamicsError>;
}

/// Adapter turning a closure into a [`Dynamics`] implementation.
pub struct FnDynamics<F>(F);

impl<F> Dynamics for FnDynamics<F>
where
    F: FnMut(&LatentState, &Tensor, &CallArgs) -> Result<Prediction, DynamicsError>,
{
    fn predict(
        &mut self,
        state: &LatentState,
        time: &Tensor,
        args: &CallArgs,
    ) -> Result<Prediction, DynamicsError> {
        (self.0)(state, time, args)
    }
}

/// Shared reference to an installed prediction function.
///
/// Cloning shares the same function; [`DynamicsHandle::same_as`] compares
/// identity, which is how restoration is checked.
#[derive(Clone)]
pub struct DynamicsHandle(Rc<RefCell<dyn Dynamics>>);

impl DynamicsHandle {
    pub fn new<D: Dynamics + 'static>(dynamics: D) -> Self {
        Self(Rc::new(RefCell::new(dynamics)))
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut(&LatentState, &Tensor, &CallArgs) -> Result<Prediction, DynamicsError> + 'static,
    {
        Self::new(FnDynamics(f))
    }

    /// Invoke the function. Re-entrant calls on the same handle panic.
    pub fn predict(
        &self,
        state: &LatentState,
        time: &Tensor,
        args: &CallArgs,
    ) -> Result<Prediction, DynamicsError> {
        self.0.borrow_mut().predict(state, time, args)
    }

    pub fn same_as(&self, other: &DynamicsHandle) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl fmt::Debug for DynamicsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DynamicsHandle")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// A sampler whose prediction function can be swapped at runtime.
pub trait Generator {
    /// Currently installed prediction function.
    fn dynamics(&self) -> DynamicsHandle;

    /// Install `dynamics`, returning the function it replaces.
    fn install_dynamics(&mut self, dynamics: DynamicsHandle) -> DynamicsHandle;
}
