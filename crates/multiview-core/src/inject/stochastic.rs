use tracing::{Level, event};

use crate::condition::ConditionResolver;
use crate::dynamics::{Dynamics, DynamicsError, DynamicsHandle};
use crate::model::Tensor;
use crate::model::args::CallArgs;
use crate::model::prediction::{LatentState, Prediction};
use crate::observer::ViewObserver;
use crate::stochastic::StochasticSelector;

/// Wrapper that forwards each call to exactly one view's conditioning.
pub(crate) struct StochasticDynamics {
    original: DynamicsHandle,
    selector: StochasticSelector,
    resolver: ConditionResolver,
    observer: Option<Box<dyn ViewObserver>>,
}

impl StochasticDynamics {
    pub(crate) fn new(
        original: DynamicsHandle,
        num_views: usize,
        num_steps: usize,
        observer: Option<Box<dyn ViewObserver>>,
    ) -> Self {
        Self {
            original,
            selector: StochasticSelector::new(num_views, num_steps),
            resolver: ConditionResolver::new(num_views),
            observer,
        }
    }
}

impl Dynamics for StochasticDynamics {
    fn predict(
        &mut self,
        state: &LatentState,
        time: &Tensor,
        args: &CallArgs,
    ) -> Result<Prediction, DynamicsError> {
        let view = self.selector.next_view();
        let view_args = self
            .resolver
            .resolve(args)
            .map(|conditions| conditions.args_for(args, view));

        if let Some(observer) = self.observer.as_mut() {
            observer.set_view(view);
        }
        event!(
            target: "multiview::view",
            Level::DEBUG,
            mode = "stochastic",
            view_index = view as u64,
            call = self.selector.calls() as u64
        );

        self.original
            .predict(state, time, view_args.as_ref().unwrap_or(args))
    }
}
