use tracing::{Level, event};

use crate::condition::{ConditionResolver, condition_position};
use crate::dynamics::{Dynamics, DynamicsError, DynamicsHandle};
use crate::fuse::PredictionFuser;
use crate::model::Tensor;
use crate::model::args::{Arg, CallArgs};
use crate::model::prediction::{LatentState, Prediction};
use crate::observer::ViewObserver;

/// Wrapper that evaluates every view each step and fuses the results.
pub(crate) struct MultidiffusionDynamics {
    original: DynamicsHandle,
    resolver: ConditionResolver,
    fuser: PredictionFuser,
    observer: Option<Box<dyn ViewObserver>>,
    logged_condition: bool,
    logged_structure: bool,
}

impl MultidiffusionDynamics {
    pub(crate) fn new(
        original: DynamicsHandle,
        num_views: usize,
        fuser: PredictionFuser,
        observer: Option<Box<dyn ViewObserver>>,
    ) -> Self {
        Self {
            original,
            resolver: ConditionResolver::new(num_views),
            fuser,
            observer,
            logged_condition: false,
            logged_structure: false,
        }
    }

    fn log_condition(&mut self, args: &CallArgs) {
        if self.logged_condition {
            return;
        }
        let position = condition_position(args);
        let condition = match args.positional.get(position) {
            Some(Arg::Tensor(tensor)) => format!("shape {:?}", tensor.shape()),
            Some(Arg::Sequence(items)) => format!("sequence, length={}", items.len()),
            Some(other) => other.describe(),
            None => "<none>".to_string(),
        };
        event!(
            target: "multiview::multidiffusion",
            Level::INFO,
            num_views = self.resolver.num_views() as u64,
            cond_idx = position as u64,
            condition = %condition,
            "multidiffusion conditioning"
        );
        self.logged_condition = true;
    }

    fn log_structure(&mut self, state: &LatentState, first: &Prediction) {
        if self.logged_structure {
            return;
        }
        if let Some(names) = state.field_names() {
            event!(
                target: "multiview::multidiffusion",
                Level::INFO,
                fields = ?names,
                "latent state fields"
            );
        }
        if let Some(names) = first.field_names() {
            event!(
                target: "multiview::multidiffusion",
                Level::INFO,
                fields = ?names,
                "prediction fields"
            );
        }
        if matches!(first, Prediction::Sequence(_)) {
            event!(
                target: "multiview::multidiffusion",
                Level::WARN,
                "positional predictions carry no field names; every position is averaged, including any pose components"
            );
        }
        event!(
            target: "multiview::multidiffusion",
            Level::INFO,
            kind = first.kind(),
            "fusion policy: shape averaged, pose from view 0"
        );
        self.logged_structure = true;
    }
}

impl Dynamics for MultidiffusionDynamics {
    fn predict(
        &mut self,
        state: &LatentState,
        time: &Tensor,
        args: &CallArgs,
    ) -> Result<Prediction, DynamicsError> {
        let Some(conditions) = self.resolver.resolve(args) else {
            return self.original.predict(state, time, args);
        };
        self.log_condition(args);

        let mut predictions = Vec::with_capacity(conditions.num_views());
        for view in 0..conditions.num_views() {
            let view_args = conditions.args_for(args, view);
            if let Some(observer) = self.observer.as_mut() {
                observer.set_view(view);
            }
            event!(
                target: "multiview::view",
                Level::DEBUG,
                mode = "multidiffusion",
                view_index = view as u64
            );
            predictions.push(self.original.predict(state, time, &view_args)?);
        }

        if let Some(first) = predictions.first() {
            self.log_structure(state, first);
        }
        self.fuser.fuse(predictions)
    }
}
