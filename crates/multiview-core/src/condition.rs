//! Splitting the sampler's conditioning argument into per-view values.

use ndarray::{Axis, Slice};
use tracing::{Level, event};

use crate::model::args::{Arg, CallArgs};

/// How a conditioning argument is organized with respect to views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionLayout {
    /// A sequence with one entry per view.
    ViewSequence,
    /// A tensor whose leading axis indexes views.
    ViewBatch,
    /// Anything else; shared by all views.
    Broadcast,
}

impl ConditionLayout {
    pub fn classify(arg: &Arg, num_views: usize) -> Self {
        match arg {
            Arg::Sequence(items) if items.len() == num_views => ConditionLayout::ViewSequence,
            Arg::Tensor(tensor) if tensor.ndim() > 0 && tensor.shape()[0] == num_views => {
                ConditionLayout::ViewBatch
            }
            _ => ConditionLayout::Broadcast,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConditionLayout::ViewSequence => "view_sequence",
            ConditionLayout::ViewBatch => "view_batch",
            ConditionLayout::Broadcast => "broadcast",
        }
    }
}

/// Position of the conditioning argument: the second positional argument
/// when the first one is scalar-like, otherwise the first.
pub fn condition_position(args: &CallArgs) -> usize {
    match args.positional.first() {
        Some(first) if first.is_scalar_like() => 1,
        _ => 0,
    }
}

/// Per-view conditioning resolved for one call.
///
/// For [`ConditionLayout::ViewBatch`] every entry is a one-item slice that
/// keeps its leading axis, so a `[N, T, D]` batch yields `[1, T, D]` views
/// in both modes. Networks written against per-view indexing (`cond[i]`,
/// giving `[T, D]`) must accept the extra axis of length 1.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewConditions {
    pub position: usize,
    pub layout: ConditionLayout,
    pub per_view: Vec<Arg>,
}

impl ViewConditions {
    pub fn num_views(&self) -> usize {
        self.per_view.len()
    }

    /// Arguments for `view`, with its conditioning substituted in place.
    pub fn args_for(&self, base: &CallArgs, view: usize) -> CallArgs {
        base.with_positional(self.position, self.per_view[view].clone())
    }
}

/// Resolves conditioning for every call of one session.
#[derive(Debug)]
pub struct ConditionResolver {
    num_views: usize,
    warned_broadcast: bool,
}

impl ConditionResolver {
    pub fn new(num_views: usize) -> Self {
        Self {
            num_views,
            warned_broadcast: false,
        }
    }

    pub fn num_views(&self) -> usize {
        self.num_views
    }

    /// Returns `None` when there is no conditioning argument to multiplex,
    /// in which case the call should pass through unchanged.
    pub fn resolve(&mut self, args: &CallArgs) -> Option<ViewConditions> {
        let position = condition_position(args);
        let cond = args.positional.get(position)?;
        let layout = ConditionLayout::classify(cond, self.num_views);

        let per_view = match (layout, cond) {
            (ConditionLayout::ViewSequence, Arg::Sequence(items)) => items.clone(),
            (ConditionLayout::ViewBatch, Arg::Tensor(tensor)) => (0..self.num_views)
                .map(|view| {
                    Arg::Tensor(
                        tensor
                            .slice_axis(Axis(0), Slice::from(view..view + 1))
                            .to_owned(),
                    )
                })
                .collect(),
            _ => {
                if !self.warned_broadcast {
                    event!(
                        target: "multiview::condition",
                        Level::WARN,
                        num_views = self.num_views as u64,
                        condition = %cond.describe(),
                        "condition tokens not organized by view, using same condition for all views"
                    );
                    self.warned_broadcast = true;
                }
                vec![cond.clone(); self.num_views]
            }
        };

        Some(ViewConditions {
            position,
            layout,
            per_view,
        })
    }
}
