//! Fixed-step Euler integrator driven by a swappable prediction function.

use std::collections::BTreeMap;

use multiview_core::{
    CallArgs, DynamicsError, DynamicsHandle, Generator, LatentState, Prediction, Tensor,
};
use ndarray::arr0;
use tracing::{Level, event};

/// Per-step progress reported by [`EulerSampler::sample_with`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub step: usize,
    pub t: f32,
    pub update_norm: f32,
}

/// Integrates `dx/dt = v(x, t, args)` over `t in [0, 1)` in `num_steps`
/// uniform steps.
pub struct EulerSampler {
    dynamics: DynamicsHandle,
    num_steps: usize,
}

impl EulerSampler {
    pub fn new(dynamics: DynamicsHandle, num_steps: usize) -> Self {
        Self {
            dynamics,
            num_steps: num_steps.max(1),
        }
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    pub fn sample(
        &self,
        initial: LatentState,
        args: &CallArgs,
    ) -> Result<LatentState, DynamicsError> {
        self.sample_with(initial, args, |_| {})
    }

    pub fn sample_with<F>(
        &self,
        initial: LatentState,
        args: &CallArgs,
        mut on_step: F,
    ) -> Result<LatentState, DynamicsError>
    where
        F: FnMut(&StepRecord),
    {
        let dt = 1.0 / self.num_steps as f32;
        let mut state = initial;
        for step in 0..self.num_steps {
            let t = step as f32 * dt;
            let time = arr0(t).into_dyn();
            let velocity = self.dynamics.predict(&state, &time, args)?;
            let update_norm = apply_update(&mut state, &velocity, dt)?;

            event!(
                target: "multiview_sampler::step",
                Level::TRACE,
                step = step as u64,
                t,
                update_norm
            );
            on_step(&StepRecord {
                step,
                t,
                update_norm,
            });
        }
        Ok(state)
    }
}

impl Generator for EulerSampler {
    fn dynamics(&self) -> DynamicsHandle {
        self.dynamics.clone()
    }

    fn install_dynamics(&mut self, dynamics: DynamicsHandle) -> DynamicsHandle {
        std::mem::replace(&mut self.dynamics, dynamics)
    }
}

/// `x <- x + dt * v`; returns the L2 norm of the applied update.
fn apply_update(
    state: &mut LatentState,
    velocity: &Prediction,
    dt: f32,
) -> Result<f32, DynamicsError> {
    match (state, velocity) {
        (LatentState::Tensor(x), Prediction::Tensor(v)) => step_tensor("<state>", x, v, dt),
        (LatentState::Fields(fields), Prediction::Fields(update)) => step_fields(fields, update, dt),
        (state, velocity) => Err(DynamicsError::sampler(format!(
            "cannot apply {} prediction to {} state",
            velocity.kind(),
            match state {
                LatentState::Tensor(_) => "tensor",
                LatentState::Fields(_) => "fields",
            }
        ))),
    }
}

fn step_fields(
    fields: &mut BTreeMap<String, Tensor>,
    update: &BTreeMap<String, Tensor>,
    dt: f32,
) -> Result<f32, DynamicsError> {
    let mut squared = 0.0f32;
    for (name, x) in fields.iter_mut() {
        let v = update
            .get(name)
            .ok_or_else(|| DynamicsError::sampler(format!("prediction has no field '{name}'")))?;
        let norm = step_tensor(name, x, v, dt)?;
        squared += norm * norm;
    }
    Ok(squared.sqrt())
}

fn step_tensor(name: &str, x: &mut Tensor, v: &Tensor, dt: f32) -> Result<f32, DynamicsError> {
    if x.shape() != v.shape() {
        return Err(DynamicsError::sampler(format!(
            "field '{name}': state shape {:?} != prediction shape {:?}",
            x.shape(),
            v.shape()
        )));
    }
    x.scaled_add(dt, v);
    Ok(v.iter().map(|value| value * value).sum::<f32>().sqrt() * dt)
}
