//! Toy conditioned velocity field that pulls every latent field toward
//! the mean of its conditioning tokens.

use multiview_core::{Arg, CallArgs, Dynamics, DynamicsError, LatentState, Prediction, Tensor};

#[derive(Debug, Clone)]
pub struct AnchorNetwork {
    gain: f32,
    calls: usize,
}

impl Default for AnchorNetwork {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl AnchorNetwork {
    pub fn new(gain: f32) -> Self {
        Self { gain, calls: 0 }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Anchor value encoded by a conditioning argument.
    pub fn anchor(arg: Option<&Arg>) -> Result<f32, DynamicsError> {
        match arg {
            None => Ok(0.0),
            Some(Arg::Tensor(tensor)) => tensor
                .mean()
                .ok_or_else(|| DynamicsError::network("empty conditioning tensor")),
            Some(Arg::Sequence(items)) => {
                let anchors = items
                    .iter()
                    .map(|item| Self::anchor(Some(item)))
                    .collect::<Result<Vec<_>, _>>()?;
                if anchors.is_empty() {
                    return Err(DynamicsError::network("empty conditioning sequence"));
                }
                Ok(anchors.iter().sum::<f32>() / anchors.len() as f32)
            }
            Some(Arg::Scalar(value)) => Ok(*value as f32),
            Some(Arg::Text(text)) => Err(DynamicsError::network(format!(
                "cannot encode text conditioning '{text}'"
            ))),
        }
    }

    /// Conditioning sits after a leading `Arg::Scalar`, otherwise first.
    ///
    /// Per-view slices such as `[1, 1]` tensors are one-element but are
    /// still conditioning, so only a bare scalar counts as a side payload.
    fn condition_index(args: &CallArgs) -> usize {
        match args.positional.first() {
            Some(Arg::Scalar(_)) => 1,
            _ => 0,
        }
    }

    fn velocity(&self, x: &Tensor, anchor: f32) -> Tensor {
        x.mapv(|value| self.gain * (anchor - value))
    }
}

impl Dynamics for AnchorNetwork {
    fn predict(
        &mut self,
        state: &LatentState,
        _time: &Tensor,
        args: &CallArgs,
    ) -> Result<Prediction, DynamicsError> {
        self.calls += 1;
        let anchor = Self::anchor(args.positional.get(Self::condition_index(args)))?;
        Ok(match state {
            LatentState::Tensor(x) => Prediction::Tensor(self.velocity(x, anchor)),
            LatentState::Fields(fields) => Prediction::Fields(
                fields
                    .iter()
                    .map(|(name, x)| (name.clone(), self.velocity(x, anchor)))
                    .collect(),
            ),
        })
    }
}
