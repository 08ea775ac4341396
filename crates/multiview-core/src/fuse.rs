//! Merging per-view predictions into one prediction per sampler step.

use std::collections::BTreeMap;

use ndarray::{ArrayViewD, Axis};

use crate::dynamics::DynamicsError;
use crate::model::Tensor;
use crate::model::prediction::Prediction;
use crate::pose::PoseFieldSet;

/// Fuses view predictions: pose fields come from view 0, everything else
/// is averaged across views.
#[derive(Debug, Clone, Default)]
pub struct PredictionFuser {
    pose_fields: PoseFieldSet,
}

impl PredictionFuser {
    pub fn new(pose_fields: PoseFieldSet) -> Self {
        Self { pose_fields }
    }

    pub fn pose_fields(&self) -> &PoseFieldSet {
        &self.pose_fields
    }

    pub fn fuse(&self, predictions: Vec<Prediction>) -> Result<Prediction, DynamicsError> {
        let mut predictions = predictions.into_iter();
        let Some(first) = predictions.next() else {
            return Err(DynamicsError::mismatch(0, "no view predictions to fuse"));
        };
        let rest: Vec<Prediction> = predictions.collect();

        match first {
            Prediction::Fields(first) => {
                let others = rest
                    .iter()
                    .enumerate()
                    .map(|(idx, pred)| match pred {
                        Prediction::Fields(fields) => Ok(fields),
                        other => Err(variant_mismatch(idx + 1, "fields", other)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.fuse_fields(first, &others).map(Prediction::Fields)
            }
            Prediction::Sequence(first) => {
                let others = rest
                    .iter()
                    .enumerate()
                    .map(|(idx, pred)| match pred {
                        Prediction::Sequence(items) if items.len() == first.len() => Ok(items),
                        Prediction::Sequence(items) => Err(DynamicsError::mismatch(
                            idx + 1,
                            format!("sequence length {} != {}", items.len(), first.len()),
                        )),
                        other => Err(variant_mismatch(idx + 1, "sequence", other)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let fused = first
                    .iter()
                    .enumerate()
                    .map(|(pos, head)| {
                        let column: Vec<&Tensor> = others.iter().map(|items| &items[pos]).collect();
                        stack_mean(head, &column)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Prediction::Sequence(fused))
            }
            Prediction::Tensor(first) => {
                let others = rest
                    .iter()
                    .enumerate()
                    .map(|(idx, pred)| match pred {
                        Prediction::Tensor(tensor) => Ok(tensor),
                        other => Err(variant_mismatch(idx + 1, "tensor", other)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                stack_mean(&first, &others).map(Prediction::Tensor)
            }
        }
    }

    fn fuse_fields(
        &self,
        first: BTreeMap<String, Tensor>,
        others: &[&BTreeMap<String, Tensor>],
    ) -> Result<BTreeMap<String, Tensor>, DynamicsError> {
        let mut fused = BTreeMap::new();
        for (name, head) in first {
            let column = others
                .iter()
                .enumerate()
                .map(|(idx, fields)| {
                    fields.get(&name).ok_or_else(|| {
                        DynamicsError::mismatch(idx + 1, format!("missing field '{name}'"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let value = if self.pose_fields.is_pose_field(&name) {
                // Stack anyway so shape disagreements still surface.
                stack(&head, &column)?;
                head
            } else {
                stack_mean(&head, &column)?
            };
            fused.insert(name, value);
        }
        Ok(fused)
    }
}

fn variant_mismatch(view: usize, expected: &str, found: &Prediction) -> DynamicsError {
    DynamicsError::mismatch(view, format!("expected {expected}, found {}", found.kind()))
}

fn stack(head: &Tensor, rest: &[&Tensor]) -> Result<Tensor, DynamicsError> {
    let mut views: Vec<ArrayViewD<'_, f32>> = Vec::with_capacity(rest.len() + 1);
    views.push(head.view());
    views.extend(rest.iter().map(|tensor| tensor.view()));
    Ok(ndarray::stack(Axis(0), &views)?)
}

fn stack_mean(head: &Tensor, rest: &[&Tensor]) -> Result<Tensor, DynamicsError> {
    stack(head, rest)?
        .mean_axis(Axis(0))
        .ok_or_else(|| DynamicsError::mismatch(0, "empty view axis"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn, arr0, arr1};

    fn vector(values: &[f32]) -> Tensor {
        arr1(values).into_dyn()
    }

    fn fields(entries: &[(&str, Tensor)]) -> Prediction {
        Prediction::Fields(
            entries
                .iter()
                .map(|(name, tensor)| (name.to_string(), tensor.clone()))
                .collect(),
        )
    }

    #[test]
    fn averages_shape_and_keeps_view_zero_pose() {
        let preds = vec![
            fields(&[("shape", vector(&[1.0, 2.0])), ("rotation", vector(&[0.1, 0.2]))]),
            fields(&[("shape", vector(&[3.0, 4.0])), ("rotation", vector(&[9.0, 9.0]))]),
            fields(&[("shape", vector(&[5.0, 9.0])), ("rotation", vector(&[7.0, 7.0]))]),
        ];
        let fused = PredictionFuser::default().fuse(preds).expect("fuse");
        assert_eq!(fused.field("shape"), Some(&vector(&[3.0, 5.0])));
        assert_eq!(fused.field("rotation"), Some(&vector(&[0.1, 0.2])));
    }

    #[test]
    fn scalar_tensors_average() {
        let preds = vec![
            Prediction::Tensor(arr0(2.0).into_dyn()),
            Prediction::Tensor(arr0(4.0).into_dyn()),
        ];
        let fused = PredictionFuser::default().fuse(preds).expect("fuse");
        assert_eq!(fused, Prediction::Tensor(arr0(3.0).into_dyn()));
    }

    #[test]
    fn sequences_average_every_position() {
        let preds = vec![
            Prediction::Sequence(vec![vector(&[0.0]), vector(&[10.0])]),
            Prediction::Sequence(vec![vector(&[2.0]), vector(&[20.0])]),
        ];
        let fused = PredictionFuser::default().fuse(preds).expect("fuse");
        assert_eq!(
            fused,
            Prediction::Sequence(vec![vector(&[1.0]), vector(&[15.0])])
        );
    }

    #[test]
    fn single_view_is_returned_unchanged() {
        let pred = fields(&[("shape", vector(&[1.5])), ("translation", vector(&[2.5]))]);
        let fused = PredictionFuser::default().fuse(vec![pred.clone()]).expect("fuse");
        assert_eq!(fused, pred);
    }

    #[test]
    fn custom_pose_set_changes_blending() {
        let fuser = PredictionFuser::new(PoseFieldSet::with_fields(["shape"]));
        let preds = vec![
            fields(&[("shape", vector(&[1.0])), ("rotation", vector(&[1.0]))]),
            fields(&[("shape", vector(&[3.0])), ("rotation", vector(&[3.0]))]),
        ];
        let fused = fuser.fuse(preds).expect("fuse");
        assert_eq!(fused.field("shape"), Some(&vector(&[1.0])));
        assert_eq!(fused.field("rotation"), Some(&vector(&[2.0])));
    }

    #[test]
    fn mismatched_structure_is_an_error() {
        let fuser = PredictionFuser::default();

        let mixed = vec![
            Prediction::Tensor(vector(&[1.0])),
            fields(&[("shape", vector(&[1.0]))]),
        ];
        assert!(matches!(
            fuser.fuse(mixed),
            Err(DynamicsError::StructureMismatch { view: 1, .. })
        ));

        let missing = vec![
            fields(&[("shape", vector(&[1.0])), ("rotation", vector(&[1.0]))]),
            fields(&[("shape", vector(&[1.0]))]),
        ];
        assert!(matches!(
            fuser.fuse(missing),
            Err(DynamicsError::StructureMismatch { view: 1, .. })
        ));

        let shapes = vec![
            Prediction::Tensor(vector(&[1.0, 2.0])),
            Prediction::Tensor(ArrayD::zeros(IxDyn(&[3]))),
        ];
        assert!(matches!(fuser.fuse(shapes), Err(DynamicsError::Shape(_))));

        let pose_shapes = vec![
            fields(&[("rotation", vector(&[1.0, 2.0]))]),
            fields(&[("rotation", vector(&[1.0]))]),
        ];
        assert!(matches!(fuser.fuse(pose_shapes), Err(DynamicsError::Shape(_))));

        assert!(fuser.fuse(Vec::new()).is_err());
    }
}
