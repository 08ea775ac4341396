use std::collections::BTreeMap;

use super::Tensor;

/// Latent state owned by the sampler and mutated between steps.
#[derive(Debug, Clone, PartialEq)]
pub enum LatentState {
    Tensor(Tensor),
    Fields(BTreeMap<String, Tensor>),
}

impl LatentState {
    /// Field names when the state is a mapping.
    pub fn field_names(&self) -> Option<Vec<&str>> {
        match self {
            LatentState::Tensor(_) => None,
            LatentState::Fields(fields) => Some(fields.keys().map(String::as_str).collect()),
        }
    }
}

/// Output of one prediction-function call.
///
/// Every view evaluated within a single sampler step must return the same
/// variant with the same field names, length and tensor shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Fields(BTreeMap<String, Tensor>),
    Sequence(Vec<Tensor>),
    Tensor(Tensor),
}

impl Prediction {
    pub fn kind(&self) -> &'static str {
        match self {
            Prediction::Fields(_) => "fields",
            Prediction::Sequence(_) => "sequence",
            Prediction::Tensor(_) => "tensor",
        }
    }

    pub fn field_names(&self) -> Option<Vec<&str>> {
        match self {
            Prediction::Fields(fields) => Some(fields.keys().map(String::as_str).collect()),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Tensor> {
        match self {
            Prediction::Fields(fields) => fields.get(name),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Prediction::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Tensor]> {
        match self {
            Prediction::Sequence(items) => Some(items),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn reports_field_names_for_mappings_only() {
        let mut fields = BTreeMap::new();
        fields.insert("shape".to_string(), ArrayD::zeros(IxDyn(&[2])));
        fields.insert("rotation".to_string(), ArrayD::zeros(IxDyn(&[4])));
        let prediction = Prediction::Fields(fields.clone());
        assert_eq!(prediction.field_names(), Some(vec!["rotation", "shape"]));
        assert_eq!(prediction.kind(), "fields");

        let state = LatentState::Fields(fields);
        assert_eq!(state.field_names(), Some(vec!["rotation", "shape"]));

        let tensor = Prediction::Tensor(ArrayD::zeros(IxDyn(&[3])));
        assert!(tensor.field_names().is_none());
        assert!(LatentState::Tensor(ArrayD::zeros(IxDyn(&[3]))).field_names().is_none());
    }
}
