use std::collections::BTreeMap;

use super::Tensor;

/// One argument forwarded by the sampler to its prediction function.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Scalar(f64),
    Tensor(Tensor),
    Sequence(Vec<Arg>),
    Text(String),
}

impl Arg {
    /// Bare numbers and single-element tensors are treated as side payloads
    /// rather than conditioning.
    pub fn is_scalar_like(&self) -> bool {
        match self {
            Arg::Scalar(_) => true,
            Arg::Tensor(tensor) => tensor.len() == 1,
            Arg::Sequence(_) | Arg::Text(_) => false,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Arg::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    /// Short description used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Arg::Scalar(value) => format!("scalar({value})"),
            Arg::Tensor(tensor) => format!("tensor{:?}", tensor.shape()),
            Arg::Sequence(items) => format!("sequence(len={})", items.len()),
            Arg::Text(text) => format!("text(len={})", text.len()),
        }
    }
}

impl From<Tensor> for Arg {
    fn from(tensor: Tensor) -> Self {
        Arg::Tensor(tensor)
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Scalar(value)
    }
}

impl From<&str> for Arg {
    fn from(text: &str) -> Self {
        Arg::Text(text.to_string())
    }
}

/// Positional and keyword arguments of a single prediction call.
///
/// The sampler passes the same `CallArgs` every step; wrappers build
/// per-view copies and never mutate the original.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Arg>,
    pub keyword: BTreeMap<String, Arg>,
}

impl CallArgs {
    pub fn new(positional: Vec<Arg>) -> Self {
        Self {
            positional,
            keyword: BTreeMap::new(),
        }
    }

    pub fn with_keyword(mut self, name: impl Into<String>, value: impl Into<Arg>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    /// Copy of these arguments with the positional entry at `position`
    /// replaced by `value`.
    pub fn with_positional(&self, position: usize, value: Arg) -> Self {
        let mut positional = Vec::with_capacity(self.positional.len().max(position + 1));
        positional.extend_from_slice(&self.positional[..position.min(self.positional.len())]);
        positional.push(value);
        if position < self.positional.len() {
            positional.extend_from_slice(&self.positional[position + 1..]);
        }
        Self {
            positional,
            keyword: self.keyword.clone(),
        }
    }
}
