//! Classification of named prediction fields into pose and blendable fields.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Rigid-pose field names that are never averaged across views.
pub const POSE_FIELDS: [&str; 7] = [
    "translation",
    "rotation",
    "scale",
    "translation_scale",
    "6drotation",
    "6drotation_normalized",
    "quaternion",
];

/// Exact-match test against the default [`POSE_FIELDS`].
pub fn is_pose_field(name: &str) -> bool {
    POSE_FIELDS.contains(&name)
}

/// Set of field names treated as pose quantities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseFieldSet {
    fields: BTreeSet<String>,
}

impl Default for PoseFieldSet {
    fn default() -> Self {
        Self::with_fields(POSE_FIELDS)
    }
}

impl PoseFieldSet {
    pub fn with_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn extend<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
    }

    pub fn is_pose_field(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }
}
