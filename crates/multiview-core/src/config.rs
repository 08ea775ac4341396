use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pose::PoseFieldSet;

/// Multi-view policy applied to the wrapped prediction function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// One view per step, chosen round-robin.
    Stochastic,
    /// Every view each step, fused into one prediction.
    #[default]
    Multidiffusion,
}

impl ViewMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ViewMode::Stochastic => "stochastic",
            ViewMode::Multidiffusion => "multidiffusion",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stochastic" => Ok(ViewMode::Stochastic),
            "multidiffusion" => Ok(ViewMode::Multidiffusion),
            other => Err(ConfigError::UnsupportedMode(other.to_string())),
        }
    }
}

/// Session configuration. `mode` stays a raw string until the session
/// starts so an unknown policy is rejected at entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiViewConfig {
    pub num_views: usize,
    pub num_steps: usize,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub pose_fields: PoseFieldSet,
}

impl MultiViewConfig {
    pub fn new(num_views: usize, num_steps: usize, mode: impl Into<String>) -> Self {
        Self {
            num_views,
            num_steps,
            mode: mode.into(),
            pose_fields: PoseFieldSet::default(),
        }
    }

    pub fn with_pose_fields(mut self, pose_fields: PoseFieldSet) -> Self {
        self.pose_fields = pose_fields;
        self
    }

    /// Parse the mode and check counts without touching any generator.
    pub fn validate(&self) -> Result<ViewMode, ConfigError> {
        let mode = self.mode.parse::<ViewMode>()?;
        if self.num_views == 0 {
            return Err(ConfigError::InvalidField {
                field: "num_views".to_string(),
                message: "number of views must be at least 1".to_string(),
            });
        }
        if self.num_steps == 0 {
            return Err(ConfigError::InvalidField {
                field: "num_steps".to_string(),
                message: "number of steps must be at least 1".to_string(),
            });
        }
        Ok(mode)
    }
}

fn default_mode() -> String {
    ViewMode::default().as_str().to_string()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unsupported mode: {0}")]
    UnsupportedMode(String),
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modes() {
        assert_eq!("stochastic".parse::<ViewMode>(), Ok(ViewMode::Stochastic));
        assert_eq!(
            "multidiffusion".parse::<ViewMode>(),
            Ok(ViewMode::Multidiffusion)
        );
        assert_eq!(ViewMode::Stochastic.to_string(), "stochastic");
    }

    #[test]
    fn unknown_mode_names_the_offender() {
        let err = MultiViewConfig::new(2, 10, "ensemble")
            .validate()
            .expect_err("unknown mode");
        assert_eq!(err, ConfigError::UnsupportedMode("ensemble".to_string()));
        assert!(err.to_string().contains("ensemble"));
    }

    #[test]
    fn rejects_zero_counts() {
        let err = MultiViewConfig::new(0, 10, "stochastic")
            .validate()
            .expect_err("zero views");
        assert!(matches!(err, ConfigError::InvalidField { field, .. } if field == "num_views"));

        let err = MultiViewConfig::new(2, 0, "multidiffusion")
            .validate()
            .expect_err("zero steps");
        assert!(matches!(err, ConfigError::InvalidField { field, .. } if field == "num_steps"));
    }

    #[test]
    fn loads_from_yaml_with_defaults() {
        let yaml = "num_views: 3\nnum_steps: 25\n";
        let cfg: MultiViewConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(cfg.validate(), Ok(ViewMode::Multidiffusion));
        assert!(cfg.pose_fields.is_pose_field("quaternion"));

        let yaml = "num_views: 2\nnum_steps: 4\nmode: stochastic\npose_fields: [yaw]\n";
        let cfg: MultiViewConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(cfg.validate(), Ok(ViewMode::Stochastic));
        assert!(cfg.pose_fields.is_pose_field("yaw"));
        assert!(!cfg.pose_fields.is_pose_field("rotation"));
    }
}
