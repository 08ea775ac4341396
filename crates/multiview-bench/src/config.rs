use multiview_core::{MultiViewConfig, PoseFieldSet, ViewMode};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

const DEFAULT_TOKENS_PER_VIEW: usize = 4;
const DEFAULT_GAIN: f32 = 1.0;
const RUN_ID_ALLOWED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";

/// Root benchmark configuration loaded from YAML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BenchmarkConfig {
    pub run_id: String,
    pub sampler: SamplerConfig,
    pub views: ViewsConfig,
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BenchmarkConfig {
    /// Load configuration from a YAML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        let mut cfg: BenchmarkConfig =
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
                source,
                path: path_buf.clone(),
            })?;
        cfg.validate().map_err(|source| ConfigError::Invalid {
            path: path_buf,
            source,
        })?;
        Ok(cfg)
    }

    /// Validate the configuration without performing I/O.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        validate_run_id(&self.run_id)?;
        self.sampler.validate()?;
        self.views.validate()?;
        self.outputs.validate(&self.run_id)?;
        self.logging.normalize();
        Ok(())
    }

    /// Session configuration handed to the multi-view core.
    pub fn multi_view(&self) -> MultiViewConfig {
        MultiViewConfig::new(self.views.count, self.sampler.num_steps, self.views.mode.clone())
            .with_pose_fields(self.views.pose_fields.clone())
    }

    /// Resolve output templates (e.g., `{run_id}` placeholders) into concrete paths.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        ResolvedOutputs {
            jsonl: resolve_template(&self.run_id, &self.outputs.jsonl),
            summary_md: resolve_template(&self.run_id, &self.outputs.summary_md),
        }
    }
}

/// Reference sampler settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SamplerConfig {
    pub num_steps: usize,
    pub latent_dim: usize,
    pub seed: Option<u64>,
    #[serde(default)]
    pub state: StateKind,
    /// Leading scalar argument passed ahead of the conditioning.
    #[serde(default)]
    pub guidance: Option<f64>,
    #[serde(default = "default_gain")]
    pub gain: f32,
}

impl SamplerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.num_steps == 0 {
            return Err(ValidationError::InvalidField {
                field: "sampler.num_steps".to_string(),
                message: "number of steps must be greater than zero".to_string(),
            });
        }

        if self.latent_dim == 0 {
            return Err(ValidationError::InvalidField {
                field: "sampler.latent_dim".to_string(),
                message: "latent dimension must be greater than zero".to_string(),
            });
        }

        if !self.gain.is_finite() || self.gain <= 0.0 {
            return Err(ValidationError::InvalidField {
                field: "sampler.gain".to_string(),
                message: "gain must be a positive finite number".to_string(),
            });
        }

        Ok(())
    }
}

fn default_gain() -> f32 {
    DEFAULT_GAIN
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Tensor,
    #[default]
    Fields,
}

/// How per-view conditioning is packed into the sampler arguments.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionLayoutConfig {
    /// One tensor whose leading axis indexes views.
    #[default]
    Batch,
    /// A sequence with one tensor per view.
    Sequence,
    /// A single tensor shared by every view.
    Shared,
}

/// Multi-view settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ViewsConfig {
    pub count: usize,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub layout: ConditionLayoutConfig,
    #[serde(default = "default_tokens")]
    pub tokens: usize,
    /// Anchor value encoded by each view; defaults to `1..=count`.
    #[serde(default)]
    pub targets: Option<Vec<f32>>,
    #[serde(default)]
    pub pose_fields: PoseFieldSet,
}

impl ViewsConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.count == 0 {
            return Err(ValidationError::InvalidField {
                field: "views.count".to_string(),
                message: "at least one view must be configured".to_string(),
            });
        }

        if self.tokens == 0 {
            return Err(ValidationError::InvalidField {
                field: "views.tokens".to_string(),
                message: "tokens per view must be greater than zero".to_string(),
            });
        }

        if let Err(err) = self.mode.parse::<ViewMode>() {
            return Err(ValidationError::InvalidField {
                field: "views.mode".to_string(),
                message: err.to_string(),
            });
        }

        if let Some(targets) = self.targets.as_ref() {
            if targets.len() != self.count {
                return Err(ValidationError::InvalidField {
                    field: "views.targets".to_string(),
                    message: format!(
                        "expected {} targets (one per view), found {}",
                        self.count,
                        targets.len()
                    ),
                });
            }
            if targets.iter().any(|value| !value.is_finite()) {
                return Err(ValidationError::InvalidField {
                    field: "views.targets".to_string(),
                    message: "targets must be finite".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn resolved_targets(&self) -> Vec<f32> {
        self.targets
            .clone()
            .unwrap_or_else(|| (1..=self.count).map(|view| view as f32).collect())
    }
}

fn default_mode() -> String {
    ViewMode::default().to_string()
}

fn default_tokens() -> usize {
    DEFAULT_TOKENS_PER_VIEW
}

/// Output artifact configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputsConfig {
    pub jsonl: String,
    pub summary_md: String,
}

impl OutputsConfig {
    fn validate(&self, run_id: &str) -> Result<(), ValidationError> {
        for (label, value) in [
            ("outputs.jsonl", &self.jsonl),
            ("outputs.summary_md", &self.summary_md),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "path must not be empty".to_string(),
                });
            }

            let resolved = resolve_template(run_id, value);
            if resolved.components().count() == 0 {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "resolved path is invalid".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Logging configuration defaults to disabled structured logs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable_structured: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_structured: false,
            tracing_level: default_tracing_level(),
        }
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        if self.tracing_level.trim().is_empty() {
            self.tracing_level = default_tracing_level();
        }
    }

    pub fn level(&self) -> Option<Level> {
        match self.tracing_level.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn validate_run_id(run_id: &str) -> Result<(), ValidationError> {
    if run_id.trim().is_empty() {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id must not be empty".to_string(),
        });
    }

    if !run_id.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id may only contain alphanumeric characters, '.', '_' or '-'".to_string(),
        });
    }

    Ok(())
}

fn resolve_template(run_id: &str, template: &str) -> PathBuf {
    let replaced = template.replace("{run_id}", run_id);
    PathBuf::from(replaced)
}

/// Fully resolved output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub jsonl: PathBuf,
    pub summary_md: PathBuf,
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("invalid configuration in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path.as_path(),
        }
    }
}

/// Validation failures captured with contextual metadata.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}
