use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use multiview_core::{
    Arg, CallArgs, ConfigError as SessionConfigError, DynamicsError, DynamicsHandle, LatentState,
    MultiViewConfig, Tensor, ViewMode, ViewObserver, ViewTrace, with_multi_view,
};
use multiview_sampler::{AnchorNetwork, EulerSampler};
use ndarray::{ArrayD, IxDyn};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use thiserror::Error;
use tracing::{Level, event};

use crate::config::{BenchmarkConfig, ConditionLayoutConfig, ResolvedOutputs, StateKind};

/// Field layout of mapping states: name and length (`None` = latent dim).
const FIELD_LAYOUT: [(&str, Option<usize>); 3] =
    [("shape", None), ("rotation", Some(4)), ("translation", Some(3))];

/// Drives one sampling run inside a multi-view session.
pub struct BenchRunner {
    config: BenchmarkConfig,
    outputs: ResolvedOutputs,
    multi_view: MultiViewConfig,
    mode: ViewMode,
}

/// Summary details returned after a run.
#[derive(Debug)]
pub struct RunSummary {
    pub mode: ViewMode,
    pub steps: usize,
    pub views: usize,
    pub rows_written: usize,
    pub coverage: Vec<usize>,
    pub final_means: BTreeMap<String, f32>,
    pub jsonl_path: PathBuf,
    pub summary_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct StepRow<'a> {
    run_id: &'a str,
    mode: &'a str,
    step: usize,
    t: f32,
    views: Vec<usize>,
    update_norm: f32,
}

impl BenchRunner {
    /// Build a runner from a validated configuration.
    pub fn new(config: BenchmarkConfig, outputs: ResolvedOutputs) -> Result<Self, RunnerError> {
        let multi_view = config.multi_view();
        let mode = multi_view.validate()?;
        Ok(Self {
            config,
            outputs,
            multi_view,
            mode,
        })
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    /// Execute the run, streaming one JSONL row per sampler step.
    pub fn run(&self) -> Result<RunSummary, RunnerError> {
        ensure_parent(self.outputs.jsonl.parent())?;
        ensure_parent(self.outputs.summary_md.parent())?;

        let mut rng = StdRng::seed_from_u64(self.config.sampler.seed.unwrap_or(0));
        let initial = self.initial_state(&mut rng);
        let args = self.call_args();

        let network = DynamicsHandle::new(AnchorNetwork::new(self.config.sampler.gain));
        let mut sampler = EulerSampler::new(network, self.config.sampler.num_steps);
        let trace = Rc::new(RefCell::new(ViewTrace::new()));
        let observer: Box<dyn ViewObserver> = Box::new(trace.clone());

        let mut rows = Vec::with_capacity(self.config.sampler.num_steps);
        let finished = with_multi_view(&mut sampler, &self.multi_view, Some(observer), |s| {
            s.sample_with(initial, &args, |record| {
                let views = trace.borrow_mut().take();
                rows.push((record.clone(), views));
            })
        })??;

        let mut writer = BufWriter::new(File::create(&self.outputs.jsonl)?);
        let mut coverage = vec![0usize; self.multi_view.num_views];
        for (record, views) in &rows {
            for &view in views {
                if let Some(slot) = coverage.get_mut(view) {
                    *slot += 1;
                }
            }
            let row = StepRow {
                run_id: &self.config.run_id,
                mode: self.mode.as_str(),
                step: record.step,
                t: record.t,
                views: views.clone(),
                update_norm: record.update_norm,
            };
            serde_json::to_writer(&mut writer, &row)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        let final_means = field_means(&finished);
        event!(
            target: "multiview_bench::run",
            Level::INFO,
            run_id = %self.config.run_id,
            mode = self.mode.as_str(),
            steps = rows.len() as u64,
            "sampling run complete"
        );

        let summary = RunSummary {
            mode: self.mode,
            steps: rows.len(),
            views: self.multi_view.num_views,
            rows_written: rows.len(),
            coverage,
            final_means,
            jsonl_path: self.outputs.jsonl.clone(),
            summary_path: self.outputs.summary_md.clone(),
        };
        write_summary_markdown(&self.config, &summary)?;
        Ok(summary)
    }

    fn initial_state(&self, rng: &mut StdRng) -> LatentState {
        let latent_dim = self.config.sampler.latent_dim;
        match self.config.sampler.state {
            StateKind::Tensor => LatentState::Tensor(noise(rng, latent_dim)),
            StateKind::Fields => LatentState::Fields(
                FIELD_LAYOUT
                    .iter()
                    .map(|(name, len)| (name.to_string(), noise(rng, len.unwrap_or(latent_dim))))
                    .collect(),
            ),
        }
    }

    fn call_args(&self) -> CallArgs {
        let views = &self.config.views;
        let tokens = views.tokens;
        let targets = views.resolved_targets();

        let condition = match views.layout {
            ConditionLayoutConfig::Batch => Arg::Tensor(ArrayD::from_shape_fn(
                IxDyn(&[targets.len(), tokens]),
                |index| targets[index[0]],
            )),
            ConditionLayoutConfig::Sequence => Arg::Sequence(
                targets
                    .iter()
                    .map(|&target| Arg::Tensor(ArrayD::from_elem(IxDyn(&[1, tokens]), target)))
                    .collect(),
            ),
            ConditionLayoutConfig::Shared => {
                let mean = targets.iter().sum::<f32>() / targets.len() as f32;
                Arg::Tensor(ArrayD::from_elem(IxDyn(&[1, tokens]), mean))
            }
        };

        let mut positional = Vec::with_capacity(2);
        if let Some(guidance) = self.config.sampler.guidance {
            positional.push(Arg::Scalar(guidance));
        }
        positional.push(condition);
        CallArgs::new(positional)
    }
}

fn noise(rng: &mut StdRng, len: usize) -> Tensor {
    ArrayD::from_shape_fn(IxDyn(&[len]), |_| rng.gen_range(-1.0f32..1.0))
}

fn field_means(state: &LatentState) -> BTreeMap<String, f32> {
    match state {
        LatentState::Tensor(x) => {
            BTreeMap::from([("<state>".to_string(), x.mean().unwrap_or_default())])
        }
        LatentState::Fields(fields) => fields
            .iter()
            .map(|(name, x)| (name.clone(), x.mean().unwrap_or_default()))
            .collect(),
    }
}

fn ensure_parent(path: Option<&Path>) -> Result<(), RunnerError> {
    if let Some(dir) = path.filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn write_summary_markdown(
    config: &BenchmarkConfig,
    summary: &RunSummary,
) -> Result<(), RunnerError> {
    let mut output = String::new();
    output.push_str(&format!("# Run Summary: {}\n\n", config.run_id));
    output.push_str(&format!("- Mode: {}\n", summary.mode));
    output.push_str(&format!("- Steps: {}\n", summary.steps));
    output.push_str(&format!("- Views: {}\n", summary.views));
    output.push_str(&format!("- Layout: {:?}\n", config.views.layout));
    output.push_str(&format!("- Targets: {:?}\n", config.views.resolved_targets()));
    output.push('\n');

    output.push_str("## View Coverage\n");
    for (view, count) in summary.coverage.iter().enumerate() {
        output.push_str(&format!("- view {}: {} calls\n", view, count));
    }
    output.push('\n');

    output.push_str("## Final Field Means\n");
    output.push_str("| Field | Mean | Policy |\n|---|---|---|\n");
    for (name, mean) in &summary.final_means {
        let policy = if summary.mode == ViewMode::Stochastic {
            "selected view"
        } else if config.views.pose_fields.is_pose_field(name) {
            "view 0"
        } else {
            "averaged"
        };
        output.push_str(&format!("| {} | {:.4} | {} |\n", name, mean, policy));
    }

    fs::write(&summary.summary_path, output)?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid multi-view configuration: {0}")]
    Session(#[from] SessionConfigError),
    #[error("sampling failed: {0}")]
    Dynamics(#[from] DynamicsError),
}
