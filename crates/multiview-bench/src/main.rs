use std::path::PathBuf;

use clap::Parser;

use multiview_bench::config::{BenchmarkConfig, ResolvedOutputs};
use multiview_bench::logging::{init_logging, telemetry_dir};
use multiview_bench::runner::BenchRunner;
use multiview_bench::telemetry::{append_highlights_to_markdown, write_summary_outputs};

/// Multi-view sampling harness for the reference Euler sampler.
#[derive(Debug, Parser)]
#[command(
    name = "multiview-bench",
    author,
    version,
    about = "Deterministic multi-view sampling harness"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "bench/bench.yaml")]
    config: PathBuf,

    /// Override the run identifier (substitutes {run_id} templates).
    #[arg(long, value_name = "RUN_ID")]
    run_id: Option<String>,

    /// Override the number of sampler steps.
    #[arg(long, value_name = "STEPS")]
    steps: Option<usize>,

    /// Override the number of views (clears explicit targets of another length).
    #[arg(long, value_name = "COUNT")]
    views: Option<usize>,

    /// Override the multi-view mode (stochastic or multidiffusion).
    #[arg(long, value_name = "MODE")]
    mode: Option<String>,

    /// Override the RNG seed for the initial latent.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Exit after validating the configuration (no sampling is run).
    #[arg(long)]
    validate_only: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = BenchmarkConfig::from_path(&cli.config)?;

    if let Some(run_id) = cli.run_id {
        config.run_id = run_id;
    }

    if let Some(steps) = cli.steps {
        config.sampler.num_steps = steps;
    }

    if let Some(views) = cli.views {
        config.views.count = views;
        if config
            .views
            .targets
            .as_ref()
            .is_some_and(|targets| targets.len() != views)
        {
            config.views.targets = None;
        }
    }

    if let Some(mode) = cli.mode {
        config.views.mode = mode;
    }

    if let Some(seed) = cli.seed {
        config.sampler.seed = Some(seed);
    }

    config.validate()?;

    let outputs: ResolvedOutputs = config.resolved_outputs();
    let run_id = config.run_id.clone();
    let views = config.views.count;
    let steps = config.sampler.num_steps;

    println!(
        "Loaded configuration '{run_id}' with {views} view{} ({steps} steps, mode {})",
        if views == 1 { "" } else { "s" },
        config.views.mode
    );

    let logging_guard = init_logging(&config.logging, &outputs)?;
    let runner = BenchRunner::new(config, outputs.clone())?;

    if cli.validate_only {
        println!("Validation-only mode: sampling skipped.");
        return Ok(());
    }

    let summary = runner.run()?;
    println!(
        "Sampling complete for '{run_id}': {} steps × {} views ({}) → {} rows at {}",
        summary.steps,
        summary.views,
        summary.mode,
        summary.rows_written,
        summary.jsonl_path.display()
    );
    println!("Summary table: {}", summary.summary_path.display());
    println!("View coverage: {:?}", summary.coverage);

    // Dropping the guard flushes the non-blocking writer before the log is read back.
    let telemetry_path = logging_guard.map(|guard| guard.telemetry_path.clone());
    if let Some(path) = telemetry_path {
        println!("Telemetry log: {}", path.display());
        if let Some(outputs) = write_summary_outputs(&path, &telemetry_dir(&outputs))? {
            append_highlights_to_markdown(&summary.summary_path, &outputs)?;
            println!("Telemetry summary (JSON): {}", outputs.json_path.display());
            println!(
                "Telemetry summary (Markdown): {}",
                outputs.markdown_path.display()
            );
            println!(
                "  View events: {} across {} views",
                outputs.summary.views.count,
                outputs.summary.views.per_view.len()
            );
        }
    }

    Ok(())
}
