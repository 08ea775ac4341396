use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse telemetry JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize)]
pub struct TelemetrySummary {
    pub views: ViewTelemetrySummary,
    /// Warning events keyed by tracing target.
    pub warnings: BTreeMap<String, usize>,
}

#[derive(Debug, Default, Serialize)]
pub struct ViewTelemetrySummary {
    pub count: usize,
    pub per_view: BTreeMap<u64, usize>,
    pub modes: BTreeMap<String, usize>,
}

/// Aggregate per-view and warning events from a JSON tracing log.
pub fn summarise_telemetry(path: &Path) -> Result<TelemetrySummary, TelemetryError> {
    if !path.exists() {
        return Ok(TelemetrySummary::default());
    }

    let file = File::open(path).map_err(|source| TelemetryError::Io {
        context: "opening telemetry log",
        source,
    })?;
    let reader = BufReader::new(file);

    let mut summary = TelemetrySummary::default();

    for line in reader.lines() {
        let line = line.map_err(|source| TelemetryError::Io {
            context: "reading telemetry line",
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let payload: Value = serde_json::from_str(&line)?;
        let target = payload
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let level = payload
            .get("level")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let fields = payload
            .get("fields")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        if level.eq_ignore_ascii_case("warn") {
            *summary.warnings.entry(target.to_string()).or_insert(0) += 1;
        }

        if target == "multiview::view" {
            summary.views.count += 1;
            if let Some(view) = fields.get("view_index").and_then(Value::as_u64) {
                *summary.views.per_view.entry(view).or_insert(0) += 1;
            }
            let mode = fields
                .get("mode")
                .and_then(Value::as_str)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .unwrap_or("<unset>");
            *summary.views.modes.entry(mode.to_string()).or_insert(0) += 1;
        }
    }

    Ok(summary)
}

pub fn write_summary_outputs(
    telemetry_path: &Path,
    output_dir: &Path,
) -> Result<Option<TelemetryOutputs>, TelemetryError> {
    if !telemetry_path.exists() {
        return Ok(None);
    }

    let summary = summarise_telemetry(telemetry_path)?;
    let json_path = output_dir.join("telemetry_summary.json");
    let md_path = output_dir.join("telemetry_summary.md");

    std::fs::write(
        &json_path,
        serde_json::to_vec_pretty(&summary).map_err(TelemetryError::from)?,
    )
    .map_err(|source| TelemetryError::Io {
        context: "writing telemetry summary json",
        source,
    })?;

    let markdown = render_markdown(&summary, telemetry_path);
    std::fs::write(&md_path, markdown).map_err(|source| TelemetryError::Io {
        context: "writing telemetry summary markdown",
        source,
    })?;

    Ok(Some(TelemetryOutputs {
        summary,
        json_path,
        markdown_path: md_path,
    }))
}

pub fn append_highlights_to_markdown(
    summary_path: &Path,
    outputs: &TelemetryOutputs,
) -> Result<(), TelemetryError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(summary_path)
        .map_err(|source| TelemetryError::Io {
            context: "opening summary markdown for telemetry append",
            source,
        })?;

    let mut section = String::new();
    section.push_str("\n## Telemetry Highlights\n");
    let views = &outputs.summary.views;
    section.push_str(&format!("- View events captured: {}\n", views.count));
    for (view, count) in &views.per_view {
        section.push_str(&format!("  - view {}: {}\n", view, count));
    }
    if outputs.summary.warnings.is_empty() {
        section.push_str("- Warnings: none\n");
    } else {
        section.push_str("- Warnings:\n");
        for (target, count) in &outputs.summary.warnings {
            section.push_str(&format!("  - {}: {}\n", target, count));
        }
    }

    write!(file, "{section}").map_err(|source| TelemetryError::Io {
        context: "writing telemetry highlights",
        source,
    })?;

    Ok(())
}

fn render_markdown(summary: &TelemetrySummary, telemetry_path: &Path) -> String {
    let mut output = String::new();
    output.push_str("# Telemetry Summary\n\n");
    output.push_str(&format!("- Source: `{}`\n", telemetry_path.display()));
    output.push('\n');

    output.push_str("## View Invocations\n");
    output.push_str(&format!("- Events: {}\n", summary.views.count));
    if !summary.views.modes.is_empty() {
        output.push_str("- Modes:\n");
        for (mode, count) in &summary.views.modes {
            output.push_str(&format!("  - {}: {}\n", mode, count));
        }
    }
    if !summary.views.per_view.is_empty() {
        output.push_str("- Per view:\n");
        for (view, count) in &summary.views.per_view {
            output.push_str(&format!("  - {}: {}\n", view, count));
        }
    }
    output.push('\n');

    output.push_str("## Warnings\n");
    if summary.warnings.is_empty() {
        output.push_str("- <none>\n");
    } else {
        for (target, count) in &summary.warnings {
            output.push_str(&format!("- {}: {}\n", target, count));
        }
    }
    output
}

#[derive(Debug)]
pub struct TelemetryOutputs {
    pub summary: TelemetrySummary,
    pub json_path: PathBuf,
    pub markdown_path: PathBuf,
}
