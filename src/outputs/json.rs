//! JSON run reports.
//!
//! One file per batch, grouped by the local date the batch was generated:
//! `{report_dir}/{date}/{HH-MM-SS}.json`.

use crate::models::BatchReport;
use chrono::{DateTime, Local};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Path a report lands at, derived from its `generated_at` timestamp.
///
/// Falls back to the current time when the timestamp does not parse.
pub fn report_path(report: &BatchReport, report_dir: &Path) -> PathBuf {
    let generated = DateTime::parse_from_rfc3339(&report.generated_at)
        .map(|t| t.with_timezone(&Local))
        .unwrap_or_else(|_| Local::now());
    report_dir
        .join(generated.format("%Y-%m-%d").to_string())
        .join(format!("{}.json", generated.format("%H-%M-%S")))
}

/// Serialize `report` under `report_dir` and return the written path.
#[instrument(level = "info", skip_all, fields(report_dir = %report_dir.display()))]
pub async fn write_report(
    report: &BatchReport,
    report_dir: &Path,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;
    let path = report_path(report, report_dir);

    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create report dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote run report");
    Ok(path)
}
