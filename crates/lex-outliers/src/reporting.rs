//! Before/after reports for a pipeline run.
//!
//! [`RemovalReport`] can be rendered as a two-column name/value table for
//! terminal output, printed as JSON, or written to a JSON file.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;
use crate::types::{PipelineResult, StageSummary};

/// Summary of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalReport {
    pub generated_at: String,
    pub dataset: String,
    pub row_count_before: usize,
    pub row_count_after: usize,
    pub rows_removed: usize,
    pub rows_removed_percentage: f32,
    pub cancelled: bool,
    pub duration_ms: u64,
    pub stages: Vec<StageSummary>,
}

impl RemovalReport {
    pub fn from_result(result: &PipelineResult) -> Self {
        Self {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            dataset: result.dataset.name().to_string(),
            row_count_before: result.row_count_before,
            row_count_after: result.row_count_after,
            rows_removed: result.rows_removed(),
            rows_removed_percentage: result.rows_removed_percentage(),
            cancelled: result.cancelled,
            duration_ms: result.duration_ms,
            stages: result.stages.clone(),
        }
    }

    /// Name/value rows, overall counts first, then one row per stage.
    pub fn to_table(&self) -> Vec<(String, String)> {
        let mut table = vec![
            ("Dataset".to_string(), self.dataset.clone()),
            ("Rows before".to_string(), self.row_count_before.to_string()),
            ("Rows after".to_string(), self.row_count_after.to_string()),
            (
                "Rows removed".to_string(),
                format!(
                    "{} ({:.2}%)",
                    self.rows_removed, self.rows_removed_percentage
                ),
            ),
        ];
        for stage in &self.stages {
            table.push((
                format!("Stage {} ({})", stage.stage_index + 1, stage.model),
                format!(
                    "{}, {} iterations, {} -> {} rows",
                    stage.outcome.as_str(),
                    stage.iterations,
                    stage.rows_before,
                    stage.rows_after
                ),
            ));
        }
        if self.cancelled {
            table.push(("Status".to_string(), "cancelled".to_string()));
        }
        table
    }

    /// Render [`to_table`](Self::to_table) with the name column padded.
    pub fn format_table(&self) -> String {
        let table = self.to_table();
        let width = table.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
        table
            .iter()
            .map(|(name, value)| format!("{:<width$}  {}", name, value, width = width))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Write the report as pretty JSON to `<dir>/<stem>_report.json`.
    pub fn write_json(&self, dir: &Path, stem: &str) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;

        let report_path = dir.join(format!("{}_report.json", stem));
        let mut file = File::create(&report_path)?;
        file.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;

        info!("Report saved: {}", report_path.display());
        Ok(report_path)
    }
}
