use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{OutlierError, Result};

/// One training example: a feature vector and a numeric target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub features: Vec<f64>,
    pub target: f64,
}

impl Row {
    pub fn new(features: Vec<f64>, target: f64) -> Self {
        Self { features, target }
    }
}

/// An ordered, named table of rows.
///
/// A `Dataset` is never mutated once built. Removing rows yields a new
/// `Dataset` holding the survivors in their original relative order, so a
/// dataset handed to concurrently running fold tasks cannot change under them.
///
/// Deserializing goes through [`Dataset::new`], so the same checks apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataset")]
pub struct Dataset {
    name: String,
    rows: Vec<Row>,
}

#[derive(Deserialize)]
struct RawDataset {
    name: String,
    rows: Vec<Row>,
}

impl TryFrom<RawDataset> for Dataset {
    type Error = OutlierError;

    fn try_from(raw: RawDataset) -> Result<Self> {
        Dataset::new(raw.name, raw.rows)
    }
}

impl Dataset {
    /// Build a dataset, checking that every row has the same number of
    /// features and that all values are finite.
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Result<Self> {
        let name = name.into();
        if let Some(first) = rows.first() {
            let width = first.features.len();
            for (index, row) in rows.iter().enumerate() {
                if row.features.len() != width {
                    return Err(OutlierError::InvalidDataset(format!(
                        "row {} has {} features, expected {}",
                        index,
                        row.features.len(),
                        width
                    )));
                }
                if !row.target.is_finite() || row.features.iter().any(|v| !v.is_finite()) {
                    return Err(OutlierError::InvalidDataset(format!(
                        "row {} contains a non-finite value",
                        index
                    )));
                }
            }
        }
        Ok(Self { name, rows })
    }

    /// An empty dataset with the given name.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    /// Display name, used only in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Number of features per row (0 for an empty dataset).
    pub fn num_features(&self) -> usize {
        self.rows.first().map_or(0, |row| row.features.len())
    }

    pub fn targets(&self) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(|row| row.target)
    }

    /// Return a new dataset without the rows at `indices`.
    ///
    /// Surviving rows keep their relative order. Out-of-range indices are
    /// ignored.
    pub fn without_indices(&self, indices: &[usize]) -> Dataset {
        if indices.is_empty() {
            return self.clone();
        }
        let drop: HashSet<usize> = indices.iter().copied().collect();
        let rows = self
            .rows
            .iter()
            .enumerate()
            .filter(|(index, _)| !drop.contains(index))
            .map(|(_, row)| row.clone())
            .collect();
        Dataset {
            name: self.name.clone(),
            rows,
        }
    }
}

/// A held-out prediction for one row of the dataset that was cross-validated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Index of the row in the dataset passed to the cross-validator.
    pub index: usize,
    pub actual: f64,
    pub predicted: f64,
}

impl PredictionRecord {
    /// `actual - predicted`, or its absolute value.
    pub fn error(&self, absolute: bool) -> f64 {
        let residual = self.actual - self.predicted;
        if absolute { residual.abs() } else { residual }
    }
}

/// How a stage stopped iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// Fixed-iteration policy ran all of its iterations.
    Exhausted,
    /// Convergence policy saw enough consecutive iterations without removals.
    Converged,
    /// Cancellation was requested; the stage's progress was discarded.
    Cancelled,
    /// A cross-validation pass failed; the last committed dataset was kept.
    Failed,
}

impl StageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::Converged => "converged",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

/// Per-stage statistics for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage_index: usize,
    pub model: String,
    pub outcome: StageOutcome,
    /// Iterations started, including one interrupted by failure or cancellation.
    pub iterations: usize,
    pub rows_before: usize,
    pub rows_after: usize,
}

impl StageSummary {
    pub fn rows_removed(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }
}

/// Outcome of a full pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub row_count_before: usize,
    pub row_count_after: usize,
    pub dataset: Dataset,

    /// One entry per stage that ran.
    pub stages: Vec<StageSummary>,

    /// `true` when the run stopped on the cancellation token.
    pub cancelled: bool,

    pub duration_ms: u64,
}

impl PipelineResult {
    pub fn rows_removed(&self) -> usize {
        self.row_count_before.saturating_sub(self.row_count_after)
    }

    /// Percentage of input rows removed.
    pub fn rows_removed_percentage(&self) -> f32 {
        if self.row_count_before == 0 {
            0.0
        } else {
            (self.rows_removed() as f32 / self.row_count_before as f32) * 100.0
        }
    }
}
