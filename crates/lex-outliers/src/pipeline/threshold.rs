use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::PredictionRecord;

/// Quartile statistics and the rows that exceed the upper fence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    /// `Q3 + multiplier * IQR`, or `+inf` when fewer than two errors exist.
    pub upper_bound: f64,
    /// Record indices whose error is strictly above `upper_bound`, ascending.
    pub outliers: Vec<usize>,
}

/// One-sided IQR rule over held-out prediction errors.
///
/// Only large positive errors mark a row; small or negative residuals never
/// do.
pub struct OutlierThreshold;

impl OutlierThreshold {
    pub fn compute(
        records: &[PredictionRecord],
        use_absolute_error: bool,
        multiplier: f64,
    ) -> ThresholdResult {
        if records.len() <= 1 {
            return ThresholdResult {
                q1: f64::NAN,
                q3: f64::NAN,
                iqr: f64::NAN,
                upper_bound: f64::INFINITY,
                outliers: Vec::new(),
            };
        }

        let errors: Vec<f64> = records
            .iter()
            .map(|record| record.error(use_absolute_error))
            .collect();
        let mut sorted = errors.clone();
        sorted.sort_by(f64::total_cmp);

        let q1 = quantile(&sorted, 0.25);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        let upper_bound = q3 + multiplier * iqr;

        let mut outliers: Vec<usize> = records
            .iter()
            .zip(&errors)
            .filter(|&(_, &error)| error > upper_bound)
            .map(|(record, _)| record.index)
            .collect();
        outliers.sort_unstable();

        debug!(q1, q3, iqr, upper_bound, flagged = outliers.len(), "IQR threshold");

        ThresholdResult {
            q1,
            q3,
            iqr,
            upper_bound,
            outliers,
        }
    }
}

/// Linear interpolation between order statistics at rank `p * (n - 1)`.
///
/// `sorted` must be ascending. Returns NaN for an empty slice.
pub fn quantile(sorted: &[f64], p: f64) -> f64 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return f64::NAN;
    };
    let rank = p.clamp(0.0, 1.0) * last as f64;
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(last);
    let fraction = rank - lower as f64;
    sorted[lower] + fraction * (sorted[upper] - sorted[lower])
}
