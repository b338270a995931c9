use anyhow::{Result, anyhow, bail};
use nalgebra::{DMatrix, DVector};

use super::Model;
use crate::types::Row;

/// Ordinary least squares with an intercept term.
///
/// The design matrix `[1 | X]` is solved directly by SVD least squares, so
/// feature scale does not affect conditioning the way the normal equations
/// would. A positive ridge term `λ` appends `√λ·I` rows below the slopes
/// (never the intercept), which is the same as solving `(XᵀX + λI) w = Xᵀy`.
#[derive(Debug, Clone)]
pub struct LinearRegression {
    ridge: f64,
    /// Intercept first, then one coefficient per feature.
    coefficients: Option<DVector<f64>>,
}

impl LinearRegression {
    /// No shrinkage; rank-deficient designs are rejected instead.
    pub const DEFAULT_RIDGE: f64 = 0.0;

    pub fn new() -> Self {
        Self::with_ridge(Self::DEFAULT_RIDGE)
    }

    pub fn with_ridge(ridge: f64) -> Self {
        Self {
            ridge: ridge.max(0.0),
            coefficients: None,
        }
    }

    /// Fitted coefficients (intercept first).
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coefficients.as_ref().map(|w| w.as_slice())
    }
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl Model for LinearRegression {
    fn fit(&mut self, rows: &[Row]) -> Result<()> {
        let Some(first) = rows.first() else {
            bail!("cannot fit linear regression on zero rows");
        };
        let features = first.features.len();
        if let Some(row) = rows.iter().find(|row| row.features.len() != features) {
            bail!(
                "row has {} features, expected {}",
                row.features.len(),
                features
            );
        }

        let dim = features + 1;
        let penalty_rows = if self.ridge > 0.0 { features } else { 0 };
        let n = rows.len();
        let penalty = self.ridge.sqrt();

        let design = DMatrix::from_fn(n + penalty_rows, dim, |i, j| {
            if i < n {
                if j == 0 { 1.0 } else { rows[i].features[j - 1] }
            } else if j == i - n + 1 {
                penalty
            } else {
                0.0
            }
        });
        let targets = DVector::from_fn(n + penalty_rows, |i, _| {
            if i < n { rows[i].target } else { 0.0 }
        });

        let svd = design.svd(true, true);
        let largest = svd.singular_values.max();
        let tolerance = largest * (n + penalty_rows).max(dim) as f64 * f64::EPSILON;
        let rank = svd.rank(tolerance);
        if rank < dim {
            bail!("design matrix is singular (rank {} of {})", rank, dim);
        }

        let coefficients = svd
            .solve(&targets, tolerance)
            .map_err(|e| anyhow!("least squares solve failed: {}", e))?;
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, row: &Row) -> Result<f64> {
        let Some(coefficients) = &self.coefficients else {
            bail!("linear regression has not been fitted");
        };
        if row.features.len() + 1 != coefficients.len() {
            bail!(
                "row has {} features, model expects {}",
                row.features.len(),
                coefficients.len() - 1
            );
        }
        let features = DVector::from_column_slice(&row.features);
        Ok(coefficients[0] + coefficients.rows(1, features.len()).dot(&features))
    }

    fn clone_model(&self) -> Box<dyn Model> {
        Box::new(LinearRegression::with_ridge(self.ridge))
    }

    fn name(&self) -> &str {
        "linear_regression"
    }
}
