use rayon::prelude::*;
use tracing::{debug, warn};

use super::executor::FoldExecutor;
use super::partition::FoldAssignment;
use crate::config::WorkerCount;
use crate::error::CvError;
use crate::model::ModelTemplate;
use crate::pipeline::CancellationToken;
use crate::types::{Dataset, PredictionRecord};

/// One K-fold cross-validation pass.
///
/// The stage iterator only talks to this trait, so tests can substitute a
/// scripted validator and count calls.
pub trait CrossValidator: Send + Sync {
    /// Held-out predictions for every row of `dataset`, in row order.
    ///
    /// `records[i].index == i` for every returned record.
    fn cross_validate(
        &self,
        dataset: &Dataset,
        template: &ModelTemplate,
        num_folds: usize,
        seed: u64,
        cancellation: &CancellationToken,
    ) -> Result<Vec<PredictionRecord>, CvError>;
}

/// Fans fold executors out over a rayon pool and merges their output.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossValidationCoordinator {
    workers: WorkerCount,
}

impl CrossValidationCoordinator {
    pub fn new(workers: impl Into<WorkerCount>) -> Self {
        Self {
            workers: workers.into(),
        }
    }

    pub fn workers(&self) -> WorkerCount {
        self.workers
    }
}

impl CrossValidator for CrossValidationCoordinator {
    fn cross_validate(
        &self,
        dataset: &Dataset,
        template: &ModelTemplate,
        num_folds: usize,
        seed: u64,
        cancellation: &CancellationToken,
    ) -> Result<Vec<PredictionRecord>, CvError> {
        let assignment = FoldAssignment::assign(dataset.len(), num_folds, seed)?;
        let executor = FoldExecutor::new(dataset, &assignment, template, cancellation);
        let workers = self.workers.resolve();
        debug!(
            rows = dataset.len(),
            folds = num_folds,
            workers,
            "Starting cross-validation pass"
        );

        let per_fold: Vec<Vec<PredictionRecord>> = if workers <= 1 {
            (0..num_folds)
                .map(|fold| executor.run(fold))
                .collect::<Result<_, _>>()?
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("cv-fold-{}", i))
                .build()
                .map_err(|e| CvError::ThreadPool(e.to_string()))?;

            // Collecting an indexed parallel iterator waits for every fold and
            // keeps fold order, so the first error below is the lowest fold id.
            let results: Vec<Result<Vec<PredictionRecord>, CvError>> = pool.install(|| {
                (0..num_folds)
                    .into_par_iter()
                    .map(|fold| executor.run(fold))
                    .collect()
            });
            results.into_iter().collect::<Result<_, _>>()?
        };

        merge_in_row_order(&assignment, per_fold)
    }
}

/// Put per-fold outputs back into row order.
fn merge_in_row_order(
    assignment: &FoldAssignment,
    per_fold: Vec<Vec<PredictionRecord>>,
) -> Result<Vec<PredictionRecord>, CvError> {
    let order = assignment.original_order();
    let mut merged: Vec<Option<PredictionRecord>> = vec![None; assignment.len()];

    let concatenated = per_fold.into_iter().flatten();
    let mut count = 0;
    for (&expected, record) in order.iter().zip(concatenated) {
        if record.index != expected {
            warn!(expected, actual = record.index, "Fold output out of order");
            return Err(CvError::Internal(format!(
                "fold output for row {} arrived where row {} was expected",
                record.index, expected
            )));
        }
        merged[expected] = Some(record);
        count += 1;
    }
    if count != order.len() {
        return Err(CvError::Internal(format!(
            "expected {} predictions, got {}",
            order.len(),
            count
        )));
    }

    merged
        .into_iter()
        .enumerate()
        .map(|(row, record)| {
            record.ok_or_else(|| CvError::Internal(format!("no prediction for row {}", row)))
        })
        .collect()
}

static_assertions::assert_impl_all!(CrossValidationCoordinator: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, ModelSpec};
    use crate::types::Row;
    use anyhow::{Result, bail};
    use pretty_assertions::assert_eq;

    fn noisy_line(n: usize) -> Dataset {
        let rows = (0..n)
            .map(|i| {
                let x = i as f64;
                let noise = ((i * 7919) % 13) as f64 / 13.0 - 0.5;
                Row::new(vec![x, (x * 0.3).sin()], 3.0 * x - 1.0 + noise)
            })
            .collect();
        Dataset::new("noisy", rows).unwrap()
    }

    /// Fails on every fold that holds out row 0.
    #[derive(Clone, Default)]
    struct FailsWithRowZero {
        saw_zero_target: bool,
    }

    impl Model for FailsWithRowZero {
        fn fit(&mut self, rows: &[Row]) -> Result<()> {
            // Row 0 is the only row with target exactly 0.0.
            self.saw_zero_target = rows.iter().any(|r| r.target == 0.0);
            Ok(())
        }
        fn predict(&self, _row: &Row) -> Result<f64> {
            if !self.saw_zero_target {
                bail!("row 0 was held out");
            }
            Ok(0.0)
        }
        fn clone_model(&self) -> Box<dyn Model> {
            Box::new(Self::default())
        }
        fn name(&self) -> &str {
            "fails_with_row_zero"
        }
    }

    #[test]
    fn test_records_come_back_in_row_order() {
        let data = noisy_line(37);
        let template = ModelTemplate::from(ModelSpec::LinearRegression { ridge: 1e-8 });
        let token = CancellationToken::new();

        let records = CrossValidationCoordinator::new(1)
            .cross_validate(&data, &template, 5, 3, &token)
            .unwrap();

        assert_eq!(records.len(), 37);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.index, i);
            assert_eq!(record.actual, data.rows()[i].target);
        }
    }

    #[test]
    fn test_worker_count_does_not_change_output() {
        let data = noisy_line(64);
        let template = ModelTemplate::from(ModelSpec::LinearRegression { ridge: 1e-8 });
        let token = CancellationToken::new();

        let sequential = CrossValidationCoordinator::new(1)
            .cross_validate(&data, &template, 8, 99, &token)
            .unwrap();
        for workers in [2, 3, 8, -1] {
            let parallel = CrossValidationCoordinator::new(workers)
                .cross_validate(&data, &template, 8, 99, &token)
                .unwrap();
            assert_eq!(sequential, parallel, "workers={}", workers);
        }
    }

    #[test]
    fn test_insufficient_rows() {
        let data = noisy_line(3);
        let token = CancellationToken::new();
        let err = CrossValidationCoordinator::default()
            .cross_validate(&data, &ModelTemplate::default(), 4, 1, &token)
            .unwrap_err();
        assert!(matches!(err, CvError::InsufficientRows { rows: 3, folds: 4 }));
    }

    #[test]
    fn test_failing_fold_is_reported_for_any_worker_count() {
        let mut rows = vec![Row::new(vec![0.0], 0.0)];
        rows.extend((1..20).map(|i| Row::new(vec![i as f64], i as f64)));
        let data = Dataset::new("with_zero", rows).unwrap();
        let template = ModelTemplate::custom(FailsWithRowZero::default());
        let token = CancellationToken::new();

        let expected = FoldAssignment::assign(20, 4, 5).unwrap().fold_of(0);
        for workers in [1, 4] {
            let err = CrossValidationCoordinator::new(workers)
                .cross_validate(&data, &template, 4, 5, &token)
                .unwrap_err();
            assert_eq!(err.failing_fold(), expected);
        }
    }

    #[test]
    fn test_cancelled_pass() {
        let data = noisy_line(20);
        let token = CancellationToken::new();
        token.cancel();
        let err = CrossValidationCoordinator::new(2)
            .cross_validate(&data, &ModelTemplate::default(), 4, 1, &token)
            .unwrap_err();
        assert!(matches!(err, CvError::Cancelled));
    }

    #[test]
    fn test_merge_detects_missing_records() {
        let assignment = FoldAssignment::assign(4, 2, 1).unwrap();
        let err = merge_in_row_order(&assignment, vec![vec![], vec![]]).unwrap_err();
        assert!(matches!(err, CvError::Internal(_)));
    }
}
