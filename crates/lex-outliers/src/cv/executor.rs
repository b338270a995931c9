use anyhow::anyhow;
use tracing::trace;

use super::partition::FoldAssignment;
use crate::error::{CvError, FoldFailure};
use crate::model::ModelTemplate;
use crate::pipeline::CancellationToken;
use crate::types::{Dataset, PredictionRecord, Row};

/// Runs "train on every other fold, predict this one" for a single fold.
///
/// Holds only shared references; each call to [`run`](Self::run) creates its
/// own model instance, so one executor can serve every fold concurrently.
pub struct FoldExecutor<'a> {
    dataset: &'a Dataset,
    assignment: &'a FoldAssignment,
    template: &'a ModelTemplate,
    cancellation: &'a CancellationToken,
}

impl<'a> FoldExecutor<'a> {
    pub fn new(
        dataset: &'a Dataset,
        assignment: &'a FoldAssignment,
        template: &'a ModelTemplate,
        cancellation: &'a CancellationToken,
    ) -> Self {
        Self {
            dataset,
            assignment,
            template,
            cancellation,
        }
    }

    /// Held-out predictions for `fold`, in ascending row order.
    ///
    /// Model errors come back as [`CvError::FoldFailed`] naming this fold.
    /// Returns [`CvError::Cancelled`] if the token is set before `fit` or
    /// before prediction starts.
    pub fn run(&self, fold: usize) -> Result<Vec<PredictionRecord>, CvError> {
        if self.cancellation.is_cancelled() {
            return Err(CvError::Cancelled);
        }

        let mut training: Vec<Row> = Vec::with_capacity(self.dataset.len());
        let mut held_out: Vec<usize> = Vec::new();
        for (index, row) in self.dataset.rows().iter().enumerate() {
            if self.assignment.fold_of(index) == Some(fold) {
                held_out.push(index);
            } else {
                training.push(row.clone());
            }
        }
        trace!(
            fold,
            train = training.len(),
            test = held_out.len(),
            "Fitting fold"
        );

        let mut model = self.template.instantiate();
        model
            .fit(&training)
            .map_err(|e| FoldFailure::new(fold, e.context("fit failed")))?;

        if self.cancellation.is_cancelled() {
            return Err(CvError::Cancelled);
        }

        held_out
            .into_iter()
            .map(|index| -> Result<PredictionRecord, CvError> {
                let row = &self.dataset.rows()[index];
                let predicted = model.predict(row).map_err(|e| {
                    FoldFailure::new(fold, e.context(format!("predict failed for row {}", index)))
                })?;
                if !predicted.is_finite() {
                    return Err(FoldFailure::new(
                        fold,
                        anyhow!("non-finite prediction {} for row {}", predicted, index),
                    )
                    .into());
                }
                Ok(PredictionRecord {
                    index,
                    actual: row.target,
                    predicted,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, ModelSpec};
    use anyhow::{Result, bail};

    fn dataset(n: usize) -> Dataset {
        let rows = (0..n)
            .map(|i| Row::new(vec![i as f64], 2.0 * i as f64 + 1.0))
            .collect();
        Dataset::new("line", rows).unwrap()
    }

    #[derive(Clone)]
    struct FailingFit;

    impl Model for FailingFit {
        fn fit(&mut self, _rows: &[Row]) -> Result<()> {
            bail!("boom")
        }
        fn predict(&self, _row: &Row) -> Result<f64> {
            Ok(0.0)
        }
        fn clone_model(&self) -> Box<dyn Model> {
            Box::new(self.clone())
        }
        fn name(&self) -> &str {
            "failing_fit"
        }
    }

    #[derive(Clone)]
    struct NanModel;

    impl Model for NanModel {
        fn fit(&mut self, _rows: &[Row]) -> Result<()> {
            Ok(())
        }
        fn predict(&self, _row: &Row) -> Result<f64> {
            Ok(f64::NAN)
        }
        fn clone_model(&self) -> Box<dyn Model> {
            Box::new(self.clone())
        }
        fn name(&self) -> &str {
            "nan"
        }
    }

    #[test]
    fn test_predicts_only_held_out_rows() {
        let data = dataset(20);
        let assignment = FoldAssignment::assign(20, 4, 11).unwrap();
        let template = ModelTemplate::from(ModelSpec::LinearRegression { ridge: 0.0 });
        let token = CancellationToken::new();
        let executor = FoldExecutor::new(&data, &assignment, &template, &token);

        let records = executor.run(2).unwrap();
        let indices: Vec<usize> = records.iter().map(|r| r.index).collect();
        assert_eq!(indices, assignment.indices_in(2));
        for record in records {
            assert!((record.actual - record.predicted).abs() < 1e-6);
        }
    }

    #[test]
    fn test_fit_error_becomes_fold_failure() {
        let data = dataset(10);
        let assignment = FoldAssignment::assign(10, 5, 1).unwrap();
        let template = ModelTemplate::custom(FailingFit);
        let token = CancellationToken::new();

        let err = FoldExecutor::new(&data, &assignment, &template, &token)
            .run(3)
            .unwrap_err();
        assert_eq!(err.failing_fold(), Some(3));
        let CvError::FoldFailed(failure) = err else {
            panic!("expected a fold failure");
        };
        assert_eq!(format!("{:#}", failure.source), "fit failed: boom");
    }

    #[test]
    fn test_non_finite_prediction_is_a_failure() {
        let data = dataset(6);
        let assignment = FoldAssignment::assign(6, 2, 1).unwrap();
        let template = ModelTemplate::custom(NanModel);
        let token = CancellationToken::new();

        let err = FoldExecutor::new(&data, &assignment, &template, &token)
            .run(0)
            .unwrap_err();
        assert_eq!(err.failing_fold(), Some(0));
    }

    #[test]
    fn test_cancelled_before_fit() {
        let data = dataset(6);
        let assignment = FoldAssignment::assign(6, 2, 1).unwrap();
        let template = ModelTemplate::custom(FailingFit);
        let token = CancellationToken::new();
        token.cancel();

        let err = FoldExecutor::new(&data, &assignment, &template, &token)
            .run(0)
            .unwrap_err();
        assert!(matches!(err, CvError::Cancelled));
    }
}
