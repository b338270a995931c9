//! The stage chain.
//!
//! [`Pipeline`] validates every stage, then feeds each stage's surviving rows
//! into the next one and collects end-to-end statistics.

use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use super::progress::{
    CancellationToken, ClosureProgressReporter, PipelinePhase, ProgressReporter, ProgressUpdate,
};
use super::stage::StageIterator;
use crate::config::{ConfigValidationError, PipelineConfig};
use crate::cv::{CrossValidationCoordinator, CrossValidator};
use crate::error::Result;
use crate::types::{Dataset, PipelineResult, StageOutcome, StageSummary};

/// Runs an ordered list of outlier-removal stages.
///
/// Use [`Pipeline::builder()`] to create one.
///
/// # Example
///
/// ```rust,ignore
/// use lex_outliers::{CancellationToken, Pipeline, PipelineConfig};
///
/// let token = CancellationToken::new();
/// let result = Pipeline::builder()
///     .config(PipelineConfig::default())
///     .cancellation_token(token.clone())
///     .on_progress(|update| println!("{}", update.message))
///     .build()?
///     .run(&dataset)?;
///
/// println!("{} -> {} rows", result.row_count_before, result.row_count_after);
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    validator: Option<Arc<dyn CrossValidator>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
}

// Pipelines are built on one thread and cancelled from another.
static_assertions::assert_impl_all!(Pipeline: Send, Sync);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// A clone of the token this pipeline watches.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Request cancellation. Safe to call from any thread while `run` is
    /// in progress.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    /// Run the configured stages over `dataset`.
    ///
    /// # Errors
    ///
    /// Only configuration errors are returned. Stage failures and cancellation
    /// still produce a `PipelineResult`; see [`StageOutcome`] and
    /// [`PipelineResult::cancelled`].
    pub fn run(&self, dataset: &Dataset) -> Result<PipelineResult> {
        self.run_with(dataset, &self.config)
    }

    /// Run a different configuration with this pipeline's validator, reporter
    /// and cancellation token.
    ///
    /// The whole configuration is validated before any stage runs.
    pub fn run_with(&self, dataset: &Dataset, config: &PipelineConfig) -> Result<PipelineResult> {
        let stage_count = config.stages.len();
        self.report_progress(ProgressUpdate::new(
            PipelinePhase::Validating,
            stage_count,
            dataset.len(),
            "Validating pipeline configuration",
        ));
        if let Err(e) = config.validate() {
            error!("Pipeline configuration rejected: {}", e);
            self.report_progress(ProgressUpdate::failed(stage_count, e.to_string()));
            return Err(e.into());
        }

        let default_validator;
        let validator: &dyn CrossValidator = match &self.validator {
            Some(validator) => validator.as_ref(),
            None => {
                default_validator = CrossValidationCoordinator::new(config.worker_count);
                &default_validator
            }
        };

        let result = self.run_stages(dataset, config, validator)?;

        if result.cancelled {
            self.report_progress(ProgressUpdate::cancelled(stage_count, result.row_count_after));
        } else {
            self.report_progress(ProgressUpdate::complete(
                stage_count,
                result.row_count_after,
                format!(
                    "Removed {} of {} rows",
                    result.rows_removed(),
                    result.row_count_before
                ),
            ));
        }
        Ok(result)
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn run_stages(
        &self,
        input: &Dataset,
        config: &PipelineConfig,
        validator: &dyn CrossValidator,
    ) -> Result<PipelineResult> {
        let start_time = Instant::now();
        let stage_count = config.stages.len();
        info!(
            dataset = input.name(),
            rows = input.len(),
            stages = stage_count,
            "Starting outlier removal pipeline"
        );

        let mut current = input.clone();
        let mut summaries = Vec::with_capacity(stage_count);
        let mut cancelled = false;

        for (index, stage_config) in config.stages.iter().enumerate() {
            if current.is_empty() {
                info!(stage = index, "No rows left, skipping remaining stages");
                break;
            }

            let stage = StageIterator::new(
                index,
                stage_count,
                stage_config,
                validator,
                config.use_absolute_error,
                &self.cancellation_token,
            )?
            .with_reporter(self.progress_reporter.as_deref());

            let run = stage.run(&current);
            summaries.push(StageSummary {
                stage_index: index,
                model: stage_config.model.name(),
                outcome: run.outcome,
                iterations: run.iterations,
                rows_before: current.len(),
                rows_after: run.dataset.len(),
            });
            current = run.dataset;

            if run.outcome == StageOutcome::Cancelled {
                cancelled = true;
                break;
            }
        }

        let duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            rows_before = input.len(),
            rows_after = current.len(),
            cancelled,
            duration_ms,
            "Pipeline finished"
        );

        Ok(PipelineResult {
            row_count_before: input.len(),
            row_count_after: current.len(),
            dataset: current,
            stages: summaries,
            cancelled,
            duration_ms,
        })
    }
}

/// Builder for creating a [`Pipeline`] instance.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    validator: Option<Arc<dyn CrossValidator>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the default [`CrossValidationCoordinator`].
    ///
    /// When set, the configuration's `worker_count` is ignored; the supplied
    /// validator decides how folds run.
    pub fn cross_validator(mut self, validator: Arc<dyn CrossValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Set a progress reporter for receiving updates during a run.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// Convenience for [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Set a cancellation token for stopping the pipeline from another thread.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(Pipeline {
            config,
            validator: self.validator,
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;
    use crate::error::CvError;
    use crate::model::{ModelSpec, ModelTemplate};
    use crate::types::{PredictionRecord, Row};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Flags the row whose target is the largest, on every call.
    #[derive(Default)]
    struct MaxTargetValidator {
        calls: AtomicUsize,
    }

    impl CrossValidator for MaxTargetValidator {
        fn cross_validate(
            &self,
            dataset: &Dataset,
            _template: &ModelTemplate,
            _num_folds: usize,
            _seed: u64,
            _cancellation: &CancellationToken,
        ) -> std::result::Result<Vec<PredictionRecord>, CvError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let max = dataset.targets().fold(f64::MIN, f64::max);
            Ok(dataset
                .rows()
                .iter()
                .enumerate()
                .map(|(index, row)| PredictionRecord {
                    index,
                    actual: if row.target == max { 1e6 } else { 1.0 + (index % 3) as f64 },
                    predicted: 0.0,
                })
                .collect())
        }
    }

    fn dataset(n: usize) -> Dataset {
        let rows = (0..n).map(|i| Row::new(vec![i as f64], i as f64)).collect();
        Dataset::new("chain", rows).unwrap()
    }

    fn fixed_stage(iterations: u32) -> StageConfig {
        StageConfig::builder()
            .model(ModelSpec::Mean)
            .num_folds(3)
            .num_iterations(iterations)
            .build()
            .unwrap()
    }

    #[test]
    fn test_pipeline_builder_default() {
        let pipeline = Pipeline::builder().build().unwrap();
        assert_eq!(pipeline.config().stages.len(), 1);
        assert!(pipeline.validator.is_none());
    }

    #[test]
    fn test_builder_rejects_empty_stage_list() {
        let config = PipelineConfig {
            stages: vec![],
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Pipeline::builder().config(config).build(),
            Err(ConfigValidationError::NoStages)
        ));
    }

    #[test]
    fn test_stages_feed_each_other() {
        let validator = Arc::new(MaxTargetValidator::default());
        let config = PipelineConfig::builder()
            .stage(fixed_stage(2))
            .stage(fixed_stage(3))
            .build()
            .unwrap();
        let pipeline = Pipeline::builder()
            .config(config)
            .cross_validator(validator.clone())
            .build()
            .unwrap();

        let result = pipeline.run(&dataset(30)).unwrap();

        assert_eq!(result.row_count_before, 30);
        assert_eq!(result.row_count_after, 25);
        assert_eq!(result.stages.len(), 2);
        assert_eq!(result.stages[0].rows_after, 28);
        assert_eq!(result.stages[1].rows_before, 28);
        assert_eq!(result.stages[1].outcome, StageOutcome::Exhausted);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 5);
        assert!(!result.cancelled);
        // The five largest targets are gone.
        assert_eq!(result.dataset.targets().fold(f64::MIN, f64::max), 24.0);
    }

    #[test]
    fn test_run_with_invalid_config_runs_nothing() {
        let validator = Arc::new(MaxTargetValidator::default());
        let pipeline = Pipeline::builder()
            .cross_validator(validator.clone())
            .build()
            .unwrap();
        let bad = PipelineConfig {
            stages: vec![
                fixed_stage(1),
                StageConfig {
                    num_iterations: 0,
                    max_non_removal_iterations: 0,
                    ..StageConfig::default()
                },
            ],
            ..PipelineConfig::default()
        };

        let err = pipeline.run_with(&dataset(10), &bad).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancelled_before_start_keeps_input() {
        let pipeline = Pipeline::builder()
            .cross_validator(Arc::new(MaxTargetValidator::default()))
            .build()
            .unwrap();
        pipeline.cancel();

        let input = dataset(12);
        let result = pipeline.run(&input).unwrap();
        assert!(result.cancelled);
        assert_eq!(result.dataset, input);
        assert_eq!(result.stages[0].outcome, StageOutcome::Cancelled);
    }

    #[test]
    fn test_empty_input_skips_stages() {
        let validator = Arc::new(MaxTargetValidator::default());
        let pipeline = Pipeline::builder()
            .cross_validator(validator.clone())
            .build()
            .unwrap();

        let result = pipeline.run(&Dataset::empty("nothing")).unwrap();
        assert_eq!(result.row_count_before, 0);
        assert_eq!(result.row_count_after, 0);
        assert!(result.stages.is_empty());
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_progress_updates_end_with_terminal_phase() {
        let phases = Arc::new(Mutex::new(Vec::new()));
        let phases_clone = phases.clone();
        let pipeline = Pipeline::builder()
            .config(PipelineConfig::builder().stage(fixed_stage(2)).build().unwrap())
            .cross_validator(Arc::new(MaxTargetValidator::default()))
            .on_progress(move |update| {
                if let Ok(mut phases) = phases_clone.lock() {
                    phases.push(update.phase);
                }
            })
            .build()
            .unwrap();

        pipeline.run(&dataset(10)).unwrap();

        let phases = phases.lock().unwrap();
        assert_eq!(
            *phases,
            vec![
                PipelinePhase::Validating,
                PipelinePhase::CrossValidating,
                PipelinePhase::Thresholding,
                PipelinePhase::CrossValidating,
                PipelinePhase::Thresholding,
                PipelinePhase::Complete,
            ]
        );
    }
}
