use tracing::{error, info, warn};

use super::progress::{CancellationToken, PipelinePhase, ProgressReporter, ProgressUpdate};
use super::threshold::OutlierThreshold;
use crate::config::{ConfigValidationError, StageConfig, StoppingPolicy};
use crate::cv::CrossValidator;
use crate::error::CvError;
use crate::types::{Dataset, StageOutcome};

/// What a stage handed back to the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRun {
    pub outcome: StageOutcome,
    /// Surviving rows. For [`StageOutcome::Cancelled`] this is the stage's
    /// input; for [`StageOutcome::Failed`] it is the dataset before the
    /// failing iteration.
    pub dataset: Dataset,
    /// Iterations started, including an interrupted one.
    pub iterations: usize,
}

/// Repeats cross-validate → threshold → remove for one stage configuration.
///
/// The working dataset only ever shrinks, and each accepted iteration
/// replaces it with a new value.
pub struct StageIterator<'a> {
    index: usize,
    stage_count: usize,
    config: &'a StageConfig,
    policy: StoppingPolicy,
    validator: &'a dyn CrossValidator,
    use_absolute_error: bool,
    cancellation: &'a CancellationToken,
    reporter: Option<&'a dyn ProgressReporter>,
}

impl<'a> StageIterator<'a> {
    pub fn new(
        index: usize,
        stage_count: usize,
        config: &'a StageConfig,
        validator: &'a dyn CrossValidator,
        use_absolute_error: bool,
        cancellation: &'a CancellationToken,
    ) -> Result<Self, ConfigValidationError> {
        let policy = config.validate(index)?;
        Ok(Self {
            index,
            stage_count,
            config,
            policy,
            validator,
            use_absolute_error,
            cancellation,
            reporter: None,
        })
    }

    /// Attach a progress reporter.
    pub fn with_reporter(mut self, reporter: Option<&'a dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn policy(&self) -> StoppingPolicy {
        self.policy
    }

    fn report(&self, phase: PipelinePhase, iteration: usize, rows: usize, message: String) {
        if let Some(reporter) = self.reporter {
            reporter.report(ProgressUpdate::iteration(
                phase,
                self.index,
                self.stage_count,
                iteration,
                rows,
                message,
            ));
        }
    }

    fn cancelled(&self, input: &Dataset, iterations: usize) -> StageRun {
        info!(
            stage = self.index,
            iterations, "Stage cancelled, discarding its removals"
        );
        StageRun {
            outcome: StageOutcome::Cancelled,
            dataset: input.clone(),
            iterations,
        }
    }

    /// Run the stage to completion, cancellation or failure.
    pub fn run(&self, input: &Dataset) -> StageRun {
        info!(
            stage = self.index,
            model = %self.config.model.name(),
            rows = input.len(),
            policy = ?self.policy,
            "Starting stage"
        );

        let mut current = input.clone();
        let mut iteration = 0;
        let mut non_removal_streak = 0;

        let outcome = loop {
            if self.cancellation.is_cancelled() {
                return self.cancelled(input, iteration);
            }
            iteration += 1;

            self.report(
                PipelinePhase::CrossValidating,
                iteration,
                current.len(),
                format!("Stage {}, iteration {}: cross-validating", self.index + 1, iteration),
            );

            let records = match self.validator.cross_validate(
                &current,
                &self.config.model,
                self.config.num_folds,
                self.config.seed,
                self.cancellation,
            ) {
                Ok(records) => records,
                Err(CvError::Cancelled) => return self.cancelled(input, iteration),
                Err(e) => {
                    error!(
                        stage = self.index,
                        iteration,
                        fold = ?e.failing_fold(),
                        "Cross-validation failed, keeping rows from before this iteration: {}",
                        e
                    );
                    break StageOutcome::Failed;
                }
            };

            // A pass that finished after cancel() is not committed.
            if self.cancellation.is_cancelled() {
                return self.cancelled(input, iteration);
            }

            if records.len() != current.len() {
                warn!(
                    expected = current.len(),
                    actual = records.len(),
                    "Cross-validator returned the wrong number of predictions"
                );
                break StageOutcome::Failed;
            }

            let threshold = OutlierThreshold::compute(
                &records,
                self.use_absolute_error,
                self.config.iqr_multiplier,
            );
            let next = current.without_indices(&threshold.outliers);
            info!(
                "iteration {}: size before={}, after={}",
                iteration,
                current.len(),
                next.len()
            );
            let removed = current.len() - next.len();
            self.report(
                PipelinePhase::Thresholding,
                iteration,
                next.len(),
                format!(
                    "Stage {}, iteration {}: removed {} rows",
                    self.index + 1,
                    iteration,
                    removed
                ),
            );
            current = next;

            match self.policy {
                StoppingPolicy::FixedIterations(limit) => {
                    if iteration >= limit as usize {
                        break StageOutcome::Exhausted;
                    }
                }
                StoppingPolicy::Convergence(limit) => {
                    if removed == 0 {
                        non_removal_streak += 1;
                    } else {
                        non_removal_streak = 0;
                    }
                    if non_removal_streak >= limit {
                        break StageOutcome::Converged;
                    }
                }
            }
        };

        info!(
            stage = self.index,
            outcome = outcome.as_str(),
            iterations = iteration,
            rows_before = input.len(),
            rows_after = current.len(),
            "Stage finished"
        );
        StageRun {
            outcome,
            dataset: current,
            iterations: iteration,
        }
    }
}
