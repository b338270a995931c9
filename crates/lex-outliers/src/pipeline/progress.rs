//! Progress reporting and cancellation for the outlier-removal pipeline.
//!
//! The pipeline runs on the caller's thread and blocks while folds execute.
//! A [`CancellationToken`] lets another thread stop it at the next iteration
//! boundary, or sooner if a fold task sees the flag before calling the model.
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_outliers::{CancellationToken, Pipeline};
//!
//! let token = CancellationToken::new();
//! let token_clone = token.clone();
//!
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(5));
//!     token_clone.cancel();
//! });
//!
//! let result = Pipeline::builder()
//!     .config(config)
//!     .cancellation_token(token)
//!     .on_progress(|update| println!("[{:?}] {}", update.phase, update.message))
//!     .build()?
//!     .run(&dataset)?;
//! assert!(result.cancelled);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Phases a progress update can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    /// Checking every stage configuration before any work starts
    Validating,
    /// A cross-validation pass is running
    CrossValidating,
    /// Errors are being thresholded and rows removed
    Thresholding,
    /// Pipeline finished all stages
    Complete,
    /// Pipeline was cancelled by the caller
    Cancelled,
    /// Pipeline could not run
    Failed,
}

impl PipelinePhase {
    /// Returns a human-readable name for the phase.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Validating => "Validating Configuration",
            Self::CrossValidating => "Cross-Validating",
            Self::Thresholding => "Removing Outliers",
            Self::Complete => "Complete",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// Terminal phases end a run; no further updates follow them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled | Self::Failed)
    }
}

/// One progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub phase: PipelinePhase,

    /// Zero-based stage index, absent for pipeline-level updates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_index: Option<usize>,

    /// Total number of stages in the pipeline
    pub stage_count: usize,

    /// One-based iteration within the stage, absent outside iterations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<usize>,

    /// Rows in the working dataset at the time of the update
    pub rows: usize,

    /// Human-readable message describing current activity
    pub message: String,
}

impl ProgressUpdate {
    /// Creates a pipeline-level update.
    pub fn new(
        phase: PipelinePhase,
        stage_count: usize,
        rows: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            stage_index: None,
            stage_count,
            iteration: None,
            rows,
            message: message.into(),
        }
    }

    /// Creates an update for one iteration of one stage.
    pub fn iteration(
        phase: PipelinePhase,
        stage_index: usize,
        stage_count: usize,
        iteration: usize,
        rows: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            stage_index: Some(stage_index),
            stage_count,
            iteration: Some(iteration),
            rows,
            message: message.into(),
        }
    }

    /// Creates a completion update.
    pub fn complete(stage_count: usize, rows: usize, message: impl Into<String>) -> Self {
        Self::new(PipelinePhase::Complete, stage_count, rows, message)
    }

    /// Creates a cancelled update.
    pub fn cancelled(stage_count: usize, rows: usize) -> Self {
        Self::new(
            PipelinePhase::Cancelled,
            stage_count,
            rows,
            "Pipeline cancelled by user",
        )
    }

    /// Creates a failed update.
    pub fn failed(stage_count: usize, message: impl Into<String>) -> Self {
        Self::new(PipelinePhase::Failed, stage_count, 0, message)
    }
}

/// Trait for receiving progress updates.
///
/// Implementations must be `Send + Sync`; the pipeline may be driven from a
/// background thread while the reporter forwards updates elsewhere.
pub trait ProgressReporter: Send + Sync {
    /// Called at least once per iteration and once at the end of a run.
    /// Implementations should be cheap and non-blocking.
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Token for cancelling a running pipeline.
///
/// Clones share one atomic flag, so [`cancel()`](Self::cancel) may be called
/// from any thread. The stage iterator checks it before every iteration and
/// fold tasks check it before `fit` and before predicting. A cancelled run
/// still returns a [`PipelineResult`](crate::types::PipelineResult) with
/// `cancelled` set.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);
static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Thread-safe.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if this token or any clone has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
