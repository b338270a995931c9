//! Iterative cross-validated outlier removal.
//!
//! Given a table of numeric rows (feature vector + target) and a chain of
//! model configurations, each stage repeatedly:
//!
//! 1. cross-validates a model on the current rows,
//! 2. turns held-out prediction errors into a threshold with a one-sided
//!    interquartile-range rule,
//! 3. drops rows whose error exceeds it,
//!
//! until its stopping policy fires, then hands the surviving rows to the next
//! stage.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lex_outliers::{Pipeline, PipelineConfig, StageConfig, ModelSpec, source};
//! use std::path::Path;
//!
//! let (dataset, schema) = source::read_csv(Path::new("data.csv"), "price")?;
//!
//! let config = PipelineConfig::builder()
//!     .stage(
//!         StageConfig::builder()
//!             .model(ModelSpec::LinearRegression { ridge: 1e-8 })
//!             .num_folds(10)
//!             .max_non_removal_iterations(2)
//!             .build()?,
//!     )
//!     .worker_count(-1)
//!     .build()?;
//!
//! let result = Pipeline::builder().config(config).build()?.run(&dataset)?;
//! println!("{} -> {} rows", result.row_count_before, result.row_count_after);
//! source::write_csv(&result.dataset, &schema, Path::new("clean.csv"))?;
//! ```
//!
//! # Models
//!
//! The engine only needs the [`Model`] trait: `fit`, `predict` and a way to
//! get a fresh instance per fold. [`MeanModel`] and [`LinearRegression`] are
//! built in; anything else can be plugged in with [`ModelTemplate::custom`].
//!
//! # Failure and cancellation
//!
//! Only an invalid configuration is returned as an error, and it is rejected
//! before any stage runs. A failing fold ends its stage with the rows from
//! before the failing iteration; the next stage still runs. Cancelling through
//! a [`CancellationToken`] discards the current stage's removals and stops the
//! chain. In both cases the caller gets a [`PipelineResult`].

pub mod config;
pub mod cv;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod reporting;
pub mod source;
pub mod types;

// Re-exports for convenient access
pub use config::{
    ConfigValidationError, PipelineConfig, PipelineConfigBuilder, StageConfig, StageConfigBuilder,
    StoppingPolicy, WorkerCount,
};
pub use cv::{CrossValidationCoordinator, CrossValidator, FoldAssignment, FoldExecutor};
pub use error::{CvError, FoldFailure, OutlierError, Result, ResultExt};
pub use model::{LinearRegression, MeanModel, Model, ModelSpec, ModelTemplate};
pub use pipeline::{
    CancellationToken, ClosureProgressReporter, OutlierThreshold, Pipeline, PipelineBuilder,
    PipelinePhase, ProgressReporter, ProgressUpdate, StageIterator, StageRun, ThresholdResult,
};
pub use reporting::RemovalReport;
pub use source::TableSchema;
pub use types::{Dataset, PipelineResult, PredictionRecord, Row, StageOutcome, StageSummary};
