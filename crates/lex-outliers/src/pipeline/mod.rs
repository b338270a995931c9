//! The outlier-removal pipeline.
//!
//! - [`OutlierThreshold`]: one-sided IQR rule over held-out errors
//! - [`StageIterator`]: repeats cross-validate → threshold → remove under a
//!   stopping policy
//! - [`Pipeline`]: validates and runs the ordered stage chain
//! - [`progress`]: progress reporting and cancellation

mod builder;
pub mod progress;
mod stage;
mod threshold;

pub use builder::{Pipeline, PipelineBuilder};
pub use progress::{
    CancellationToken, ClosureProgressReporter, PipelinePhase, ProgressReporter, ProgressUpdate,
};
pub use stage::{StageIterator, StageRun};
pub use threshold::{OutlierThreshold, ThresholdResult, quantile};
