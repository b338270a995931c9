//! Error types for the outlier-removal engine.
//!
//! Three layers of errors exist, matching the three places a run can go wrong:
//!
//! - [`ConfigValidationError`](crate::config::ConfigValidationError): a malformed
//!   stage or pipeline configuration, rejected before any work starts.
//! - [`CvError`] / [`FoldFailure`]: a cross-validation pass that could not
//!   complete. These are values, not faults; the stage iterator decides what
//!   to do with them.
//! - [`OutlierError`]: the crate-level error returned by public entry points.
//!
//! Errors are serializable as `{code, message}` so callers can forward them
//! over IPC or print them as JSON.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

use crate::config::ConfigValidationError;

/// A single fold's `fit` or `predict` call failed.
#[derive(Error, Debug)]
#[error("fold {fold} failed: {source}")]
pub struct FoldFailure {
    /// Fold id in `[0, K)`.
    pub fold: usize,
    /// Cause reported by the model.
    #[source]
    pub source: anyhow::Error,
}

impl FoldFailure {
    /// Attribute a model error to a fold.
    pub fn new(fold: usize, source: anyhow::Error) -> Self {
        Self { fold, source }
    }
}

/// Why a cross-validation pass produced no predictions.
#[derive(Error, Debug)]
pub enum CvError {
    /// Fewer rows than folds were requested.
    #[error("Insufficient rows for cross-validation: {rows} rows, {folds} folds")]
    InsufficientRows { rows: usize, folds: usize },

    /// Fold count below two.
    #[error("Invalid number of folds: {0} (must be at least 2)")]
    InvalidFolds(usize),

    /// One fold failed; results from the other folds were discarded.
    #[error(transparent)]
    FoldFailed(#[from] FoldFailure),

    /// The pass observed the cancellation token and stopped early.
    #[error("Cross-validation cancelled")]
    Cancelled,

    /// The worker pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    /// Per-fold results could not be merged back into row order.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CvError {
    /// Fold id responsible for the failure, if any.
    pub fn failing_fold(&self) -> Option<usize> {
        match self {
            Self::FoldFailed(failure) => Some(failure.fold),
            _ => None,
        }
    }
}

/// The main error type for the outlier-removal engine.
#[derive(Error, Debug)]
pub enum OutlierError {
    /// Invalid stage or pipeline configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigValidationError),

    /// Cross-validation failed.
    ///
    /// [`Pipeline`](crate::Pipeline) turns these into stage outcomes and never
    /// returns this variant. It is how callers that drive a
    /// [`CrossValidator`](crate::CrossValidator) themselves propagate its
    /// errors with `?`.
    #[error("Cross-validation failed: {0}")]
    CrossValidation(#[from] CvError),

    /// Rows are malformed (ragged feature vectors, non-finite values, nulls).
    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    /// Column was not found in the source table.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<OutlierError>,
    },
}

impl OutlierError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        OutlierError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code for callers that branch on error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::CrossValidation(CvError::InsufficientRows { .. }) => "INSUFFICIENT_ROWS",
            Self::CrossValidation(CvError::FoldFailed(_)) => "FOLD_FAILED",
            Self::CrossValidation(CvError::Cancelled) => "CANCELLED",
            Self::CrossValidation(_) => "CROSS_VALIDATION_FAILED",
            Self::InvalidDataset(_) => "INVALID_DATASET",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error represents a cancelled cross-validation pass
    /// (only produced by direct [`CrossValidator`](crate::CrossValidator) use).
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::CrossValidation(CvError::Cancelled) => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for OutlierError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("OutlierError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, OutlierError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| OutlierError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            OutlierError::from(CvError::Cancelled).error_code(),
            "CANCELLED"
        );
        assert_eq!(
            OutlierError::ColumnNotFound("price".to_string()).error_code(),
            "COLUMN_NOT_FOUND"
        );
        assert_eq!(
            OutlierError::from(CvError::InsufficientRows { rows: 3, folds: 5 }).error_code(),
            "INSUFFICIENT_ROWS"
        );
        assert_eq!(
            OutlierError::from(ConfigValidationError::NoStages).error_code(),
            "INVALID_CONFIG"
        );
    }

    #[test]
    fn test_fold_failure_is_attributed() {
        let error = CvError::from(FoldFailure::new(2, anyhow::anyhow!("singular matrix")));
        assert_eq!(error.failing_fold(), Some(2));
        assert!(error.to_string().contains("fold 2"));
        assert!(error.to_string().contains("singular matrix"));
        assert_eq!(CvError::Cancelled.failing_fold(), None);
    }

    #[test]
    fn test_is_cancelled() {
        assert!(OutlierError::from(CvError::Cancelled).is_cancelled());
        assert!(
            OutlierError::from(CvError::Cancelled)
                .with_context("stage 1")
                .is_cancelled()
        );
        assert!(!OutlierError::InvalidDataset("ragged".to_string()).is_cancelled());
    }

    #[test]
    fn test_error_serialization() {
        let error = OutlierError::ColumnNotFound("Age".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("Age"));
    }

    #[test]
    fn test_with_context() {
        let error =
            OutlierError::ColumnNotFound("target".to_string()).with_context("Loading dataset");
        assert!(error.to_string().contains("Loading dataset"));
        assert_eq!(error.error_code(), "COLUMN_NOT_FOUND");
    }
}
