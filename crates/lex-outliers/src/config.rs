//! Configuration types for the outlier-removal pipeline.
//!
//! A pipeline is an ordered list of [`StageConfig`]s plus two pipeline-wide
//! settings: whether residuals are taken as absolute values and how many
//! workers run folds. Both types use the builder pattern and are
//! (de)serializable so a pipeline can be described in a JSON file.
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_outliers::config::{PipelineConfig, StageConfig};
//! use lex_outliers::model::ModelSpec;
//!
//! let config = PipelineConfig::builder()
//!     .stage(
//!         StageConfig::builder()
//!             .model(ModelSpec::LinearRegression { ridge: 1e-8 })
//!             .num_folds(10)
//!             .iqr_multiplier(1.5)
//!             .max_non_removal_iterations(2)
//!             .build()?,
//!     )
//!     .use_absolute_error(true)
//!     .worker_count(-1)
//!     .build()?;
//! ```

use serde::{Deserialize, Serialize};

use crate::model::ModelTemplate;

/// The two mutually exclusive ways a stage decides to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppingPolicy {
    /// Run exactly this many iterations.
    FixedIterations(u32),
    /// Stop after this many consecutive iterations that removed nothing.
    Convergence(u32),
}

/// Configuration of one cross-validate → threshold → remove stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Model instantiated fresh for every fold.
    pub model: ModelTemplate,

    /// Number of cross-validation folds. Must be at least 2.
    /// Default: 10
    pub num_folds: usize,

    /// Multiplier applied to the IQR above Q3 to get the removal threshold.
    /// Must be positive.
    /// Default: 1.5
    pub iqr_multiplier: f64,

    /// Fixed-iteration policy: number of iterations to run.
    /// Default: 1
    pub num_iterations: u32,

    /// Convergence policy: consecutive no-removal iterations before stopping.
    /// Default: 0 (policy disabled)
    pub max_non_removal_iterations: u32,

    /// Seed for fold assignment.
    /// Default: 1
    pub seed: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            model: ModelTemplate::default(),
            num_folds: 10,
            iqr_multiplier: 1.5,
            num_iterations: 1,
            max_non_removal_iterations: 0,
            seed: 1,
        }
    }
}

impl StageConfig {
    pub fn builder() -> StageConfigBuilder {
        StageConfigBuilder::default()
    }

    /// The stopping policy, or `None` when both or neither field is positive.
    pub fn stopping_policy(&self) -> Option<StoppingPolicy> {
        match (self.num_iterations, self.max_non_removal_iterations) {
            (n, 0) if n > 0 => Some(StoppingPolicy::FixedIterations(n)),
            (0, m) if m > 0 => Some(StoppingPolicy::Convergence(m)),
            _ => None,
        }
    }

    /// Validate this stage. `stage` is its position in the pipeline and only
    /// appears in the error.
    pub fn validate(&self, stage: usize) -> Result<StoppingPolicy, ConfigValidationError> {
        if self.num_folds < 2 {
            return Err(ConfigValidationError::InvalidFolds {
                stage,
                folds: self.num_folds,
            });
        }

        if !(self.iqr_multiplier.is_finite() && self.iqr_multiplier > 0.0) {
            return Err(ConfigValidationError::InvalidMultiplier {
                stage,
                value: self.iqr_multiplier,
            });
        }

        self.stopping_policy()
            .ok_or(ConfigValidationError::StoppingPolicy {
                stage,
                num_iterations: self.num_iterations,
                max_non_removal_iterations: self.max_non_removal_iterations,
            })
    }
}

/// Builder for [`StageConfig`].
#[derive(Debug, Clone, Default)]
pub struct StageConfigBuilder {
    config: StageConfig,
}

impl StageConfigBuilder {
    /// Set the model template (built-in spec or custom model).
    pub fn model(mut self, model: impl Into<ModelTemplate>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn num_folds(mut self, folds: usize) -> Self {
        self.config.num_folds = folds;
        self
    }

    pub fn iqr_multiplier(mut self, multiplier: f64) -> Self {
        self.config.iqr_multiplier = multiplier;
        self
    }

    /// Use the fixed-iteration policy.
    ///
    /// Clears `max_non_removal_iterations`; the two policies are exclusive.
    pub fn num_iterations(mut self, iterations: u32) -> Self {
        self.config.num_iterations = iterations;
        self.config.max_non_removal_iterations = 0;
        self
    }

    /// Use the convergence policy.
    ///
    /// Clears `num_iterations`; the two policies are exclusive.
    pub fn max_non_removal_iterations(mut self, iterations: u32) -> Self {
        self.config.max_non_removal_iterations = iterations;
        self.config.num_iterations = 0;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Build the stage, validating it as if it were the first stage.
    pub fn build(self) -> Result<StageConfig, ConfigValidationError> {
        self.config.validate(0)?;
        Ok(self.config)
    }
}

/// Worker-pool size setting for fold execution.
///
/// - `0` or `1`: run folds sequentially on the calling thread
/// - `n > 1`: use `n` workers
/// - `n < 0`: leave `|n|` of the available cores free, with at least one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerCount(pub i32);

impl Default for WorkerCount {
    fn default() -> Self {
        Self(1)
    }
}

impl From<i32> for WorkerCount {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl WorkerCount {
    /// Resolve against the machine's available parallelism.
    pub fn resolve(self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.resolve_with(available)
    }

    /// Resolve against an explicit core count. A result of 1 means sequential.
    pub fn resolve_with(self, available: usize) -> usize {
        match self.0 {
            n if n > 1 => n as usize,
            n if n < 0 => available.saturating_sub(n.unsigned_abs() as usize).max(1),
            _ => 1,
        }
    }
}

/// Configuration for the whole stage chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Stages, run in order. Must not be empty.
    pub stages: Vec<StageConfig>,

    /// Use `|actual - predicted|` instead of the signed residual.
    /// Default: true
    #[serde(default = "default_use_absolute_error")]
    pub use_absolute_error: bool,

    /// Fold worker-pool setting.
    /// Default: 1 (sequential)
    #[serde(default)]
    pub worker_count: WorkerCount,
}

fn default_use_absolute_error() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: vec![StageConfig::default()],
            use_absolute_error: true,
            worker_count: WorkerCount::default(),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate every stage, returning their stopping policies in order.
    ///
    /// Validation is all-or-nothing: the first invalid stage rejects the
    /// whole configuration.
    pub fn validate(&self) -> Result<Vec<StoppingPolicy>, ConfigValidationError> {
        if self.stages.is_empty() {
            return Err(ConfigValidationError::NoStages);
        }
        self.stages
            .iter()
            .enumerate()
            .map(|(index, stage)| stage.validate(index))
            .collect()
    }

    /// Parse and validate a JSON pipeline description.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Pipeline must contain at least one stage")]
    NoStages,

    #[error("Invalid number of folds for stage {stage}: {folds} (must be at least 2)")]
    InvalidFolds { stage: usize, folds: usize },

    #[error("Invalid IQR multiplier for stage {stage}: {value} (must be positive)")]
    InvalidMultiplier { stage: usize, value: f64 },

    #[error(
        "Invalid stopping policy for stage {stage}: num_iterations={num_iterations}, \
         max_non_removal_iterations={max_non_removal_iterations} (exactly one must be positive)"
    )]
    StoppingPolicy {
        stage: usize,
        num_iterations: u32,
        max_non_removal_iterations: u32,
    },
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    stages: Vec<StageConfig>,
    use_absolute_error: Option<bool>,
    worker_count: Option<WorkerCount>,
}

impl PipelineConfigBuilder {
    /// Append a stage.
    pub fn stage(mut self, stage: StageConfig) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append several stages.
    pub fn stages(mut self, stages: impl IntoIterator<Item = StageConfig>) -> Self {
        self.stages.extend(stages);
        self
    }

    pub fn use_absolute_error(mut self, absolute: bool) -> Self {
        self.use_absolute_error = Some(absolute);
        self
    }

    pub fn worker_count(mut self, workers: impl Into<WorkerCount>) -> Self {
        self.worker_count = Some(workers.into());
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let config = PipelineConfig {
            stages: self.stages,
            use_absolute_error: self.use_absolute_error.unwrap_or(true),
            worker_count: self.worker_count.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}
