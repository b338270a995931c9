//! The trainable, predicting model capability.
//!
//! The engine never inspects a model. It needs exactly three things: a way to
//! get a fresh instance per fold, `fit`, and `predict`. Any algorithm can be
//! plugged in by implementing [`Model`] and wrapping it with
//! [`ModelTemplate::custom`].
//!
//! # Implementing a Model
//!
//! ```rust,ignore
//! use lex_outliers::{Model, ModelTemplate, Row};
//! use anyhow::Result;
//!
//! #[derive(Clone, Default)]
//! struct Median { value: Option<f64> }
//!
//! impl Model for Median {
//!     fn fit(&mut self, rows: &[Row]) -> Result<()> { /* ... */ Ok(()) }
//!     fn predict(&self, _row: &Row) -> Result<f64> {
//!         self.value.ok_or_else(|| anyhow::anyhow!("not fitted"))
//!     }
//!     fn clone_model(&self) -> Box<dyn Model> { Box::new(self.clone()) }
//!     fn name(&self) -> &str { "median" }
//! }
//!
//! let template = ModelTemplate::custom(Median::default());
//! ```

mod linear;
mod mean;

pub use linear::LinearRegression;
pub use mean::MeanModel;

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::types::Row;

/// Trait for models the engine can cross-validate.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: each fold trains its own instance on
/// a worker thread, and the template is shared read-only between folds.
///
/// # Error Handling
///
/// Failures are reported through `anyhow::Result`. The engine attributes them
/// to the fold that raised them and never retries.
pub trait Model: Send + Sync {
    /// Train on `rows`, replacing any previous state.
    fn fit(&mut self, rows: &[Row]) -> Result<()>;

    /// Predict the target of one row.
    fn predict(&self, row: &Row) -> Result<f64>;

    /// A fresh instance with the same configuration.
    fn clone_model(&self) -> Box<dyn Model>;

    /// Name for logging and reports.
    fn name(&self) -> &str;
}

/// Declarative description of a built-in model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSpec {
    /// Predicts the mean training target.
    Mean,
    /// Ordinary least squares with intercept.
    LinearRegression {
        #[serde(default = "default_ridge")]
        ridge: f64,
    },
}

fn default_ridge() -> f64 {
    LinearRegression::DEFAULT_RIDGE
}

impl ModelSpec {
    pub fn build(&self) -> Box<dyn Model> {
        match self {
            Self::Mean => Box::new(MeanModel::new()),
            Self::LinearRegression { ridge } => Box::new(LinearRegression::with_ridge(*ridge)),
        }
    }
}

/// The model configuration a stage instantiates once per fold.
#[derive(Clone)]
pub enum ModelTemplate {
    /// A built-in model; serializable.
    Builtin(ModelSpec),
    /// Any [`Model`] implementation; code-only.
    Custom(Arc<dyn Model>),
}

impl ModelTemplate {
    pub fn custom<M: Model + 'static>(model: M) -> Self {
        Self::Custom(Arc::new(model))
    }

    /// A new, untrained instance owned by the caller.
    pub fn instantiate(&self) -> Box<dyn Model> {
        match self {
            Self::Builtin(spec) => spec.build(),
            Self::Custom(model) => model.clone_model(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Builtin(ModelSpec::Mean) => "mean".to_string(),
            Self::Builtin(ModelSpec::LinearRegression { .. }) => "linear_regression".to_string(),
            Self::Custom(model) => model.name().to_string(),
        }
    }
}

impl Default for ModelTemplate {
    fn default() -> Self {
        Self::Builtin(ModelSpec::LinearRegression {
            ridge: LinearRegression::DEFAULT_RIDGE,
        })
    }
}

impl From<ModelSpec> for ModelTemplate {
    fn from(spec: ModelSpec) -> Self {
        Self::Builtin(spec)
    }
}

impl fmt::Debug for ModelTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(spec) => f.debug_tuple("Builtin").field(spec).finish(),
            Self::Custom(model) => f.debug_tuple("Custom").field(&model.name()).finish(),
        }
    }
}

impl Serialize for ModelTemplate {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Builtin(spec) => spec.serialize(serializer),
            Self::Custom(model) => Err(serde::ser::Error::custom(format!(
                "custom model '{}' cannot be serialized",
                model.name()
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for ModelTemplate {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        ModelSpec::deserialize(deserializer).map(Self::Builtin)
    }
}

static_assertions::assert_impl_all!(ModelTemplate: Send, Sync);
