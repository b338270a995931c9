//! K-fold cross-validation.
//!
//! - [`FoldAssignment`]: seeded row-to-fold mapping
//! - [`FoldExecutor`]: trains on every fold but one and predicts the held-out one
//! - [`CrossValidationCoordinator`]: runs every fold (sequentially or on a
//!   rayon pool), waits for all of them and merges predictions into row order

mod coordinator;
mod executor;
mod partition;

pub use coordinator::{CrossValidationCoordinator, CrossValidator};
pub use executor::FoldExecutor;
pub use partition::FoldAssignment;
