//! canopy: gradient boosted decision trees for classification, regression
//! and ranking.
//!
//! The crate trains an additive ensemble of shallow regression trees by
//! functional gradient descent on a configurable loss, then serves the
//! ensemble for inference.
//!
//! # Key Types
//!
//! - [`GbtTrainer`] / [`TrainerOptions`] / [`ModelSpec`] - the training loop
//! - [`Loss`] / [`LossKind`] - the five training objectives
//! - [`GradientBoostedTreesModel`] / [`Prediction`] - the trained artifact
//! - [`Dataset`] / [`DatasetBuilder`] - columnar training data
//! - [`persist`] - model directory save/load
//!
//! # Training
//!
//! Assemble a [`Dataset`], pick a [`LossKind`] matching the [`Task`], plug in
//! a [`TreeGrower`] (the split finder is an external collaborator; the
//! [`testing`] module ships deterministic toy growers) and call
//! [`GbtTrainer::train`].
//!
//! # Reproducibility
//!
//! All randomness flows through one RNG seeded from
//! [`TrainerOptions::seed`]. Given the same seed and the same summation
//! order, gradients and leaf values are reproducible bit for bit.

pub mod data;
pub mod error;
pub mod metrics;
pub mod model;
pub mod persist;
pub mod testing;
pub mod training;
pub mod trees;
pub mod usage;

mod utils;

// =============================================================================
// Convenience re-exports
// =============================================================================

pub use data::{Dataset, DatasetBuilder};
pub use error::{GbtError, Result};
pub use model::{GradientBoostedTreesModel, ModelMeta, Prediction, Task};
pub use training::{
    GbtConfig, GbtTrainer, Loss, LossKind, ModelSpec, TrainerOptions, TreeGrower,
};
pub use usage::{NullUsage, UsageSink};
pub use utils::Parallelism;
