//! Training infrastructure for gradient boosted trees.
//!
//! This module provides the pieces of the training core:
//!
//! - [`GradientData`]: per-dimension gradient (and optional hessian) storage
//! - [`Loss`] and [`create_loss`]: the five training objectives
//! - [`RankingGroupsIndex`]: example grouping and NDCG for the ranking losses
//! - [`GbtConfig`]: the configuration recognized by the loss layer
//! - [`GbtTrainer`] and [`TreeGrower`]: the boosting loop and the external
//!   split-finder contract
//! - [`EarlyStopping`], [`TrainingLogger`], [`Verbosity`]: loop plumbing

mod callback;
mod config;
mod gradient;
mod logger;
mod loss;
mod ranking;
mod trainer;

pub use callback::{EarlyStopAction, EarlyStopping};
pub use config::{GbtConfig, LambdaMartNdcgConfig, XeNdcgConfig, XeNdcgGamma};
pub use gradient::{allocate_gradients, GradientData};
pub use logger::{TrainingLogger, Verbosity};
pub use loss::{
    create_loss, BinomialLogLikelihoodLoss, CrossEntropyNdcgLoss, Loss, LossKind, LossResults,
    MeanSquaredErrorLoss, MultinomialLogLikelihoodLoss, NdcgLoss, SetLeafFn,
};
pub use ranking::{Group, Item, RankingGroupsIndex, MAX_ITEMS_IN_RANKING_GROUP};
pub use trainer::{GbtTrainer, ModelSpec, TrainerOptions, TreeGrower};
