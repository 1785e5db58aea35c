//! The gradient boosted trees training loop.
//!
//! The trainer drives the per-iteration contract of the loss layer:
//!
//! 1. `update_gradients` recomputes gradients from the running predictions;
//! 2. one tree per gradient dimension is grown by the external
//!    [`TreeGrower`], which assigns leaf values through the loss's leaf
//!    setter;
//! 3. `update_predictions` folds the new trees into the predictions;
//! 4. optionally, loss and metrics are computed on a validation split.
//!
//! Each iteration appends exactly `output_dim` trees to the ensemble. The
//! only randomness is the caller-seeded RNG handed to the loss; given the
//! same seed and summation order, training is reproducible.

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::data::Dataset;
use crate::error::{GbtError, Result};
use crate::model::{GradientBoostedTreesModel, ModelMeta, Task};
use crate::trees::Tree;
use crate::usage::{null_usage, SharedUsageSink};
use crate::utils::Parallelism;

use super::callback::{EarlyStopAction, EarlyStopping};
use super::config::GbtConfig;
use super::gradient::{allocate_gradients, GradientData};
use super::logger::{TrainingLogger, Verbosity};
use super::loss::{create_loss, Loss, LossKind, SetLeafFn};
use super::ranking::RankingGroupsIndex;

// =============================================================================
// TreeGrower contract
// =============================================================================

/// The external split-finding collaborator.
///
/// Given the gradient of one output dimension, a grower builds a tree
/// structure and must invoke `set_leaf` exactly once per finalized leaf with
/// the rows routed to it. Growers are called once per dimension per
/// iteration, possibly concurrently across dimensions; every invocation
/// writes to a distinct tree.
pub trait TreeGrower: Send + Sync {
    /// Grow one tree for the given gradient dimension.
    fn grow_tree(
        &self,
        dataset: &Dataset,
        gradient: &GradientData,
        weights: &[f32],
        set_leaf: &SetLeafFn<'_>,
    ) -> Result<Tree>;
}

// =============================================================================
// Options
// =============================================================================

/// Trainer options.
#[derive(Debug, Clone)]
pub struct TrainerOptions {
    /// Number of boosting iterations.
    pub num_iterations: usize,
    /// Seed of the training RNG.
    pub seed: u64,
    /// Thread-count semantics for the per-dimension tree fan-out:
    /// 0 = auto, 1 = sequential, n = up to n threads.
    pub n_threads: usize,
    /// Stop when the validation loss has not improved for this many
    /// iterations; 0 disables early stopping.
    pub early_stopping_rounds: usize,
    /// Verbosity of training output.
    pub verbosity: Verbosity,
    /// Loss-layer configuration.
    pub gbt: GbtConfig,
}

impl Default for TrainerOptions {
    fn default() -> Self {
        Self {
            num_iterations: 100,
            seed: 42,
            n_threads: 0,
            early_stopping_rounds: 0,
            verbosity: Verbosity::default(),
            gbt: GbtConfig::default(),
        }
    }
}

/// What to train: task, loss and column bindings.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    /// Model name, recorded in the metadata.
    pub name: String,
    /// Learning task.
    pub task: Task,
    /// Loss to optimize.
    pub loss: LossKind,
    /// Label column index.
    pub label_col_idx: usize,
    /// Ranking group column index; required for ranking tasks.
    pub ranking_group_col_idx: Option<usize>,
}

// =============================================================================
// Trainer
// =============================================================================

/// Trains a [`GradientBoostedTreesModel`] with an external tree grower.
pub struct GbtTrainer<G: TreeGrower> {
    grower: G,
    options: TrainerOptions,
    usage: SharedUsageSink,
}

impl<G: TreeGrower> GbtTrainer<G> {
    /// Create a trainer.
    pub fn new(grower: G, options: TrainerOptions) -> Self {
        Self {
            grower,
            options,
            usage: null_usage(),
        }
    }

    /// Attach a usage telemetry sink.
    pub fn with_usage_sink(mut self, usage: SharedUsageSink) -> Self {
        self.usage = usage;
        self
    }

    /// The trainer options.
    pub fn options(&self) -> &TrainerOptions {
        &self.options
    }

    /// Train a model.
    ///
    /// `weights` may be empty for uniform example weights. `valid` is an
    /// optional held-out split `(dataset, weights)` used for the validation
    /// loss and early stopping.
    pub fn train(
        &self,
        spec: &ModelSpec,
        dataset: &Dataset,
        weights: &[f32],
        valid: Option<(&Dataset, &[f32])>,
    ) -> Result<GradientBoostedTreesModel> {
        let n_rows = dataset.nrow();
        if !weights.is_empty() && weights.len() != n_rows {
            return Err(GbtError::InvalidData(format!(
                "{} weights for {} examples",
                weights.len(),
                n_rows
            )));
        }
        self.usage.on_training_start(n_rows as u64);

        let label_column = dataset.spec().column(spec.label_col_idx);
        let loss = create_loss(spec.loss, spec.task, label_column, &self.options.gbt)?;
        let dim = loss.output_dim();

        // Ranking state. The group indices are immutable once built.
        let group_col_idx = if spec.task == Task::Ranking {
            Some(spec.ranking_group_col_idx.ok_or_else(|| {
                GbtError::InvalidConfiguration(
                    "a ranking task requires a ranking group column".to_string(),
                )
            })?)
        } else {
            None
        };
        let ranking_index = match group_col_idx {
            Some(group_col_idx) => Some(RankingGroupsIndex::build(
                dataset,
                spec.label_col_idx,
                group_col_idx,
            )?),
            None => None,
        };
        let valid_ranking_index = match (&valid, group_col_idx) {
            (Some((valid_dataset, _)), Some(group_col_idx)) => Some(RankingGroupsIndex::build(
                valid_dataset,
                spec.label_col_idx,
                group_col_idx,
            )?),
            _ => None,
        };

        // Running predictions, row-major: predictions[row * dim + output].
        let initial_predictions = loss.initial_predictions(dataset, spec.label_col_idx, weights)?;
        let mut predictions = filled_predictions(&initial_predictions, n_rows);
        let mut valid_predictions =
            valid.map(|(valid_dataset, _)| filled_predictions(&initial_predictions, valid_dataset.nrow()));

        let mut gradients = allocate_gradients(dim, n_rows, loss.needs_hessian());
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.options.seed);
        let parallelism = Parallelism::from_threads(self.options.n_threads);
        let logger = TrainingLogger::new(self.options.verbosity);
        let mut early_stopping = EarlyStopping::new(self.options.early_stopping_rounds);
        let metric_names = loss.secondary_metric_names();

        // Every column that is neither the label nor the group id is an
        // input feature.
        let input_features: Vec<usize> = (0..dataset.spec().num_columns())
            .filter(|&col| col != spec.label_col_idx && Some(col) != spec.ranking_group_col_idx)
            .collect();
        let mut model = GradientBoostedTreesModel::new(
            ModelMeta {
                name: spec.name.clone(),
                task: spec.task,
                label_col_idx: spec.label_col_idx,
                ranking_group_col_idx: spec.ranking_group_col_idx,
                weight_col_idx: None,
                input_features,
                data_spec: dataset.spec().clone(),
            },
            spec.loss,
            dim,
            initial_predictions,
        );

        logger.start_training(self.options.num_iterations, n_rows);

        for iteration in 0..self.options.num_iterations {
            loss.update_gradients(
                dataset,
                spec.label_col_idx,
                &predictions,
                ranking_index.as_ref(),
                &mut gradients,
                &mut rng,
            )?;

            // Grow one tree per gradient dimension. The leaf setters read
            // shared state and write to disjoint trees, so the fan-out needs
            // no synchronization.
            let loss_ref: &dyn Loss = loss.as_ref();
            let grown: Vec<Result<Tree>> = parallelism.maybe_par_map(0..dim, |output| {
                let set_leaf =
                    loss_ref.leaf_setter(&predictions, &gradients, spec.label_col_idx, output);
                self.grower
                    .grow_tree(dataset, &gradients[output], weights, &set_leaf)
            });
            let new_trees: Vec<Tree> = grown.into_iter().collect::<Result<_>>()?;

            let tree_refs: Vec<&Tree> = new_trees.iter().collect();
            loss.update_predictions(&tree_refs, dataset, &mut predictions)?;
            if let (Some((valid_dataset, _)), Some(valid_predictions)) =
                (&valid, valid_predictions.as_mut())
            {
                loss.update_predictions(&tree_refs, valid_dataset, valid_predictions)?;
            }
            for tree in new_trees {
                model.add_tree(tree);
            }

            let train_results = loss.loss_and_metrics(
                dataset,
                spec.label_col_idx,
                &predictions,
                weights,
                ranking_index.as_ref(),
            )?;
            let valid_results = match (&valid, valid_predictions.as_ref()) {
                (Some((valid_dataset, valid_weights)), Some(valid_predictions)) => {
                    Some(loss.loss_and_metrics(
                        valid_dataset,
                        spec.label_col_idx,
                        valid_predictions,
                        valid_weights,
                        valid_ranking_index.as_ref(),
                    )?)
                }
                _ => None,
            };
            logger.log_round(iteration, &train_results, valid_results.as_ref(), &metric_names);

            if let Some(valid_results) = &valid_results {
                model.set_validation_loss(Some(valid_results.loss));
                match early_stopping.update(valid_results.loss) {
                    EarlyStopAction::Improved | EarlyStopAction::Continue => {}
                    EarlyStopAction::Stop => {
                        logger.log_early_stopping(iteration, early_stopping.best_round());
                        model.truncate_iterations(early_stopping.best_round() + 1);
                        model.set_validation_loss(early_stopping.best_value());
                        break;
                    }
                }
            }
        }

        logger.finish_training(model.trees().len());
        self.usage
            .on_training_end(n_rows as u64, model.trees().len());
        model.validate()?;
        Ok(model)
    }
}

/// A row-major prediction vector filled with the initial predictions.
fn filled_predictions(initial_predictions: &[f32], n_rows: usize) -> Vec<f32> {
    let dim = initial_predictions.len();
    let mut predictions = vec![0.0f32; n_rows * dim];
    for row in 0..n_rows {
        predictions[row * dim..(row + 1) * dim].copy_from_slice(initial_predictions);
    }
    predictions
}

// =============================================================================
// Tests
// =============================================================================
