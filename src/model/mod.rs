//! The gradient boosted trees ensemble model.
//!
//! The persisted artifact of a training run: an ordered list of trees, the
//! loss they were trained with, the per-iteration tree count, and the initial
//! predictions the accumulation starts from. Inference combines them into a
//! task-specific prediction (see [`Prediction`]).

mod meta;

pub use meta::{ModelMeta, Task};

use std::fmt::Write as _;

use crate::data::Dataset;
use crate::error::{GbtError, Result};
use crate::training::LossKind;
use crate::trees::Tree;
use crate::usage::{null_usage, SharedUsageSink};

/// A task-appropriate prediction for one example.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// Classification output.
    ///
    /// `distribution[class]` is the probability of each class;
    /// `distribution[0]` is the reserved out-of-vocabulary slot and is always
    /// 0. `value` is the predicted class, in `[1, num_classes - 1]`.
    Classification {
        value: u32,
        distribution: Vec<f32>,
        sum: f32,
    },
    /// Regression output.
    Regression { value: f32 },
    /// Ranking output.
    Ranking { relevance: f32 },
}

/// A trained gradient boosted trees ensemble.
///
/// Invariants (checked by [`validate`](Self::validate)):
/// - `trees.len()` is a multiple of `num_trees_per_iter`;
/// - `initial_predictions.len() == num_trees_per_iter`, which equals the
///   output dimension implied by the task and loss.
#[derive(Debug, Clone)]
pub struct GradientBoostedTreesModel {
    meta: ModelMeta,
    trees: Vec<Tree>,
    loss: LossKind,
    num_trees_per_iter: usize,
    initial_predictions: Vec<f32>,
    validation_loss: Option<f32>,
    node_format: Option<String>,
    training_logs: Option<String>,
    usage: SharedUsageSink,
}

impl GradientBoostedTreesModel {
    /// Create an empty ensemble; trees are appended during training.
    pub fn new(
        meta: ModelMeta,
        loss: LossKind,
        num_trees_per_iter: usize,
        initial_predictions: Vec<f32>,
    ) -> Self {
        Self {
            meta,
            trees: Vec::new(),
            loss,
            num_trees_per_iter,
            initial_predictions,
            validation_loss: None,
            node_format: None,
            training_logs: None,
            usage: null_usage(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn loss(&self) -> LossKind {
        self.loss
    }

    pub fn num_trees_per_iter(&self) -> usize {
        self.num_trees_per_iter
    }

    pub fn initial_predictions(&self) -> &[f32] {
        &self.initial_predictions
    }

    pub fn validation_loss(&self) -> Option<f32> {
        self.validation_loss
    }

    pub fn node_format(&self) -> Option<&str> {
        self.node_format.as_deref()
    }

    pub fn training_logs(&self) -> Option<&str> {
        self.training_logs.as_deref()
    }

    /// Number of iterations represented by the stored trees.
    pub fn num_iterations(&self) -> usize {
        self.trees.len() / self.num_trees_per_iter
    }

    // =========================================================================
    // Mutation during training / loading
    // =========================================================================

    /// Append a tree. The tree list is append-only during training.
    pub fn add_tree(&mut self, tree: Tree) {
        self.trees.push(tree);
    }

    /// Drop trees past the first `num_iterations` iterations (early
    /// stopping rollback). Keeps whole iterations only.
    pub fn truncate_iterations(&mut self, num_iterations: usize) {
        self.trees.truncate(num_iterations * self.num_trees_per_iter);
    }

    pub fn set_validation_loss(&mut self, validation_loss: Option<f32>) {
        self.validation_loss = validation_loss;
    }

    pub fn set_node_format(&mut self, node_format: Option<String>) {
        self.node_format = node_format;
    }

    pub fn set_training_logs(&mut self, training_logs: Option<String>) {
        self.training_logs = training_logs;
    }

    /// Attach a usage telemetry sink (the default drops every event).
    pub fn set_usage_sink(&mut self, usage: SharedUsageSink) {
        self.usage = usage;
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check the structural invariants of the ensemble.
    pub fn validate(&self) -> Result<()> {
        if self.num_trees_per_iter == 0 {
            return Err(GbtError::InvalidConfiguration(
                "invalid number of trees per iteration in the gradient boosted trees model"
                    .to_string(),
            ));
        }
        if self.trees.len() % self.num_trees_per_iter != 0 {
            return Err(GbtError::InvalidConfiguration(
                "invalid number of trees in the gradient boosted trees model".to_string(),
            ));
        }

        let expected_initial_predictions_size = match self.meta.task {
            Task::Classification => match self.loss {
                LossKind::MultinomialLogLikelihood => {
                    let label = self.meta.data_spec.column(self.meta.label_col_idx);
                    label.num_unique_values.saturating_sub(1) as usize
                }
                LossKind::BinomialLogLikelihood => 1,
                _ => {
                    return Err(GbtError::InvalidConfiguration(
                        "invalid loss for a classification gradient boosted trees model"
                            .to_string(),
                    ))
                }
            },
            Task::Regression => 1,
            Task::Ranking => {
                if self.meta.ranking_group_col_idx.is_none() {
                    return Err(GbtError::InvalidConfiguration(
                        "invalid ranking group column in the gradient boosted trees model"
                            .to_string(),
                    ));
                }
                1
            }
        };

        if self.initial_predictions.len() != expected_initial_predictions_size {
            return Err(GbtError::InvalidConfiguration(
                "invalid initial predictions in the gradient boosted trees model".to_string(),
            ));
        }
        if expected_initial_predictions_size != self.num_trees_per_iter {
            return Err(GbtError::InvalidConfiguration(
                "invalid number of trees per iteration in the gradient boosted trees model"
                    .to_string(),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Inference
    // =========================================================================

    /// Predict one example.
    ///
    /// The prediction shape is decided by the loss: a class distribution for
    /// the classification losses, a scalar for regression, a relevance score
    /// for ranking.
    pub fn predict(&self, dataset: &Dataset, row: usize) -> Prediction {
        self.usage.on_inference(1);
        match self.loss {
            LossKind::BinomialLogLikelihood => {
                let mut accumulator = self.initial_predictions[0] as f64;
                for tree in &self.trees {
                    accumulator += tree.leaf(dataset, row).top_value as f64;
                }
                let proba_true = (1.0 / (1.0 + (-accumulator).exp())) as f32;
                Prediction::Classification {
                    value: if proba_true > 0.5 { 2 } else { 1 },
                    distribution: vec![0.0, 1.0 - proba_true, proba_true],
                    sum: 1.0,
                }
            }
            LossKind::MultinomialLogLikelihood => {
                // The initial prediction of the multinomial loss is zero.
                let dim = self.num_trees_per_iter;
                let mut accumulator = vec![0.0f32; dim];
                let mut cell_idx = 0usize;
                for tree in &self.trees {
                    accumulator[cell_idx] += tree.leaf(dataset, row).top_value;
                    cell_idx += 1;
                    if cell_idx == dim {
                        cell_idx = 0;
                    }
                }
                debug_assert_eq!(cell_idx, 0, "tree count is not a multiple of the dimension");

                // Stabilized softmax over the accumulator; slot 0 stays 0 for
                // the out-of-vocabulary class.
                let max_acc = accumulator.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let mut distribution = vec![0.0f32; dim + 1];
                let mut sum_exp = 0.0f32;
                for (k, &acc) in accumulator.iter().enumerate() {
                    let exp_value = (acc - max_acc).exp();
                    distribution[k + 1] = exp_value;
                    sum_exp += exp_value;
                }
                let normalization = if sum_exp > 0.0 { 1.0 / sum_exp } else { 0.0 };

                let mut highest_cell_value = 0.0f32;
                let mut highest_cell_idx = 0usize;
                for k in 0..dim {
                    let value = distribution[k + 1];
                    if value > highest_cell_value {
                        highest_cell_value = value;
                        highest_cell_idx = k;
                    }
                    distribution[k + 1] = value * normalization;
                }
                Prediction::Classification {
                    value: (highest_cell_idx + 1) as u32,
                    distribution,
                    sum: 1.0,
                }
            }
            LossKind::SquaredError => {
                let mut accumulator = self.initial_predictions[0] as f64;
                for tree in &self.trees {
                    accumulator += tree.leaf(dataset, row).top_value as f64;
                }
                match self.meta.task {
                    Task::Ranking => Prediction::Ranking {
                        relevance: accumulator as f32,
                    },
                    Task::Regression => Prediction::Regression {
                        value: accumulator as f32,
                    },
                    Task::Classification => {
                        unreachable!("squared error on a classification task; validate() rejects this")
                    }
                }
            }
            LossKind::LambdaMartNdcg5 | LossKind::XeNdcgMart => {
                let mut accumulator = self.initial_predictions[0] as f64;
                for tree in &self.trees {
                    accumulator += tree.leaf(dataset, row).top_value as f64;
                }
                Prediction::Ranking {
                    relevance: accumulator as f32,
                }
            }
        }
    }

    // =========================================================================
    // Description
    // =========================================================================

    /// Human-readable model summary.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Loss: {}", self.loss.name());
        if let Some(validation_loss) = self.validation_loss {
            let _ = writeln!(out, "Validation loss value: {}", validation_loss);
        }
        let _ = writeln!(out, "Number of trees per iteration: {}", self.num_trees_per_iter);
        let _ = writeln!(out, "Number of trees: {}", self.trees.len());
        let _ = writeln!(
            out,
            "Node format: {}",
            self.node_format.as_deref().unwrap_or("NOT_SET")
        );
        let _ = writeln!(
            out,
            "Initial predictions: {}",
            self.initial_predictions
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );
        out
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnSpec, ColumnType, DataSpec, DatasetBuilder};
    use crate::trees::Regressor;
    use approx::assert_relative_eq;

    fn classification_meta(num_classes_with_oov: u32) -> ModelMeta {
        ModelMeta {
            name: "test".to_string(),
            task: Task::Classification,
            label_col_idx: 0,
            ranking_group_col_idx: None,
            weight_col_idx: None,
            input_features: vec![1],
            data_spec: DataSpec::new(vec![
                ColumnSpec {
                    name: "label".to_string(),
                    column_type: ColumnType::Categorical,
                    num_unique_values: num_classes_with_oov,
                },
                ColumnSpec {
                    name: "f".to_string(),
                    column_type: ColumnType::Numerical,
                    num_unique_values: 0,
                },
            ]),
        }
    }

    fn regression_meta() -> ModelMeta {
        ModelMeta {
            name: "test".to_string(),
            task: Task::Regression,
            label_col_idx: 0,
            ranking_group_col_idx: None,
            weight_col_idx: None,
            input_features: vec![1],
            data_spec: DataSpec::new(vec![
                ColumnSpec {
                    name: "label".to_string(),
                    column_type: ColumnType::Numerical,
                    num_unique_values: 0,
                },
                ColumnSpec {
                    name: "f".to_string(),
                    column_type: ColumnType::Numerical,
                    num_unique_values: 0,
                },
            ]),
        }
    }

    fn leaf(top_value: f32) -> Tree {
        Tree::single_leaf(Regressor {
            top_value,
            hessian_stats: None,
        })
    }

    fn sample_dataset() -> Dataset {
        DatasetBuilder::default()
            .categorical("label", 3, vec![1])
            .numerical("f", vec![0.0])
            .build()
            .unwrap()
    }

    #[test]
    fn binomial_prediction_distribution_sums_to_one() {
        let mut model = GradientBoostedTreesModel::new(
            classification_meta(3),
            LossKind::BinomialLogLikelihood,
            1,
            vec![0.0],
        );
        model.add_tree(leaf(1.0));
        model.validate().unwrap();

        let dataset = sample_dataset();
        match model.predict(&dataset, 0) {
            Prediction::Classification {
                value,
                distribution,
                sum,
            } => {
                assert_eq!(value, 2); // sigmoid(1.0) > 0.5
                assert_eq!(distribution.len(), 3);
                assert_eq!(distribution[0], 0.0);
                assert_relative_eq!(distribution[1] + distribution[2], 1.0, epsilon = 1e-6);
                assert_relative_eq!(distribution[2], 1.0 / (1.0 + (-1.0f32).exp()), epsilon = 1e-6);
                assert_eq!(sum, 1.0);
            }
            other => panic!("unexpected prediction {:?}", other),
        }
    }

    #[test]
    fn binomial_sentinel_initial_prediction_saturates() {
        let model = GradientBoostedTreesModel::new(
            classification_meta(3),
            LossKind::BinomialLogLikelihood,
            1,
            vec![-f32::MAX],
        );
        let dataset = sample_dataset();
        match model.predict(&dataset, 0) {
            Prediction::Classification { value, distribution, .. } => {
                assert_eq!(value, 1);
                assert_relative_eq!(distribution[1], 1.0, epsilon = 1e-6);
                assert_relative_eq!(distribution[2], 0.0, epsilon = 1e-6);
            }
            other => panic!("unexpected prediction {:?}", other),
        }
    }

    #[test]
    fn multinomial_prediction_cycles_trees_over_classes() {
        // K = 2, two iterations: trees [0.5, 0.1, 0.5, 0.1] accumulate to
        // logits [1.0, 0.2].
        let mut model = GradientBoostedTreesModel::new(
            classification_meta(3),
            LossKind::MultinomialLogLikelihood,
            2,
            vec![0.0, 0.0],
        );
        for _ in 0..2 {
            model.add_tree(leaf(0.5));
            model.add_tree(leaf(0.1));
        }
        model.validate().unwrap();

        let dataset = sample_dataset();
        match model.predict(&dataset, 0) {
            Prediction::Classification {
                value,
                distribution,
                sum,
            } => {
                assert_eq!(value, 1);
                assert_eq!(distribution[0], 0.0);
                let total: f32 = distribution.iter().sum();
                assert_relative_eq!(total, 1.0, epsilon = 1e-6);
                assert!(distribution[1] > distribution[2]);
                assert_eq!(sum, 1.0);
            }
            other => panic!("unexpected prediction {:?}", other),
        }
    }

    #[test]
    fn multinomial_equal_logits_give_uniform_distribution() {
        // Identical accumulators must softmax to exactly 1/K for any finite
        // magnitude, courtesy of the max subtraction.
        let mut model = GradientBoostedTreesModel::new(
            classification_meta(4),
            LossKind::MultinomialLogLikelihood,
            3,
            vec![0.0, 0.0, 0.0],
        );
        for _ in 0..3 {
            model.add_tree(leaf(500.0));
        }
        model.validate().unwrap();

        let dataset = sample_dataset();
        match model.predict(&dataset, 0) {
            Prediction::Classification { distribution, .. } => {
                for k in 1..4 {
                    assert_relative_eq!(distribution[k], 1.0 / 3.0, epsilon = 1e-6);
                }
            }
            other => panic!("unexpected prediction {:?}", other),
        }
    }

    #[test]
    fn regression_prediction_accumulates_leaves() {
        let mut model = GradientBoostedTreesModel::new(
            regression_meta(),
            LossKind::SquaredError,
            1,
            vec![2.0],
        );
        model.add_tree(leaf(0.5));
        model.add_tree(leaf(-0.25));
        model.validate().unwrap();

        let dataset = DatasetBuilder::default()
            .numerical("label", vec![0.0])
            .numerical("f", vec![0.0])
            .build()
            .unwrap();
        assert_eq!(
            model.predict(&dataset, 0),
            Prediction::Regression { value: 2.25 }
        );
    }

    #[test]
    fn ranking_squared_error_emits_relevance() {
        let meta = ModelMeta {
            task: Task::Ranking,
            ranking_group_col_idx: Some(1),
            ..regression_meta()
        };
        let mut model = GradientBoostedTreesModel::new(meta, LossKind::SquaredError, 1, vec![0.5]);
        model.add_tree(leaf(0.5));
        model.validate().unwrap();

        let dataset = DatasetBuilder::default()
            .numerical("label", vec![0.0])
            .numerical("f", vec![0.0])
            .build()
            .unwrap();
        assert_eq!(
            model.predict(&dataset, 0),
            Prediction::Ranking { relevance: 1.0 }
        );
    }

    #[test]
    fn validate_rejects_broken_tree_count() {
        let mut model = GradientBoostedTreesModel::new(
            classification_meta(4),
            LossKind::MultinomialLogLikelihood,
            3,
            vec![0.0, 0.0, 0.0],
        );
        model.add_tree(leaf(0.0));
        let err = model.validate().unwrap_err();
        assert!(err.to_string().contains("invalid number of trees"));
    }

    #[test]
    fn validate_rejects_wrong_initial_predictions() {
        let model = GradientBoostedTreesModel::new(
            classification_meta(3),
            LossKind::BinomialLogLikelihood,
            1,
            vec![0.0, 0.0],
        );
        let err = model.validate().unwrap_err();
        assert!(err.to_string().contains("invalid initial predictions"));
    }

    #[test]
    fn validate_rejects_dimension_mismatch() {
        // Multinomial over 3 classes must have 3 trees per iteration.
        let model = GradientBoostedTreesModel::new(
            classification_meta(4),
            LossKind::MultinomialLogLikelihood,
            2,
            vec![0.0, 0.0],
        );
        let err = model.validate().unwrap_err();
        assert!(err.to_string().contains("invalid initial predictions"));
    }

    #[test]
    fn validate_rejects_ranking_without_group_column() {
        let meta = ModelMeta {
            task: Task::Ranking,
            ranking_group_col_idx: None,
            ..regression_meta()
        };
        let model = GradientBoostedTreesModel::new(meta, LossKind::LambdaMartNdcg5, 1, vec![0.0]);
        let err = model.validate().unwrap_err();
        assert!(err.to_string().contains("ranking group column"));
    }

    #[test]
    fn validate_rejects_classification_with_ranking_loss() {
        let model = GradientBoostedTreesModel::new(
            classification_meta(3),
            LossKind::LambdaMartNdcg5,
            1,
            vec![0.0],
        );
        let err = model.validate().unwrap_err();
        assert!(err.to_string().contains("invalid loss"));
    }

    #[test]
    fn describe_mentions_the_loss_and_shape() {
        let mut model = GradientBoostedTreesModel::new(
            classification_meta(3),
            LossKind::BinomialLogLikelihood,
            1,
            vec![0.0],
        );
        model.set_validation_loss(Some(0.25));
        let description = model.describe();
        assert!(description.contains("BINOMIAL_LOG_LIKELIHOOD"));
        assert!(description.contains("Validation loss value: 0.25"));
        assert!(description.contains("Number of trees per iteration: 1"));
        assert!(description.contains("NOT_SET"));
    }
}
