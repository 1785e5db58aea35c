//! Squared-error loss for regression and score-based ranking.

use rand::RngCore;

use crate::data::Dataset;
use crate::error::{GbtError, Result};
use crate::metrics::rmse;
use crate::model::Task;
use crate::trees::Tree;
use crate::utils::{example_weight, weight_iter};

use super::super::config::GbtConfig;
use super::super::gradient::GradientData;
use super::super::ranking::RankingGroupsIndex;
use super::{
    expect_single_tree, update_with_single_univariate_tree, Loss, LossKind, LossResults,
    SetLeafFn, NDCG5_TRUNCATION,
};

/// Squared-error loss.
///
/// - gradient: `label - prediction` (no hessian; the Newton step is
///   degenerate, the leaf is the weighted mean residual)
/// - leaf: `shrinkage * sum(w * (label - prediction)) / (sum(w) + l2 / 2)`.
///   The denominator carries an implicit 2x factor historically absorbed
///   into the shrinkage; it is kept to preserve the behavior of existing
///   training configurations.
///
/// The reported loss value is the RMSE, not the mean squared error. This is
/// intentional and load-bearing: persisted validation losses of older models
/// were recorded as RMSE, and changing the scale would silently break their
/// comparisons.
#[derive(Debug, Clone)]
pub struct MeanSquaredErrorLoss {
    config: GbtConfig,
    task: Task,
}

impl MeanSquaredErrorLoss {
    /// Create the loss; call [`Loss::validate`] before training with it.
    pub fn new(config: &GbtConfig, task: Task) -> Self {
        Self {
            config: config.clone(),
            task,
        }
    }
}

impl Loss for MeanSquaredErrorLoss {
    fn kind(&self) -> LossKind {
        LossKind::SquaredError
    }

    fn validate(&self) -> Result<()> {
        if self.task != Task::Regression && self.task != Task::Ranking {
            return Err(GbtError::InvalidConfiguration(
                "mean squared error loss is only compatible with a regression or ranking task"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn needs_hessian(&self) -> bool {
        false
    }

    fn initial_predictions(
        &self,
        dataset: &Dataset,
        label_col_idx: usize,
        weights: &[f32],
    ) -> Result<Vec<f32>> {
        // The weighted mean of the labels.
        let labels = dataset.numerical(label_col_idx);
        let mut weighted_sum_values = 0.0f64;
        let mut sum_weights = 0.0f64;
        for (i, weight) in weight_iter(weights, dataset.nrow()).enumerate() {
            sum_weights += weight as f64;
            weighted_sum_values += weight as f64 * labels[i] as f64;
        }
        if sum_weights <= 0.0 {
            return Err(GbtError::InvalidData(
                "the sum of weights is null; the dataset is either empty or contains null weights"
                    .to_string(),
            ));
        }
        Ok(vec![(weighted_sum_values / sum_weights) as f32])
    }

    fn update_gradients(
        &self,
        dataset: &Dataset,
        label_col_idx: usize,
        predictions: &[f32],
        _ranking_index: Option<&RankingGroupsIndex>,
        gradients: &mut [GradientData],
        _rng: &mut dyn RngCore,
    ) -> Result<()> {
        if gradients.len() != 1 {
            return Err(GbtError::Internal("wrong gradient shape".to_string()));
        }
        let labels = dataset.numerical(label_col_idx);
        let gradient = &mut gradients[0].gradient;
        for example_idx in 0..dataset.nrow() {
            gradient[example_idx] = labels[example_idx] - predictions[example_idx];
        }
        Ok(())
    }

    fn leaf_setter<'a>(
        &'a self,
        predictions: &'a [f32],
        _gradients: &'a [GradientData],
        label_col_idx: usize,
        _dim: usize,
    ) -> SetLeafFn<'a> {
        Box::new(move |dataset, selected_examples, weights, regressor| {
            // The leaf is the weighted mean residual of its examples.
            let labels = dataset.numerical(label_col_idx);
            let mut sum_weighted_values = 0.0f64;
            let mut sum_weights = 0.0f64;
            for &example_idx in selected_examples {
                let example_idx = example_idx as usize;
                let weight = example_weight(weights, example_idx) as f64;
                let residual = (labels[example_idx] - predictions[example_idx]) as f64;
                sum_weighted_values += weight * residual;
                sum_weights += weight;
            }
            regressor.top_value = self.config.shrinkage
                * (sum_weighted_values
                    / (sum_weights + self.config.l2_regularization as f64 / 2.0))
                    as f32;
            Ok(())
        })
    }

    fn update_predictions(
        &self,
        new_trees: &[&Tree],
        dataset: &Dataset,
        predictions: &mut [f32],
    ) -> Result<f64> {
        let tree = expect_single_tree(new_trees)?;
        Ok(update_with_single_univariate_tree(tree, dataset, predictions))
    }

    fn loss_and_metrics(
        &self,
        dataset: &Dataset,
        label_col_idx: usize,
        predictions: &[f32],
        weights: &[f32],
        ranking_index: Option<&RankingGroupsIndex>,
    ) -> Result<LossResults> {
        let labels = dataset.numerical(label_col_idx);
        let rmse_value = rmse(labels, predictions, weights);

        if self.task == Task::Ranking {
            let index = ranking_index
                .ok_or_else(|| GbtError::Internal("missing ranking index".to_string()))?;
            let ndcg = index.ndcg(predictions, weights, NDCG5_TRUNCATION) as f32;
            Ok(LossResults {
                loss: rmse_value,
                secondary_metrics: vec![rmse_value, ndcg],
            })
        } else {
            Ok(LossResults {
                loss: rmse_value,
                secondary_metrics: vec![rmse_value],
            })
        }
    }

    fn secondary_metric_names(&self) -> Vec<&'static str> {
        if self.task == Task::Ranking {
            vec!["rmse", "NDCG@5"]
        } else {
            vec!["rmse"]
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
