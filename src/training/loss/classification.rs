//! Classification losses: binomial and multinomial log-likelihood.

use rand::RngCore;

use crate::data::{ColumnSpec, Dataset};
use crate::error::{GbtError, Result};
use crate::model::Task;
use crate::trees::{HessianStats, Tree};
use crate::utils::{example_weight, soft_threshold, weight_iter};

use super::super::config::GbtConfig;
use super::super::gradient::GradientData;
use super::super::ranking::RankingGroupsIndex;
use super::{
    expect_single_tree, update_with_multiple_univariate_trees,
    update_with_single_univariate_tree, Loss, LossKind, LossResults, SetLeafFn,
    MIN_HESSIAN_FOR_NEWTON_STEP,
};

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

// =============================================================================
// Binomial log-likelihood
// =============================================================================

/// Binomial log-likelihood for binary classification.
///
/// Labels are categorical values in `{1, 2}` (1 = negative, 2 = positive;
/// index 0 is the reserved out-of-vocabulary value and must not appear).
/// Predictions are a single logit `f` per example with
/// `p = 1 / (1 + exp(-f))`.
///
/// - gradient: `label - p` with `label` in `{0, 1}`
/// - hessian: `p * (1 - p)`
/// - leaf: Newton step `sum(w * (label - p)) / sum(w * p * (1 - p))`,
///   L1 soft-thresholded, L2 ridged, shrunk, then clamped to
///   `[-clamp_leaf_logit, clamp_leaf_logit]`
#[derive(Debug, Clone)]
pub struct BinomialLogLikelihoodLoss {
    config: GbtConfig,
    task: Task,
    label_vocab_size: u32,
}

impl BinomialLogLikelihoodLoss {
    /// Create the loss; call [`Loss::validate`] before training with it.
    pub fn new(config: &GbtConfig, task: Task, label_column: &ColumnSpec) -> Self {
        Self {
            config: config.clone(),
            task,
            label_vocab_size: label_column.num_unique_values,
        }
    }
}

impl Loss for BinomialLogLikelihoodLoss {
    fn kind(&self) -> LossKind {
        LossKind::BinomialLogLikelihood
    }

    fn validate(&self) -> Result<()> {
        if self.task != Task::Classification {
            return Err(GbtError::InvalidConfiguration(
                "binomial log-likelihood loss is only compatible with a classification task"
                    .to_string(),
            ));
        }
        if self.label_vocab_size != 3 {
            return Err(GbtError::InvalidConfiguration(
                "binomial log-likelihood loss is only compatible with a binary classification \
                 task (a categorical label with exactly 3 unique values, OOV included)"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn initial_predictions(
        &self,
        dataset: &Dataset,
        label_col_idx: usize,
        weights: &[f32],
    ) -> Result<Vec<f32>> {
        // log(p / (1 - p)) with p the weighted ratio of positive labels.
        let labels = dataset.categorical(label_col_idx);
        let mut weighted_sum_positive = 0.0f64;
        let mut sum_weights = 0.0f64;
        for (i, weight) in weight_iter(weights, dataset.nrow()).enumerate() {
            sum_weights += weight as f64;
            if labels[i] == 2 {
                weighted_sum_positive += weight as f64;
            }
        }
        if sum_weights <= 0.0 {
            return Err(GbtError::InvalidData(
                "the sum of weights is null; the dataset is either empty or contains null weights"
                    .to_string(),
            ));
        }
        let ratio_positive = weighted_sum_positive / sum_weights;
        // The sentinels stay finite so downstream gradients saturate instead
        // of propagating NaN.
        if ratio_positive == 0.0 {
            Ok(vec![-f32::MAX])
        } else if ratio_positive == 1.0 {
            Ok(vec![f32::MAX])
        } else {
            Ok(vec![(ratio_positive / (1.0 - ratio_positive)).ln() as f32])
        }
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
        let labels = dataset.categorical(label_col_idx);
        let GradientData { gradient, hessian } = &mut gradients[0];
        for example_idx in 0..dataset.nrow() {
            let label = if labels[example_idx] == 2 { 1.0 } else { 0.0 };
            let proba = sigmoid(predictions[example_idx]);
            gradient[example_idx] = label - proba;
            if let Some(hessian) = hessian {
                hessian[example_idx] = proba * (1.0 - proba);
            }
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
            let labels = dataset.categorical(label_col_idx);

            let mut numerator = 0.0f64;
            let mut denominator = 0.0f64;
            let mut sum_weights = 0.0f64;
            for &example_idx in selected_examples {
                let example_idx = example_idx as usize;
                let weight = example_weight(weights, example_idx) as f64;
                let label = if labels[example_idx] == 2 { 1.0f64 } else { 0.0 };
                let proba = sigmoid(predictions[example_idx]) as f64;
                numerator += weight * (label - proba);
                denominator += weight * proba * (1.0 - proba);
                sum_weights += weight;
            }

            if denominator <= MIN_HESSIAN_FOR_NEWTON_STEP {
                denominator = MIN_HESSIAN_FOR_NEWTON_STEP;
            }

            if self.config.use_hessian_gain {
                regressor.hessian_stats = Some(HessianStats {
                    sum_gradients: numerator,
                    sum_hessians: denominator,
                    sum_weights,
                });
            }

            let leaf_value = self.config.shrinkage
                * (soft_threshold(numerator, self.config.l1_regularization)
                    / (denominator + self.config.l2_regularization as f64))
                    as f32;
            regressor.top_value = leaf_value
                .clamp(-self.config.clamp_leaf_logit, self.config.clamp_leaf_logit);
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
        _ranking_index: Option<&RankingGroupsIndex>,
    ) -> Result<LossResults> {
        let labels = dataset.categorical(label_col_idx);
        let mut sum_loss = 0.0f64;
        let mut count_correct = 0.0f64;
        let mut sum_weights = 0.0f64;
        for (example_idx, weight) in weight_iter(weights, dataset.nrow()).enumerate() {
            let pos_label = labels[example_idx] == 2;
            let label = if pos_label { 1.0f64 } else { 0.0 };
            let prediction = predictions[example_idx] as f64;
            let pos_prediction = prediction >= 0.0;
            sum_weights += weight as f64;
            if pos_label == pos_prediction {
                count_correct += weight as f64;
            }
            // -2 * (label * f - log(1 + exp(f)))
            sum_loss -= 2.0 * weight as f64 * (label * prediction - (1.0 + prediction.exp()).ln());
        }
        if sum_weights > 0.0 {
            Ok(LossResults {
                loss: (sum_loss / sum_weights) as f32,
                secondary_metrics: vec![(count_correct / sum_weights) as f32],
            })
        } else {
            Ok(LossResults {
                loss: f32::NAN,
                secondary_metrics: vec![f32::NAN],
            })
        }
    }

    fn secondary_metric_names(&self) -> Vec<&'static str> {
        vec!["accuracy"]
    }
}

// =============================================================================
// Multinomial log-likelihood
// =============================================================================

/// Multinomial log-likelihood for multi-class classification.
///
/// One output dimension per non-OOV class: `dim = num_unique_values - 1`.
/// Labels are categorical values in `{1, ..., dim}`; the reserved value 0 is
/// rejected. Predictions are laid out row-major,
/// `predictions[example * dim + class]`.
///
/// Per example, with `p = softmax(predictions)`:
/// - gradient of class `k`: `1[label == k + 1] - p[k]`
/// - hessian: `|g| * (1 - |g|)`
#[derive(Debug, Clone)]
pub struct MultinomialLogLikelihoodLoss {
    config: GbtConfig,
    task: Task,
    dimension: usize,
}

impl MultinomialLogLikelihoodLoss {
    /// Create the loss; call [`Loss::validate`] before training with it.
    pub fn new(config: &GbtConfig, task: Task, label_column: &ColumnSpec) -> Self {
        Self {
            config: config.clone(),
            task,
            dimension: label_column.num_unique_values.saturating_sub(1) as usize,
        }
    }
}

impl Loss for MultinomialLogLikelihoodLoss {
    fn kind(&self) -> LossKind {
        LossKind::MultinomialLogLikelihood
    }

    fn validate(&self) -> Result<()> {
        if self.task != Task::Classification {
            return Err(GbtError::InvalidConfiguration(
                "multinomial log-likelihood loss is only compatible with a classification task"
                    .to_string(),
            ));
        }
        if self.dimension < 1 {
            return Err(GbtError::InvalidConfiguration(
                "multinomial log-likelihood loss requires a categorical label with at least one \
                 class besides the reserved out-of-vocabulary value"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn output_dim(&self) -> usize {
        self.dimension
    }

    fn initial_predictions(
        &self,
        _dataset: &Dataset,
        _label_col_idx: usize,
        _weights: &[f32],
    ) -> Result<Vec<f32>> {
        // Zero per Friedman's algorithm 6: the first iteration's softmax is
        // uniform over the classes.
        Ok(vec![0.0; self.dimension])
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
        if gradients.len() != self.dimension {
            return Err(GbtError::Internal("wrong gradient shape".to_string()));
        }
        let labels = dataset.categorical(label_col_idx);
        let dim = self.dimension;
        let mut accumulator = vec![0.0f32; dim];

        for example_idx in 0..dataset.nrow() {
            let label_cat = labels[example_idx];
            if label_cat == 0 {
                return Err(GbtError::InvalidData(
                    "the label column contains the reserved out-of-vocabulary value 0".to_string(),
                ));
            }

            let mut sum_exp = 0.0f32;
            for (grad_idx, cell) in accumulator.iter_mut().enumerate() {
                let exp_value = predictions[example_idx * dim + grad_idx].exp();
                *cell = exp_value;
                sum_exp += exp_value;
            }
            let normalization = 1.0 / sum_exp;

            for grad_idx in 0..dim {
                let label = if label_cat == (grad_idx + 1) as u32 { 1.0 } else { 0.0 };
                let proba = accumulator[grad_idx] * normalization;
                let grad = label - proba;
                let GradientData { gradient, hessian } = &mut gradients[grad_idx];
                gradient[example_idx] = grad;
                if let Some(hessian) = hessian {
                    let abs_grad = grad.abs();
                    hessian[example_idx] = abs_grad * (1.0 - abs_grad);
                }
            }
        }
        Ok(())
    }

    fn leaf_setter<'a>(
        &'a self,
        _predictions: &'a [f32],
        gradients: &'a [GradientData],
        _label_col_idx: usize,
        dim: usize,
    ) -> SetLeafFn<'a> {
        let gradient = &gradients[dim].gradient;
        Box::new(move |_dataset, selected_examples, weights, regressor| {
            // The leaf value does not depend on the label directly; only on
            // the gradient of this output dimension.
            let mut numerator = 0.0f64;
            let mut denominator = 0.0f64;
            let mut sum_weights = 0.0f64;
            for &example_idx in selected_examples {
                let example_idx = example_idx as usize;
                let weight = example_weight(weights, example_idx) as f64;
                let grad = gradient[example_idx] as f64;
                let abs_grad = grad.abs();
                numerator += weight * grad;
                denominator += weight * abs_grad * (1.0 - abs_grad);
                sum_weights += weight;
            }

            if self.config.use_hessian_gain {
                regressor.hessian_stats = Some(HessianStats {
                    sum_gradients: numerator,
                    sum_hessians: denominator.max(MIN_HESSIAN_FOR_NEWTON_STEP),
                    sum_weights,
                });
            }

            numerator *= (self.dimension - 1) as f64;
            denominator *= self.dimension as f64;
            if denominator <= MIN_HESSIAN_FOR_NEWTON_STEP {
                denominator = MIN_HESSIAN_FOR_NEWTON_STEP;
            }

            let leaf_value = self.config.shrinkage
                * (soft_threshold(numerator, self.config.l1_regularization)
                    / (denominator + self.config.l2_regularization as f64))
                    as f32;
            regressor.top_value = leaf_value
                .clamp(-self.config.clamp_leaf_logit, self.config.clamp_leaf_logit);
            Ok(())
        })
    }

    fn update_predictions(
        &self,
        new_trees: &[&Tree],
        dataset: &Dataset,
        predictions: &mut [f32],
    ) -> Result<f64> {
        if new_trees.len() != self.dimension {
            return Err(GbtError::Internal(
                "wrong number of trees for a multinomial prediction update".to_string(),
            ));
        }
        Ok(update_with_multiple_univariate_trees(
            new_trees,
            dataset,
            predictions,
        ))
    }

    fn loss_and_metrics(
        &self,
        dataset: &Dataset,
        label_col_idx: usize,
        predictions: &[f32],
        weights: &[f32],
        _ranking_index: Option<&RankingGroupsIndex>,
    ) -> Result<LossResults> {
        let labels = dataset.categorical(label_col_idx);
        let dim = self.dimension;
        let mut sum_loss = 0.0f64;
        let mut count_correct = 0.0f64;
        let mut sum_weights = 0.0f64;

        for (example_idx, weight) in weight_iter(weights, dataset.nrow()).enumerate() {
            let label = labels[example_idx];
            if label == 0 {
                return Err(GbtError::InvalidData(
                    "the label column contains the reserved out-of-vocabulary value 0".to_string(),
                ));
            }
            sum_weights += weight as f64;

            let mut predicted_class = 0u32;
            let mut predicted_class_exp_value = 0.0f32;
            let mut sum_exp = 0.0f32;
            for grad_idx in 0..dim {
                let exp_value = predictions[example_idx * dim + grad_idx].exp();
                sum_exp += exp_value;
                if exp_value > predicted_class_exp_value {
                    predicted_class_exp_value = exp_value;
                    predicted_class = (grad_idx + 1) as u32;
                }
            }
            if label == predicted_class {
                count_correct += weight as f64;
            }

            // -log(predicted probability of the true label)
            let label_exp_value = predictions[example_idx * dim + (label - 1) as usize].exp();
            sum_loss -= weight as f64 * ((label_exp_value / sum_exp) as f64).ln();
        }

        if sum_weights > 0.0 {
            Ok(LossResults {
                loss: (sum_loss / sum_weights) as f32,
                secondary_metrics: vec![(count_correct / sum_weights) as f32],
            })
        } else {
            Ok(LossResults {
                loss: f32::NAN,
                secondary_metrics: vec![f32::NAN],
            })
        }
    }

    fn secondary_metric_names(&self) -> Vec<&'static str> {
        vec!["accuracy"]
    }
}

// =============================================================================
// Tests
// =============================================================================
