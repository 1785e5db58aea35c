//! Ranking losses: LambdaMART-NDCG and cross-entropy NDCG.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use crate::data::Dataset;
use crate::error::{GbtError, Result};
use crate::metrics::NdcgCalculator;
use crate::model::Task;
use crate::trees::{HessianStats, Regressor, Tree};
use crate::utils::{example_weight, soft_threshold};

use super::super::config::{GbtConfig, XeNdcgGamma};
use super::super::gradient::GradientData;
use super::super::ranking::RankingGroupsIndex;
use super::{
    expect_single_tree, update_with_single_univariate_tree, Loss, LossKind, LossResults,
    SetLeafFn, MIN_HESSIAN_FOR_NEWTON_STEP, NDCG5_TRUNCATION,
};

// =============================================================================
// Shared leaf routine
// =============================================================================

/// Newton leaf step over accumulated ranking gradients, shared by both
/// ranking losses.
fn set_ranking_leaf(
    config: &GbtConfig,
    gradient_data: &GradientData,
    selected_examples: &[u64],
    weights: &[f32],
    regressor: &mut Regressor,
) -> Result<()> {
    let gradient = &gradient_data.gradient;
    let hessian = gradient_data
        .hessian()
        .ok_or_else(|| GbtError::Internal("missing hessian buffer".to_string()))?;

    let mut sum_weighted_gradient = 0.0f64;
    let mut sum_weighted_hessian = 0.0f64;
    let mut sum_weights = 0.0f64;
    for &example_idx in selected_examples {
        let example_idx = example_idx as usize;
        let weight = example_weight(weights, example_idx) as f64;
        sum_weighted_gradient += weight * gradient[example_idx] as f64;
        sum_weighted_hessian += weight * hessian[example_idx] as f64;
        sum_weights += weight;
    }

    if sum_weighted_hessian <= MIN_HESSIAN_FOR_NEWTON_STEP {
        sum_weighted_hessian = MIN_HESSIAN_FOR_NEWTON_STEP;
    }

    if config.use_hessian_gain {
        regressor.hessian_stats = Some(HessianStats {
            sum_gradients: sum_weighted_gradient,
            sum_hessians: sum_weighted_hessian,
            sum_weights,
        });
    }

    regressor.top_value = config.shrinkage
        * (soft_threshold(sum_weighted_gradient, config.l1_regularization)
            / (sum_weighted_hessian + config.l2_regularization as f64)) as f32;
    Ok(())
}

fn require_index<'a>(
    ranking_index: Option<&'a RankingGroupsIndex>,
) -> Result<&'a RankingGroupsIndex> {
    ranking_index.ok_or_else(|| GbtError::Internal("missing ranking index".to_string()))
}

// =============================================================================
// LambdaMART-NDCG
// =============================================================================

/// LambdaMART optimizing NDCG@5.
///
/// The gradient of an example is the sum of pairwise "lambdas" against every
/// other item of its group with a different relevance, each weighted by the
/// NDCG utility that swapping the pair would gain or lose.
///
/// Prediction ties are broken randomly: each group's items are shuffled with
/// the caller's RNG before the stable sort by decreasing prediction, so the
/// expected gradient matches the tie-aware metric. Training is reproducible
/// only given the same seed.
#[derive(Debug, Clone)]
pub struct NdcgLoss {
    config: GbtConfig,
    task: Task,
}

impl NdcgLoss {
    /// Create the loss; call [`Loss::validate`] before training with it.
    pub fn new(config: &GbtConfig, task: Task) -> Self {
        Self {
            config: config.clone(),
            task,
        }
    }
}

impl Loss for NdcgLoss {
    fn kind(&self) -> LossKind {
        LossKind::LambdaMartNdcg5
    }

    fn validate(&self) -> Result<()> {
        if self.task != Task::Ranking {
            return Err(GbtError::InvalidConfiguration(
                "NDCG loss is only compatible with a ranking task".to_string(),
            ));
        }
        Ok(())
    }

    fn initial_predictions(
        &self,
        _dataset: &Dataset,
        _label_col_idx: usize,
        _weights: &[f32],
    ) -> Result<Vec<f32>> {
        Ok(vec![0.0])
    }

    fn update_gradients(
        &self,
        _dataset: &Dataset,
        _label_col_idx: usize,
        predictions: &[f32],
        ranking_index: Option<&RankingGroupsIndex>,
        gradients: &mut [GradientData],
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let index = require_index(ranking_index)?;
        if gradients.len() != 1 {
            return Err(GbtError::Internal("wrong gradient shape".to_string()));
        }
        let calculator = NdcgCalculator::new(NDCG5_TRUNCATION);

        let lambda_loss = self.config.lambda_loss;
        let lambda_loss_squared = lambda_loss * lambda_loss;

        let (gradient, hessian) = gradients[0].as_mut_slices()?;
        gradient.fill(0.0);
        hessian.fill(0.0);

        // `pred_and_in_ground_idx[j].0` is the prediction of the example
        // `group.items[pred_and_in_ground_idx[j].1].example_idx`.
        let mut pred_and_in_ground_idx: Vec<(f32, usize)> = Vec::new();
        for group in index.groups() {
            let group_size = group.items.len();
            pred_and_in_ground_idx.clear();
            pred_and_in_ground_idx.extend((0..group_size).map(|item_idx| {
                (
                    predictions[group.items[item_idx].example_idx as usize],
                    item_idx,
                )
            }));

            // NDCG normalization term. The items are relevance-sorted, so the
            // first `truncation` of them realize the maximal DCG.
            let mut utility_norm_factor = 1.0f32;
            if !self.config.lambda_mart_ndcg.gradient_use_non_normalized_dcg {
                let max_rank = NDCG5_TRUNCATION.min(group_size);
                let mut max_dcg = 0.0f32;
                for rank in 0..max_rank {
                    max_dcg += calculator.term(group.items[rank].relevance, rank);
                }
                utility_norm_factor = 1.0 / max_dcg;
            }

            // Sort by decreasing prediction. Shuffling first makes the stable
            // sort break prediction ties randomly, which aligns the expected
            // gradient with the tie-aware metric value.
            pred_and_in_ground_idx.shuffle(rng);
            pred_and_in_ground_idx
                .sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

            // Accumulate the "force" each item applies on every other item.
            for item_1_idx in 0..group_size {
                let (pred_1, in_ground_idx_1) = pred_and_in_ground_idx[item_1_idx];
                let relevance_1 = group.items[in_ground_idx_1].relevance;
                let example_1_idx = group.items[in_ground_idx_1].example_idx as usize;

                for item_2_idx in (item_1_idx + 1)..group_size {
                    let (pred_2, in_ground_idx_2) = pred_and_in_ground_idx[item_2_idx];
                    let relevance_2 = group.items[in_ground_idx_2].relevance;
                    let example_2_idx = group.items[in_ground_idx_2].example_idx as usize;

                    // Swapping items with the same relevance moves no utility.
                    if relevance_1 == relevance_2 {
                        continue;
                    }

                    // DCG difference contributed at the two positions, only
                    // where the position is inside the truncation.
                    let mut delta_utility = 0.0f32;
                    if item_1_idx < NDCG5_TRUNCATION {
                        delta_utility += calculator.term(relevance_2, item_1_idx)
                            - calculator.term(relevance_1, item_1_idx);
                    }
                    if item_2_idx < NDCG5_TRUNCATION {
                        delta_utility += calculator.term(relevance_1, item_2_idx)
                            - calculator.term(relevance_2, item_2_idx);
                    }
                    let delta_utility = delta_utility.abs() * utility_norm_factor;

                    // The sign flips when the pair is ordered against the
                    // ground truth; it also swaps the operands of the sigmoid.
                    let signed_lambda_loss = lambda_loss
                        - 2.0 * lambda_loss * ((in_ground_idx_1 >= in_ground_idx_2) as u32 as f32);

                    let sigmoid =
                        1.0 / (1.0 + (signed_lambda_loss * (pred_1 - pred_2)).exp());

                    let unit_grad = signed_lambda_loss * sigmoid * delta_utility;
                    let unit_second_order =
                        delta_utility * sigmoid * (1.0 - sigmoid) * lambda_loss_squared;

                    gradient[example_1_idx] += unit_grad;
                    hessian[example_1_idx] += unit_second_order;
                    gradient[example_2_idx] -= unit_grad;
                    hessian[example_2_idx] += unit_second_order;
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
        _dim: usize,
    ) -> SetLeafFn<'a> {
        Box::new(move |_dataset, selected_examples, weights, regressor| {
            set_ranking_leaf(
                &self.config,
                &gradients[0],
                selected_examples,
                weights,
                regressor,
            )
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
        _dataset: &Dataset,
        _label_col_idx: usize,
        predictions: &[f32],
        weights: &[f32],
        ranking_index: Option<&RankingGroupsIndex>,
    ) -> Result<LossResults> {
        let index = require_index(ranking_index)?;
        let ndcg = index.ndcg(predictions, weights, NDCG5_TRUNCATION) as f32;
        Ok(LossResults {
            loss: -ndcg,
            secondary_metrics: vec![ndcg],
        })
    }

    fn secondary_metric_names(&self) -> Vec<&'static str> {
        vec!["NDCG@5"]
    }
}

// =============================================================================
// Cross-entropy NDCG
// =============================================================================

/// Cross-entropy surrogate of NDCG (XE-NDCG).
///
/// Per group, the predictions are softmax-normalized into a distribution and
/// matched against a gamma-perturbed transform of the relevances; the
/// gradient is assembled from a third-order approximation of the resulting
/// cross-entropy. Groups with a single item carry no ranking signal and are
/// skipped.
#[derive(Debug, Clone)]
pub struct CrossEntropyNdcgLoss {
    config: GbtConfig,
    task: Task,
}

impl CrossEntropyNdcgLoss {
    /// Create the loss; call [`Loss::validate`] before training with it.
    pub fn new(config: &GbtConfig, task: Task) -> Self {
        Self {
            config: config.clone(),
            task,
        }
    }
}

impl Loss for CrossEntropyNdcgLoss {
    fn kind(&self) -> LossKind {
        LossKind::XeNdcgMart
    }

    fn validate(&self) -> Result<()> {
        if self.task != Task::Ranking {
            return Err(GbtError::InvalidConfiguration(
                "cross-entropy NDCG loss is only compatible with a ranking task".to_string(),
            ));
        }
        Ok(())
    }

    fn initial_predictions(
        &self,
        _dataset: &Dataset,
        _label_col_idx: usize,
        _weights: &[f32],
    ) -> Result<Vec<f32>> {
        Ok(vec![0.0])
    }

    fn update_gradients(
        &self,
        _dataset: &Dataset,
        _label_col_idx: usize,
        predictions: &[f32],
        ranking_index: Option<&RankingGroupsIndex>,
        gradients: &mut [GradientData],
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let index = require_index(ranking_index)?;
        if gradients.len() != 1 {
            return Err(GbtError::Internal("wrong gradient shape".to_string()));
        }
        let (gradient, hessian) = gradients[0].as_mut_slices()?;
        gradient.fill(0.0);
        hessian.fill(0.0);

        // Per-group prediction buffer and the auxiliary parameter buffer used
        // to form the ground-truth distribution.
        let mut preds: Vec<f32> = Vec::new();
        let mut params: Vec<f32> = Vec::new();

        for group in index.groups() {
            let group_size = group.items.len();

            // A single item cannot be ranked against anything.
            if group_size <= 1 {
                continue;
            }

            preds.clear();
            preds.extend(
                group
                    .items
                    .iter()
                    .map(|item| predictions[item.example_idx as usize]),
            );

            params.clear();
            match self.config.xe_ndcg.gamma {
                XeNdcgGamma::One => params.extend(std::iter::repeat(1.0f32).take(group_size)),
                XeNdcgGamma::Auto | XeNdcgGamma::Uniform => {
                    params.extend((0..group_size).map(|_| rng.gen::<f32>()))
                }
            }

            // Turn the scores into a probability distribution with a
            // numerically stable softmax.
            let max_pred = preds.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let sum_exp: f32 = preds.iter().map(|&p| (p - max_pred).exp()).sum();
            let log_sum_exp = max_pred + (sum_exp + 1e-20).ln();
            for pred in preds.iter_mut() {
                let probability = (*pred - log_sum_exp).exp();
                *pred = probability.clamp(1e-5, 0.99999);
            }

            // Approximate Newton step. First-order terms: `params` holds the
            // gammas and becomes the numerator of the first-order terms.
            let mut inv_denominator = 0.0f32;
            for (idx, param) in params.iter_mut().enumerate() {
                *param = group.items[idx].relevance.exp2() - *param;
                inv_denominator += *param;
            }
            if inv_denominator == 0.0 {
                continue;
            }
            let inv_denominator = 1.0 / inv_denominator;

            let mut sum_l1 = 0.0f32;
            for idx in 0..group_size {
                let example_idx = group.items[idx].example_idx as usize;
                let term = -params[idx] * inv_denominator + preds[idx];
                gradient[example_idx] = -term;

                // `params` now stores the terms of the second-order pass.
                params[idx] = term / (1.0 - preds[idx]);
                sum_l1 += params[idx];
            }

            // Second-order terms.
            let mut sum_l2 = 0.0f32;
            for idx in 0..group_size {
                let example_idx = group.items[idx].example_idx as usize;
                let term = preds[idx] * (sum_l1 - params[idx]);
                gradient[example_idx] -= term;

                // `params` now stores the terms of the third-order pass.
                params[idx] = term / (1.0 - preds[idx]);
                sum_l2 += params[idx];
            }

            // Third-order terms and the hessian.
            for idx in 0..group_size {
                let example_idx = group.items[idx].example_idx as usize;
                gradient[example_idx] -= preds[idx] * (sum_l2 - params[idx]);
                hessian[example_idx] = preds[idx] * (1.0 - preds[idx]);
            }
        }
        Ok(())
    }

    fn leaf_setter<'a>(
        &'a self,
        _predictions: &'a [f32],
        gradients: &'a [GradientData],
        _label_col_idx: usize,
        _dim: usize,
    ) -> SetLeafFn<'a> {
        Box::new(move |_dataset, selected_examples, weights, regressor| {
            set_ranking_leaf(
                &self.config,
                &gradients[0],
                selected_examples,
                weights,
                regressor,
            )
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
        _dataset: &Dataset,
        _label_col_idx: usize,
        predictions: &[f32],
        weights: &[f32],
        ranking_index: Option<&RankingGroupsIndex>,
    ) -> Result<LossResults> {
        let index = require_index(ranking_index)?;
        let ndcg = index.ndcg(predictions, weights, NDCG5_TRUNCATION) as f32;
        Ok(LossResults {
            loss: -ndcg,
            secondary_metrics: Vec::new(),
        })
    }

    fn secondary_metric_names(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
