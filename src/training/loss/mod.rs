//! Loss functions for gradient boosted trees.
//!
//! A loss owns the numeric policy of one training objective: the initial
//! prediction, the per-example gradient/hessian, the Newton leaf step handed
//! to the tree grower, the prediction update and the evaluation.
//!
//! # Available losses
//!
//! - [`BinomialLogLikelihoodLoss`]: binary classification on a categorical
//!   label with exactly two classes (plus the reserved OOV slot)
//! - [`MultinomialLogLikelihoodLoss`]: multi-class classification, one output
//!   dimension per non-OOV class
//! - [`MeanSquaredErrorLoss`]: regression and score-based ranking
//! - [`NdcgLoss`]: LambdaMART optimizing NDCG@5
//! - [`CrossEntropyNdcgLoss`]: cross-entropy surrogate of NDCG (XE-NDCG)
//!
//! # Prediction layout
//!
//! Predictions are a flat vector of length `n_examples * output_dim`, laid
//! out row-major: `predictions[example * dim + output]`. Univariate losses
//! (`dim == 1`) index it directly by example.
//!
//! # Leaf setters
//!
//! [`Loss::leaf_setter`] returns the closure the external tree grower invokes
//! once per finalized leaf. The closure captures `predictions` (and, for the
//! ranking losses, the gradient buffers) read-only; it writes the leaf's
//! [`Regressor`] and nothing else, so independent leaves may be set
//! concurrently.

mod classification;
mod ranking;
mod regression;

pub use classification::{BinomialLogLikelihoodLoss, MultinomialLogLikelihoodLoss};
pub use ranking::{CrossEntropyNdcgLoss, NdcgLoss};
pub use regression::MeanSquaredErrorLoss;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::data::{ColumnSpec, Dataset, RowIdx};
use crate::error::{GbtError, Result};
use crate::model::Task;
use crate::trees::{Regressor, Tree};

use super::config::GbtConfig;
use super::gradient::GradientData;
use super::ranking::RankingGroupsIndex;

/// Truncation of every NDCG computed by the loss layer.
pub(crate) const NDCG5_TRUNCATION: usize = 5;

/// Minimum Newton-step denominator; smaller hessian sums are clamped up to
/// this value to avoid division by near-zero.
pub(crate) const MIN_HESSIAN_FOR_NEWTON_STEP: f64 = 0.001;

// =============================================================================
// Loss kind
// =============================================================================

/// Identifier of a loss, stable on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LossKind {
    /// Binomial log-likelihood (binary classification).
    BinomialLogLikelihood,
    /// Squared error (regression, score-based ranking).
    SquaredError,
    /// Multinomial log-likelihood (multi-class classification).
    MultinomialLogLikelihood,
    /// LambdaMART with NDCG@5 utility.
    LambdaMartNdcg5,
    /// Cross-entropy NDCG.
    XeNdcgMart,
}

impl LossKind {
    /// The stable name used in persisted headers and descriptions.
    pub fn name(self) -> &'static str {
        match self {
            LossKind::BinomialLogLikelihood => "BINOMIAL_LOG_LIKELIHOOD",
            LossKind::SquaredError => "SQUARED_ERROR",
            LossKind::MultinomialLogLikelihood => "MULTINOMIAL_LOG_LIKELIHOOD",
            LossKind::LambdaMartNdcg5 => "LAMBDA_MART_NDCG5",
            LossKind::XeNdcgMart => "XE_NDCG_MART",
        }
    }
}

// =============================================================================
// Loss trait
// =============================================================================

/// Closure invoked by the tree grower once per finalized leaf.
///
/// Arguments: the training dataset, the rows routed to the leaf, the example
/// weights (empty = uniform), and the leaf's regressor to fill in.
pub type SetLeafFn<'a> =
    Box<dyn Fn(&Dataset, &[RowIdx], &[f32], &mut Regressor) -> Result<()> + Send + Sync + 'a>;

/// Loss value and secondary metrics of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct LossResults {
    /// The loss value (lower is better for every loss in this crate).
    pub loss: f32,
    /// Secondary metric values, aligned with
    /// [`Loss::secondary_metric_names`].
    pub secondary_metrics: Vec<f32>,
}

/// A training objective.
///
/// Implementations are value types parameterized by an immutable
/// [`GbtConfig`]; all methods take `&self` and the running state (predictions,
/// gradients) is owned by the caller.
pub trait Loss: std::fmt::Debug + Send + Sync {
    /// Which loss this is.
    fn kind(&self) -> LossKind;

    /// Check the compatibility of the loss with its task and label column.
    fn validate(&self) -> Result<()>;

    /// Number of output dimensions, i.e. trees grown per iteration.
    fn output_dim(&self) -> usize {
        1
    }

    /// Whether gradient buffers must carry a hessian vector.
    fn needs_hessian(&self) -> bool {
        true
    }

    /// The constant predictions the ensemble starts from, one per output
    /// dimension.
    fn initial_predictions(
        &self,
        dataset: &Dataset,
        label_col_idx: usize,
        weights: &[f32],
    ) -> Result<Vec<f32>>;

    /// Recompute `gradients` (and hessians, when present) from the current
    /// predictions.
    fn update_gradients(
        &self,
        dataset: &Dataset,
        label_col_idx: usize,
        predictions: &[f32],
        ranking_index: Option<&RankingGroupsIndex>,
        gradients: &mut [GradientData],
        rng: &mut dyn RngCore,
    ) -> Result<()>;

    /// The leaf-value closure for the tree of output dimension `dim` of the
    /// current iteration.
    fn leaf_setter<'a>(
        &'a self,
        predictions: &'a [f32],
        gradients: &'a [GradientData],
        label_col_idx: usize,
        dim: usize,
    ) -> SetLeafFn<'a>;

    /// Add the freshly grown trees' leaf values to `predictions` in place.
    ///
    /// Univariate losses expect exactly one tree; the multinomial loss
    /// expects `output_dim()` trees. Returns the mean absolute contribution.
    fn update_predictions(
        &self,
        new_trees: &[&Tree],
        dataset: &Dataset,
        predictions: &mut [f32],
    ) -> Result<f64>;

    /// Evaluate the loss and its secondary metrics.
    fn loss_and_metrics(
        &self,
        dataset: &Dataset,
        label_col_idx: usize,
        predictions: &[f32],
        weights: &[f32],
        ranking_index: Option<&RankingGroupsIndex>,
    ) -> Result<LossResults>;

    /// Names of the secondary metrics, aligned with
    /// [`LossResults::secondary_metrics`].
    fn secondary_metric_names(&self) -> Vec<&'static str>;
}

// =============================================================================
// Factory
// =============================================================================

/// Build and validate the loss for `kind`.
pub fn create_loss(
    kind: LossKind,
    task: Task,
    label_column: &ColumnSpec,
    config: &GbtConfig,
) -> Result<Box<dyn Loss>> {
    let loss: Box<dyn Loss> = match kind {
        LossKind::BinomialLogLikelihood => {
            Box::new(BinomialLogLikelihoodLoss::new(config, task, label_column))
        }
        LossKind::SquaredError => Box::new(MeanSquaredErrorLoss::new(config, task)),
        LossKind::MultinomialLogLikelihood => {
            Box::new(MultinomialLogLikelihoodLoss::new(config, task, label_column))
        }
        LossKind::LambdaMartNdcg5 => Box::new(NdcgLoss::new(config, task)),
        LossKind::XeNdcgMart => Box::new(CrossEntropyNdcgLoss::new(config, task)),
    };
    loss.validate()?;
    Ok(loss)
}

// =============================================================================
// Shared prediction updates
// =============================================================================

/// Add one univariate tree's leaf values to `predictions[row]`.
pub(crate) fn update_with_single_univariate_tree(
    tree: &Tree,
    dataset: &Dataset,
    predictions: &mut [f32],
) -> f64 {
    let mut sum_abs = 0.0f64;
    for row in 0..dataset.nrow() {
        let value = tree.leaf(dataset, row).top_value;
        predictions[row] += value;
        sum_abs += value.abs() as f64;
    }
    sum_abs / dataset.nrow() as f64
}

/// Add `trees[d]`'s leaf values to `predictions[row * dim + d]`.
pub(crate) fn update_with_multiple_univariate_trees(
    trees: &[&Tree],
    dataset: &Dataset,
    predictions: &mut [f32],
) -> f64 {
    let dim = trees.len();
    let mut sum_abs = 0.0f64;
    for row in 0..dataset.nrow() {
        for (d, tree) in trees.iter().enumerate() {
            let value = tree.leaf(dataset, row).top_value;
            predictions[row * dim + d] += value;
            sum_abs += value.abs() as f64;
        }
    }
    sum_abs / dataset.nrow() as f64
}

/// Shape check shared by the univariate losses.
pub(crate) fn expect_single_tree<'a>(new_trees: &[&'a Tree]) -> Result<&'a Tree> {
    if new_trees.len() != 1 {
        return Err(GbtError::Internal(
            "wrong number of trees for a univariate prediction update".to_string(),
        ));
    }
    Ok(new_trees[0])
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnType, DatasetBuilder};
    use crate::trees::Regressor;

    fn label_spec(num_unique_values: u32) -> ColumnSpec {
        ColumnSpec {
            name: "label".to_string(),
            column_type: ColumnType::Categorical,
            num_unique_values,
        }
    }

    #[test]
    fn loss_kind_names_are_stable() {
        assert_eq!(
            LossKind::BinomialLogLikelihood.name(),
            "BINOMIAL_LOG_LIKELIHOOD"
        );
        assert_eq!(LossKind::SquaredError.name(), "SQUARED_ERROR");
        assert_eq!(
            LossKind::MultinomialLogLikelihood.name(),
            "MULTINOMIAL_LOG_LIKELIHOOD"
        );
        assert_eq!(LossKind::LambdaMartNdcg5.name(), "LAMBDA_MART_NDCG5");
        assert_eq!(LossKind::XeNdcgMart.name(), "XE_NDCG_MART");
    }

    #[test]
    fn loss_kind_serde_uses_stable_names() {
        let json = serde_json::to_string(&LossKind::LambdaMartNdcg5).unwrap();
        assert_eq!(json, "\"LAMBDA_MART_NDCG5\"");
        let kind: LossKind = serde_json::from_str("\"XE_NDCG_MART\"").unwrap();
        assert_eq!(kind, LossKind::XeNdcgMart);
    }

    #[test]
    fn factory_validates_task_compatibility() {
        let config = GbtConfig::default();

        // Binomial on a regression task is rejected.
        let err = create_loss(
            LossKind::BinomialLogLikelihood,
            Task::Regression,
            &label_spec(3),
            &config,
        )
        .unwrap_err();
        assert!(err.to_string().contains("classification"));

        // Squared error accepts both regression and ranking.
        assert!(create_loss(
            LossKind::SquaredError,
            Task::Regression,
            &label_spec(0),
            &config
        )
        .is_ok());
        assert!(
            create_loss(LossKind::SquaredError, Task::Ranking, &label_spec(0), &config).is_ok()
        );

        // Ranking losses require a ranking task.
        let err = create_loss(
            LossKind::LambdaMartNdcg5,
            Task::Classification,
            &label_spec(3),
            &config,
        )
        .unwrap_err();
        assert!(err.to_string().contains("ranking"));
    }

    #[test]
    fn zero_leaf_trees_leave_predictions_unchanged() {
        let dataset = DatasetBuilder::default()
            .numerical("f", vec![1.0, 2.0, 3.0])
            .build()
            .unwrap();
        let tree = Tree::single_leaf(Regressor::default());

        let mut predictions = vec![0.5, -0.25, 4.0];
        let before = predictions.clone();
        let mean_abs = update_with_single_univariate_tree(&tree, &dataset, &mut predictions);

        assert_eq!(predictions, before);
        assert_eq!(mean_abs, 0.0);
    }

    #[test]
    fn multivariate_update_is_row_major() {
        let dataset = DatasetBuilder::default()
            .numerical("f", vec![0.0, 0.0])
            .build()
            .unwrap();
        let t0 = Tree::single_leaf(Regressor {
            top_value: 1.0,
            hessian_stats: None,
        });
        let t1 = Tree::single_leaf(Regressor {
            top_value: 2.0,
            hessian_stats: None,
        });

        let mut predictions = vec![0.0; 4];
        update_with_multiple_univariate_trees(&[&t0, &t1], &dataset, &mut predictions);

        // predictions[row * dim + d]
        assert_eq!(predictions, vec![1.0, 2.0, 1.0, 2.0]);
    }
}
