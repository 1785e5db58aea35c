//! Training configuration recognized by the loss layer.

/// Gamma parameter mode for the cross-entropy NDCG loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XeNdcgGamma {
    /// Fixed gamma of 1.
    One,
    /// Let the implementation choose; currently samples `Uniform(0, 1)`.
    #[default]
    Auto,
    /// Sample gamma from `Uniform(0, 1)`.
    Uniform,
}

/// Options of the LambdaMART-NDCG gradient.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LambdaMartNdcgConfig {
    /// Skip the `1 / max-DCG` normalization of the pairwise lambdas.
    pub gradient_use_non_normalized_dcg: bool,
}

/// Options of the cross-entropy NDCG loss.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct XeNdcgConfig {
    /// Initialization of the per-item gamma parameters.
    pub gamma: XeNdcgGamma,
}

/// Configuration consumed by the losses and their leaf setters.
///
/// Use struct construction with `..Default::default()`:
///
/// ```
/// use canopy::training::GbtConfig;
///
/// let config = GbtConfig {
///     shrinkage: 1.0,
///     l2_regularization: 0.5,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GbtConfig {
    /// Multiplicative factor applied to every leaf value (learning rate).
    pub shrinkage: f32,
    /// Soft-threshold cut on the leaf-value numerator.
    pub l1_regularization: f32,
    /// Ridge term added to the leaf-value denominator (Newton step).
    pub l2_regularization: f32,
    /// Symmetric clamp on binomial / multinomial leaf values.
    pub clamp_leaf_logit: f32,
    /// Enable hessian-based split scoring; leaf setters then record the
    /// `sum_gradients / sum_hessians / sum_weights` triple on every leaf.
    pub use_hessian_gain: bool,
    /// Lambda of the LambdaMART pairwise sigmoid.
    pub lambda_loss: f32,
    /// LambdaMART-NDCG options.
    pub lambda_mart_ndcg: LambdaMartNdcgConfig,
    /// Cross-entropy NDCG options.
    pub xe_ndcg: XeNdcgConfig,
}

impl Default for GbtConfig {
    fn default() -> Self {
        Self {
            shrinkage: 0.1,
            l1_regularization: 0.0,
            l2_regularization: 0.0,
            clamp_leaf_logit: 5.0,
            use_hessian_gain: false,
            lambda_loss: 1.0,
            lambda_mart_ndcg: LambdaMartNdcgConfig::default(),
            xe_ndcg: XeNdcgConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = GbtConfig::default();
        assert_eq!(config.shrinkage, 0.1);
        assert_eq!(config.l1_regularization, 0.0);
        assert_eq!(config.l2_regularization, 0.0);
        assert_eq!(config.clamp_leaf_logit, 5.0);
        assert!(!config.use_hessian_gain);
        assert_eq!(config.lambda_loss, 1.0);
        assert!(!config.lambda_mart_ndcg.gradient_use_non_normalized_dcg);
        assert_eq!(config.xe_ndcg.gamma, XeNdcgGamma::Auto);
    }
}
