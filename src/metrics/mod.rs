//! Evaluation helpers used by the losses.
//!
//! Only the metrics the loss layer itself reports live here: weighted RMSE
//! for squared-error training and the NDCG calculator the ranking losses are
//! built on. A general-purpose metric library is out of scope.

mod ranking;

pub use ranking::NdcgCalculator;

use crate::utils::weight_iter;

/// Weighted root mean squared error: `sqrt(sum(w * (l - p)^2) / sum(w))`.
///
/// An empty weight slice means uniform weights. Returns `NaN` when the total
/// weight is not positive, so callers can tell "no data" from "bad fit".
pub fn rmse(labels: &[f32], predictions: &[f32], weights: &[f32]) -> f32 {
    debug_assert_eq!(labels.len(), predictions.len());

    let mut sum_sq = 0.0f64;
    let mut sum_weights = 0.0f64;
    for (i, weight) in weight_iter(weights, labels.len()).enumerate() {
        let diff = (labels[i] - predictions[i]) as f64;
        sum_sq += weight as f64 * diff * diff;
        sum_weights += weight as f64;
    }
    if sum_weights > 0.0 {
        (sum_sq / sum_weights).sqrt() as f32
    } else {
        f32::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rmse_unweighted() {
        // Residuals [1, 0, -1] -> sqrt(2/3).
        let value = rmse(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0], &[]);
        assert_relative_eq!(value, (2.0f32 / 3.0).sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn rmse_weighted() {
        // Residuals [1, -1] with weights [3, 1]: sqrt((3 + 1) / 4) = 1.
        let value = rmse(&[1.0, 1.0], &[0.0, 2.0], &[3.0, 1.0]);
        assert_relative_eq!(value, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn rmse_zero_weight_is_nan() {
        assert!(rmse(&[1.0], &[0.0], &[0.0]).is_nan());
        assert!(rmse(&[], &[], &[]).is_nan());
    }
}
