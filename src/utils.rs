//! Common utilities used across the crate.
//!
//! This module provides weight iteration, the L1 soft-threshold used by
//! Newton leaf steps, and the parallelism switch used by the trainer.

use rayon::prelude::*;

// =============================================================================
// Weight iteration
// =============================================================================

/// Iterate example weights, treating an empty slice as uniform weights.
///
/// This is the crate-wide weight convention: `&[]` means "all ones" without
/// allocating.
#[inline]
pub(crate) fn weight_iter(weights: &[f32], n_rows: usize) -> impl Iterator<Item = f32> + '_ {
    debug_assert!(
        weights.is_empty() || weights.len() >= n_rows,
        "weights.len() ({}) < n_rows ({})",
        weights.len(),
        n_rows
    );
    (0..n_rows).map(move |i| if weights.is_empty() { 1.0 } else { weights[i] })
}

/// Weight of a single example under the same convention.
#[inline]
pub(crate) fn example_weight(weights: &[f32], example_idx: usize) -> f32 {
    if weights.is_empty() {
        1.0
    } else {
        weights[example_idx]
    }
}

// =============================================================================
// Soft threshold (L1 regularization)
// =============================================================================

/// Soft-threshold operator: `sign(x) * max(|x| - tau, 0)`.
///
/// Applied to the numerator of Newton leaf steps when L1 regularization is
/// enabled. With `tau == 0` this is the identity.
#[inline]
pub(crate) fn soft_threshold(value: f64, tau: f32) -> f64 {
    let tau = tau as f64;
    if value > tau {
        value - tau
    } else if value < -tau {
        value + tau
    } else {
        0.0
    }
}

// =============================================================================
// Parallelism
// =============================================================================

/// Whether parallel execution is allowed.
///
/// The trainer may fan out the growth of the per-iteration trees (one per
/// gradient dimension) across a rayon pool; each leaf setter touches disjoint
/// node state so no synchronization is needed. Components below the trainer
/// are strictly sequential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if the rayon pool has multiple threads)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Map items to results, in parallel when allowed.
    ///
    /// Output order matches input order in both modes.
    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_iter_empty_is_uniform() {
        let weights: Vec<f32> = vec![];
        let collected: Vec<f32> = weight_iter(&weights, 3).collect();
        assert_eq!(collected, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn weight_iter_passes_values_through() {
        let weights = vec![0.5, 2.0, 1.5];
        let collected: Vec<f32> = weight_iter(&weights, 3).collect();
        assert_eq!(collected, vec![0.5, 2.0, 1.5]);
    }

    #[test]
    fn soft_threshold_cuts_toward_zero() {
        assert_eq!(soft_threshold(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold(-3.0, 1.0), -2.0);
        assert_eq!(soft_threshold(0.5, 1.0), 0.0);
        assert_eq!(soft_threshold(-0.5, 1.0), 0.0);
    }

    #[test]
    fn soft_threshold_identity_without_regularization() {
        assert_eq!(soft_threshold(3.25, 0.0), 3.25);
        assert_eq!(soft_threshold(-3.25, 0.0), -3.25);
    }

    #[test]
    fn parallelism_from_threads() {
        assert!(!Parallelism::from_threads(1).is_parallel());
        assert!(Parallelism::from_threads(2).is_parallel());
        assert!(Parallelism::from_threads(8).is_parallel());
    }

    #[test]
    fn maybe_par_map_preserves_order() {
        let seq: Vec<_> = Parallelism::Sequential.maybe_par_map(0..5usize, |i| i * 2);
        assert_eq!(seq, vec![0, 2, 4, 6, 8]);

        let par: Vec<_> = Parallelism::Parallel.maybe_par_map(0..5usize, |i| i * 2);
        assert_eq!(par, vec![0, 2, 4, 6, 8]);
    }
}
