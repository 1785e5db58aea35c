//! NDCG (Normalized Discounted Cumulative Gain) at a fixed truncation.

/// Calculator with precomputed `1 / log2(rank + 2)` discount terms.
///
/// `DCG@T = sum over the first T ranked items of (2^rel - 1) / log2(rank + 2)`
/// and `NDCG@T = DCG@T / IDCG@T`, where the DCG ordering is by decreasing
/// prediction and the ideal ordering by decreasing relevance.
#[derive(Debug, Clone)]
pub struct NdcgCalculator {
    inv_log_rank: Vec<f32>,
    truncation: usize,
}

impl NdcgCalculator {
    /// Create a calculator for `NDCG@truncation`.
    pub fn new(truncation: usize) -> Self {
        let inv_log_rank = (0..truncation)
            .map(|rank| 1.0 / ((rank + 2) as f32).log2())
            .collect();
        Self {
            inv_log_rank,
            truncation,
        }
    }

    /// Truncation `T`.
    #[inline]
    pub fn truncation(&self) -> usize {
        self.truncation
    }

    /// DCG contribution of an item with `relevance` placed at `rank`
    /// (0-based, must be below the truncation).
    #[inline]
    pub fn term(&self, relevance: f32, rank: usize) -> f32 {
        (2.0f32.powf(relevance) - 1.0) * self.inv_log_rank[rank]
    }

    /// NDCG of one group given `(prediction, relevance)` pairs.
    ///
    /// A group whose ideal DCG is zero (every relevance is zero) scores 1.0:
    /// there is nothing to gain and any ordering is ideal.
    pub fn ndcg(&self, pred_and_relevance: &[(f32, f32)]) -> f64 {
        if pred_and_relevance.is_empty() {
            return 1.0;
        }

        let depth = self.truncation.min(pred_and_relevance.len());

        // DCG: order by decreasing prediction. The sort is stable, so ties
        // keep their incoming order (callers that need randomized
        // tie-breaking shuffle upstream).
        let mut by_prediction: Vec<(f32, f32)> = pred_and_relevance.to_vec();
        by_prediction.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let dcg: f64 = by_prediction[..depth]
            .iter()
            .enumerate()
            .map(|(rank, &(_, relevance))| self.term(relevance, rank) as f64)
            .sum();

        // IDCG: order by decreasing relevance.
        let mut relevances: Vec<f32> = pred_and_relevance.iter().map(|&(_, r)| r).collect();
        relevances.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let idcg: f64 = relevances[..depth]
            .iter()
            .enumerate()
            .map(|(rank, &relevance)| self.term(relevance, rank) as f64)
            .sum();

        if idcg > 0.0 {
            dcg / idcg
        } else {
            1.0
        }
    }
}
