//! Ranking group index.
//!
//! Groups, orders and scores examples for the ranking losses and for NDCG
//! evaluation. Built once per training run from a numerical relevance column
//! and a categorical or hash group column; immutable afterwards.

use std::collections::HashMap;

use crate::data::{Dataset, RowIdx};
use crate::error::{GbtError, Result};
use crate::metrics::NdcgCalculator;
use crate::utils::example_weight;

/// Maximum number of items in a ranking group. Exceeding it is almost
/// certainly a mistake in the configuration of the group column.
pub const MAX_ITEMS_IN_RANKING_GROUP: usize = 2000;

/// One example of a ranking group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Item {
    /// Ground-truth relevance, from the label column.
    pub relevance: f32,
    /// Row of the example in the dataset.
    pub example_idx: RowIdx,
}

/// All the examples sharing one group identifier.
///
/// Items are ordered by decreasing relevance, ties broken by decreasing
/// `example_idx`.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Group identifier (categorical index or hash value).
    pub group_id: u64,
    /// Items, relevance-sorted.
    pub items: Vec<Item>,
}

/// Index of all ranking groups of a dataset.
#[derive(Debug, Clone)]
pub struct RankingGroupsIndex {
    groups: Vec<Group>,
    num_items: u64,
}

impl RankingGroupsIndex {
    /// Build the index from a relevance column and a group column.
    ///
    /// The group column must be categorical or hash. Groups larger than
    /// [`MAX_ITEMS_IN_RANKING_GROUP`] are rejected.
    pub fn build(dataset: &Dataset, label_col_idx: usize, group_col_idx: usize) -> Result<Self> {
        let relevances = dataset.numerical(label_col_idx);

        let group_categorical = dataset.as_categorical(group_col_idx);
        let group_hash = dataset.as_hash(group_col_idx);
        if group_categorical.is_none() && group_hash.is_none() {
            return Err(GbtError::InvalidConfiguration(format!(
                "ranking group column {} (\"{}\") must be categorical or hash",
                group_col_idx,
                dataset.spec().column(group_col_idx).name
            )));
        }

        let mut tmp_groups: HashMap<u64, Vec<Item>> = HashMap::new();
        for example_idx in 0..dataset.nrow() {
            let group_id = match (group_categorical, group_hash) {
                (Some(values), _) => values[example_idx] as u64,
                (None, Some(values)) => values[example_idx],
                (None, None) => unreachable!(),
            };
            tmp_groups.entry(group_id).or_default().push(Item {
                relevance: relevances[example_idx],
                example_idx: example_idx as RowIdx,
            });
        }

        let mut groups = Vec::with_capacity(tmp_groups.len());
        for (group_id, mut items) in tmp_groups {
            items.sort_by(|a, b| {
                b.relevance
                    .partial_cmp(&a.relevance)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.example_idx.cmp(&a.example_idx))
            });

            if items.len() > MAX_ITEMS_IN_RANKING_GROUP {
                return Err(GbtError::InvalidData(format!(
                    "ranking group {} has {} items, more than the maximum of {}; \
                     this is likely a mistake in the configuration of the group column",
                    group_id,
                    items.len(),
                    MAX_ITEMS_IN_RANKING_GROUP
                )));
            }

            groups.push(Group { group_id, items });
        }

        // Order groups by their first example to improve prediction-access
        // locality, ties broken by group id.
        groups.sort_by(|a, b| {
            a.items[0]
                .example_idx
                .cmp(&b.items[0].example_idx)
                .then(a.group_id.cmp(&b.group_id))
        });

        Ok(Self {
            groups,
            num_items: dataset.nrow() as u64,
        })
    }

    /// The groups, in index order.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Total number of indexed items; equals the dataset's row count.
    pub fn num_items(&self) -> u64 {
        self.num_items
    }

    /// Group-weighted `NDCG@truncation` of `predictions`.
    ///
    /// Each group is weighted by the weight of its first item. Returns `NaN`
    /// when the total weight is not positive.
    pub fn ndcg(&self, predictions: &[f32], weights: &[f32], truncation: usize) -> f64 {
        debug_assert_eq!(predictions.len(), self.num_items as usize);

        let calculator = NdcgCalculator::new(truncation);
        let mut pred_and_relevance = Vec::new();

        let mut sum_weighted_ndcg = 0.0f64;
        let mut sum_weights = 0.0f64;
        for group in &self.groups {
            let weight = example_weight(weights, group.items[0].example_idx as usize);

            pred_and_relevance.clear();
            pred_and_relevance.extend(group.items.iter().map(|item| {
                (predictions[item.example_idx as usize], item.relevance)
            }));

            sum_weighted_ndcg += weight as f64 * calculator.ndcg(&pred_and_relevance);
            sum_weights += weight as f64;
        }
        sum_weighted_ndcg / sum_weights
    }
}

// =============================================================================
// Tests
// =============================================================================
