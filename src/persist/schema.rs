//! Serialization schema for persisted models.
//!
//! Schema types are separate from runtime types so the on-disk format can
//! evolve independently and be validated during deserialization. The JSON
//! representation has no NaN, so the (NaN-allowed) validation loss is stored
//! as an `Option`: `null`/absent means "no validation loss".

use serde::{Deserialize, Serialize};

use crate::data::DataSpec;
use crate::model::Task;
use crate::training::LossKind;

/// Header of the gradient boosted trees artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderSchema {
    /// Loss the ensemble was trained with (stable vocabulary).
    pub loss: LossKind,
    /// Trees per boosting iteration.
    pub num_trees_per_iter: u32,
    /// Number of node shard files.
    pub num_node_shards: u32,
    /// Total number of trees across all shards.
    pub num_trees: u32,
    /// Format of the node shards.
    pub node_format: String,
    /// Final validation loss; `None` when no validation split was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_loss: Option<f32>,
    /// Initial predictions, one per tree of an iteration.
    pub initial_predictions: Vec<f32>,
    /// Opaque training logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_logs: Option<String>,
}

/// Abstract model metadata (task, column bindings, data specification).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetaSchema {
    /// Model name.
    pub name: String,
    /// Learning task.
    pub task: Task,
    /// Label column index.
    pub label_col_idx: u32,
    /// Ranking group column index; -1 when absent.
    pub ranking_group_col_idx: i64,
    /// Example-weight column index; -1 when absent.
    pub weight_col_idx: i64,
    /// Input feature column indices.
    pub input_features: Vec<u32>,
    /// Column specification of the training data.
    pub data_spec: DataSpec,
}

/// Split kind of a persisted node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SplitTypeSchema {
    Numerical,
    Categorical,
}

/// Newton statistics of a persisted leaf.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HessianStatsSchema {
    pub sum_gradients: f64,
    pub sum_hessians: f64,
    pub sum_weights: f64,
}

/// Payload of a persisted leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressorSchema {
    pub top_value: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hessian_stats: Option<HessianStatsSchema>,
}

/// One persisted tree, parallel-array layout (node 0 is the root).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSchema {
    pub num_nodes: u32,
    pub split_indices: Vec<u32>,
    pub split_thresholds: Vec<f32>,
    pub left_children: Vec<u32>,
    pub right_children: Vec<u32>,
    pub default_left: Vec<bool>,
    pub split_types: Vec<SplitTypeSchema>,
    pub categories: Vec<Vec<u32>>,
    pub is_leaf: Vec<bool>,
    /// One entry per node; `None` on non-leaf nodes.
    pub regressors: Vec<Option<RegressorSchema>>,
}

/// One shard of persisted trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeShardSchema {
    pub trees: Vec<TreeSchema>,
}
