//! Conversions between runtime types and their persisted schema.

use crate::error::{GbtError, Result};
use crate::model::ModelMeta;
use crate::trees::{HessianStats, Regressor, SplitType, Tree};

use super::schema::{
    HessianStatsSchema, ModelMetaSchema, RegressorSchema, SplitTypeSchema, TreeSchema,
};

fn col_idx_to_schema(idx: Option<usize>) -> i64 {
    idx.map_or(-1, |idx| idx as i64)
}

fn col_idx_from_schema(idx: i64, what: &str) -> Result<Option<usize>> {
    match idx {
        -1 => Ok(None),
        idx if idx >= 0 => Ok(Some(idx as usize)),
        idx => Err(GbtError::InvalidData(format!(
            "invalid {} column index {} in the persisted metadata",
            what, idx
        ))),
    }
}

pub(super) fn meta_to_schema(meta: &ModelMeta) -> ModelMetaSchema {
    ModelMetaSchema {
        name: meta.name.clone(),
        task: meta.task,
        label_col_idx: meta.label_col_idx as u32,
        ranking_group_col_idx: col_idx_to_schema(meta.ranking_group_col_idx),
        weight_col_idx: col_idx_to_schema(meta.weight_col_idx),
        input_features: meta.input_features.iter().map(|&idx| idx as u32).collect(),
        data_spec: meta.data_spec.clone(),
    }
}

pub(super) fn meta_from_schema(schema: ModelMetaSchema) -> Result<ModelMeta> {
    Ok(ModelMeta {
        name: schema.name,
        task: schema.task,
        label_col_idx: schema.label_col_idx as usize,
        ranking_group_col_idx: col_idx_from_schema(schema.ranking_group_col_idx, "ranking group")?,
        weight_col_idx: col_idx_from_schema(schema.weight_col_idx, "weight")?,
        input_features: schema
            .input_features
            .into_iter()
            .map(|idx| idx as usize)
            .collect(),
        data_spec: schema.data_spec,
    })
}

pub(super) fn tree_to_schema(tree: &Tree) -> TreeSchema {
    TreeSchema {
        num_nodes: tree.n_nodes() as u32,
        split_indices: tree.split_indices().to_vec(),
        split_thresholds: tree.split_thresholds().to_vec(),
        left_children: tree.left_children().to_vec(),
        right_children: tree.right_children().to_vec(),
        default_left: tree.default_left().to_vec(),
        split_types: tree
            .split_types()
            .iter()
            .map(|split_type| match split_type {
                SplitType::Numerical => SplitTypeSchema::Numerical,
                SplitType::Categorical => SplitTypeSchema::Categorical,
            })
            .collect(),
        categories: tree.categories().to_vec(),
        is_leaf: tree.is_leaf_flags().to_vec(),
        regressors: tree
            .is_leaf_flags()
            .iter()
            .zip(tree.regressors())
            .map(|(&is_leaf, regressor)| {
                is_leaf.then(|| RegressorSchema {
                    top_value: regressor.top_value,
                    hessian_stats: regressor.hessian_stats.map(|stats| HessianStatsSchema {
                        sum_gradients: stats.sum_gradients,
                        sum_hessians: stats.sum_hessians,
                        sum_weights: stats.sum_weights,
                    }),
                })
            })
            .collect(),
    }
}

pub(super) fn tree_from_schema(schema: TreeSchema) -> Result<Tree> {
    let n = schema.num_nodes as usize;
    let consistent = schema.split_indices.len() == n
        && schema.split_thresholds.len() == n
        && schema.left_children.len() == n
        && schema.right_children.len() == n
        && schema.default_left.len() == n
        && schema.split_types.len() == n
        && schema.categories.len() == n
        && schema.is_leaf.len() == n
        && schema.regressors.len() == n;
    if n == 0 || !consistent {
        return Err(GbtError::InvalidData(
            "malformed tree arrays in the persisted model".to_string(),
        ));
    }
    for (node, &child) in schema
        .left_children
        .iter()
        .chain(schema.right_children.iter())
        .enumerate()
    {
        let node = node % n;
        if !schema.is_leaf[node] && child as usize >= n {
            return Err(GbtError::InvalidData(
                "out-of-bounds child in the persisted model".to_string(),
            ));
        }
    }

    let mut regressors = Vec::with_capacity(n);
    for (node, regressor) in schema.regressors.into_iter().enumerate() {
        match (schema.is_leaf[node], regressor) {
            (true, Some(regressor)) => regressors.push(Regressor {
                top_value: regressor.top_value,
                hessian_stats: regressor.hessian_stats.map(|stats| HessianStats {
                    sum_gradients: stats.sum_gradients,
                    sum_hessians: stats.sum_hessians,
                    sum_weights: stats.sum_weights,
                }),
            }),
            (true, None) => {
                return Err(GbtError::InvalidData(
                    "leaf regressor missing in the persisted model".to_string(),
                ))
            }
            (false, _) => regressors.push(Regressor::default()),
        }
    }

    Ok(Tree::from_arrays(
        schema.split_indices,
        schema.split_thresholds,
        schema.left_children,
        schema.right_children,
        schema.default_left,
        schema
            .split_types
            .into_iter()
            .map(|split_type| match split_type {
                SplitTypeSchema::Numerical => SplitType::Numerical,
                SplitTypeSchema::Categorical => SplitType::Categorical,
            })
            .collect(),
        schema.categories,
        schema.is_leaf,
        regressors,
    ))
}

// =============================================================================
// Tests
// =============================================================================
