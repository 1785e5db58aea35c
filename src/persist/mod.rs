//! Model directory persistence.
//!
//! A saved model is a directory holding:
//!
//! - `gradient_boosted_trees_header.json` - the ensemble header
//!   ([`HeaderSchema`]);
//! - `header.json` - the abstract model metadata ([`ModelMetaSchema`]);
//! - `nodes-XXXXX-of-YYYYY` - the tree shards, in the `json` node format;
//! - `done` - an empty sentinel written last; a directory without it is an
//!   incomplete save and is refused at load time.
//!
//! Loading a model re-validates every structural invariant, so a persisted
//! ensemble that would not have passed [`GradientBoostedTreesModel::validate`]
//! cannot be loaded.

pub mod schema;

mod convert;

use std::fs;
use std::path::Path;

use crate::error::{GbtError, Result};
use crate::model::GradientBoostedTreesModel;

use self::schema::{HeaderSchema, ModelMetaSchema, NodeShardSchema};

/// Basename of the shards containing the tree nodes.
const NODE_BASE_FILENAME: &str = "nodes";
/// Filename of the gradient boosted trees header.
const HEADER_FILENAME: &str = "gradient_boosted_trees_header.json";
/// Filename of the abstract model metadata.
const ABSTRACT_HEADER_FILENAME: &str = "header.json";
/// Sentinel marking a complete save.
const DONE_FILENAME: &str = "done";
/// The only node format this build reads and writes.
const NODE_FORMAT_JSON: &str = "json";
/// Trees per node shard.
const TREES_PER_SHARD: usize = 1000;

fn shard_filename(shard_idx: usize, num_shards: usize) -> String {
    format!("{}-{:05}-of-{:05}", NODE_BASE_FILENAME, shard_idx, num_shards)
}

/// Save `model` into `directory`, creating it if needed.
pub fn save_model(model: &GradientBoostedTreesModel, directory: &Path) -> Result<()> {
    fs::create_dir_all(directory)?;

    let node_format = model.node_format().unwrap_or(NODE_FORMAT_JSON);
    if node_format != NODE_FORMAT_JSON {
        return Err(GbtError::Unimplemented(format!(
            "unsupported node format \"{}\"",
            node_format
        )));
    }

    let num_trees = model.trees().len();
    let num_shards = num_trees.div_ceil(TREES_PER_SHARD).max(1);
    for shard_idx in 0..num_shards {
        let start = shard_idx * TREES_PER_SHARD;
        let end = (start + TREES_PER_SHARD).min(num_trees);
        let shard = NodeShardSchema {
            trees: model.trees()[start..end]
                .iter()
                .map(convert::tree_to_schema)
                .collect(),
        };
        let payload = serde_json::to_string(&shard)?;
        fs::write(directory.join(shard_filename(shard_idx, num_shards)), payload)?;
    }

    let header = HeaderSchema {
        loss: model.loss(),
        num_trees_per_iter: model.num_trees_per_iter() as u32,
        num_node_shards: num_shards as u32,
        num_trees: num_trees as u32,
        node_format: NODE_FORMAT_JSON.to_string(),
        validation_loss: model.validation_loss().filter(|loss| !loss.is_nan()),
        initial_predictions: model.initial_predictions().to_vec(),
        training_logs: model.training_logs().map(str::to_string),
    };
    fs::write(
        directory.join(HEADER_FILENAME),
        serde_json::to_string_pretty(&header)?,
    )?;

    let meta = convert::meta_to_schema(model.meta());
    fs::write(
        directory.join(ABSTRACT_HEADER_FILENAME),
        serde_json::to_string_pretty(&meta)?,
    )?;

    // The sentinel goes last: its presence certifies a complete save.
    fs::write(directory.join(DONE_FILENAME), b"")?;
    Ok(())
}

/// Load a model from `directory`.
pub fn load_model(directory: &Path) -> Result<GradientBoostedTreesModel> {
    if !directory.join(DONE_FILENAME).exists() {
        return Err(GbtError::InvalidData(format!(
            "the model directory {} has no \"{}\" sentinel; the save did not complete",
            directory.display(),
            DONE_FILENAME
        )));
    }

    let header: HeaderSchema =
        serde_json::from_str(&fs::read_to_string(directory.join(HEADER_FILENAME))?)?;
    if header.node_format != NODE_FORMAT_JSON {
        return Err(GbtError::Unimplemented(format!(
            "unsupported node format \"{}\"",
            header.node_format
        )));
    }

    let meta: ModelMetaSchema =
        serde_json::from_str(&fs::read_to_string(directory.join(ABSTRACT_HEADER_FILENAME))?)?;

    let mut model = GradientBoostedTreesModel::new(
        convert::meta_from_schema(meta)?,
        header.loss,
        header.num_trees_per_iter as usize,
        header.initial_predictions,
    );
    model.set_validation_loss(header.validation_loss);
    model.set_node_format(Some(header.node_format));
    model.set_training_logs(header.training_logs);

    let num_shards = header.num_node_shards as usize;
    for shard_idx in 0..num_shards {
        let path = directory.join(shard_filename(shard_idx, num_shards));
        let shard: NodeShardSchema = serde_json::from_str(&fs::read_to_string(path)?)?;
        for tree in shard.trees {
            model.add_tree(convert::tree_from_schema(tree)?);
        }
    }
    if model.trees().len() != header.num_trees as usize {
        return Err(GbtError::InvalidData(format!(
            "the model directory holds {} trees but its header announces {}",
            model.trees().len(),
            header.num_trees
        )));
    }

    model.validate()?;
    Ok(model)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnSpec, ColumnType, DataSpec};
    use crate::model::{ModelMeta, Task};
    use crate::training::LossKind;
    use crate::trees::{Regressor, Tree};

    fn small_model() -> GradientBoostedTreesModel {
        let meta = ModelMeta {
            name: "persist-test".to_string(),
            task: Task::Regression,
            label_col_idx: 0,
            ranking_group_col_idx: None,
            weight_col_idx: None,
            input_features: Vec::new(),
            data_spec: DataSpec::new(vec![ColumnSpec {
                name: "y".to_string(),
                column_type: ColumnType::Numerical,
                num_unique_values: 0,
            }]),
        };
        let mut model =
            GradientBoostedTreesModel::new(meta, LossKind::SquaredError, 1, vec![1.5]);
        model.add_tree(Tree::single_leaf(Regressor {
            top_value: 0.25,
            hessian_stats: None,
        }));
        model
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let model = small_model();
        save_model(&model, dir.path()).unwrap();

        let loaded = load_model(dir.path()).unwrap();
        assert_eq!(loaded.loss(), LossKind::SquaredError);
        assert_eq!(loaded.num_trees_per_iter(), 1);
        assert_eq!(loaded.initial_predictions(), &[1.5]);
        assert_eq!(loaded.trees().len(), 1);
        assert_eq!(loaded.trees()[0].regressor(0).top_value, 0.25);
        assert_eq!(loaded.node_format(), Some("json"));
    }

    #[test]
    fn missing_done_sentinel_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let model = small_model();
        save_model(&model, dir.path()).unwrap();
        fs::remove_file(dir.path().join(DONE_FILENAME)).unwrap();

        let err = load_model(dir.path()).unwrap_err();
        assert!(err.to_string().contains("done"));
    }

    #[test]
    fn nan_validation_loss_is_stored_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = small_model();
        model.set_validation_loss(Some(f32::NAN));
        save_model(&model, dir.path()).unwrap();

        let loaded = load_model(dir.path()).unwrap();
        assert_eq!(loaded.validation_loss(), None);
    }

    #[test]
    fn finite_validation_loss_round_trips_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = small_model();
        model.set_validation_loss(Some(0.123_456_7));
        save_model(&model, dir.path()).unwrap();

        let loaded = load_model(dir.path()).unwrap();
        assert_eq!(loaded.validation_loss(), Some(0.123_456_7));
    }

    #[test]
    fn expected_files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        save_model(&small_model(), dir.path()).unwrap();

        assert!(dir.path().join(HEADER_FILENAME).exists());
        assert!(dir.path().join(ABSTRACT_HEADER_FILENAME).exists());
        assert!(dir.path().join("nodes-00000-of-00001").exists());
        assert!(dir.path().join(DONE_FILENAME).exists());
    }
}
