//! End-to-end training scenarios through the public API.

use approx::assert_relative_eq;

use canopy::testing::{SingleLeafGrower, ThresholdStumpGrower};
use canopy::training::{RankingGroupsIndex, Verbosity, XeNdcgGamma};
use canopy::{
    Dataset, DatasetBuilder, GbtConfig, GbtTrainer, LossKind, ModelSpec, Prediction, Task,
    TrainerOptions,
};

fn options(num_iterations: usize) -> TrainerOptions {
    TrainerOptions {
        num_iterations,
        verbosity: Verbosity::Silent,
        gbt: GbtConfig {
            shrinkage: 1.0,
            ..Default::default()
        },
        ..Default::default()
    }
}

// =============================================================================
// Binary classification
// =============================================================================

#[test]
fn balanced_binary_training_keeps_even_odds() {
    // Labels [1, 2, 2, 1] with uniform weights: the initial log-odds is 0 and
    // a single-leaf tree adds a zero Newton step, so the served distribution
    // stays at 50/50.
    let dataset = DatasetBuilder::default()
        .categorical("label", 3, vec![1, 2, 2, 1])
        .numerical("f", vec![0.0, 1.0, 2.0, 3.0])
        .build()
        .unwrap();
    let trainer = GbtTrainer::new(SingleLeafGrower, options(1));
    let spec = ModelSpec {
        name: "binary".to_string(),
        task: Task::Classification,
        loss: LossKind::BinomialLogLikelihood,
        label_col_idx: 0,
        ranking_group_col_idx: None,
    };
    let model = trainer.train(&spec, &dataset, &[], None).unwrap();

    assert_eq!(model.trees().len(), 1);
    for row in 0..dataset.nrow() {
        match model.predict(&dataset, row) {
            Prediction::Classification {
                value,
                distribution,
                sum,
            } => {
                assert_eq!(value, 1); // p == 0.5 is not > 0.5
                assert_eq!(distribution[0], 0.0);
                assert_relative_eq!(distribution[1], 0.5, epsilon = 1e-6);
                assert_relative_eq!(distribution[2], 0.5, epsilon = 1e-6);
                assert_eq!(sum, 1.0);
            }
            other => panic!("unexpected prediction {:?}", other),
        }
    }
}

#[test]
fn separable_binary_training_learns_the_split() {
    // The feature separates the classes at 1.5; a stump grower should push
    // the two sides toward opposite logits within a few iterations.
    let dataset = DatasetBuilder::default()
        .categorical("label", 3, vec![1, 1, 2, 2])
        .numerical("f", vec![0.0, 1.0, 2.0, 3.0])
        .build()
        .unwrap();
    let grower = ThresholdStumpGrower {
        feature: 1,
        threshold: 1.5,
    };
    let mut opts = options(10);
    opts.gbt.shrinkage = 0.3;
    let trainer = GbtTrainer::new(grower, opts);
    let spec = ModelSpec {
        name: "binary".to_string(),
        task: Task::Classification,
        loss: LossKind::BinomialLogLikelihood,
        label_col_idx: 0,
        ranking_group_col_idx: None,
    };
    let model = trainer.train(&spec, &dataset, &[], None).unwrap();

    let class_of = |row: usize| match model.predict(&dataset, row) {
        Prediction::Classification { value, .. } => value,
        other => panic!("unexpected prediction {:?}", other),
    };
    assert_eq!(class_of(0), 1);
    assert_eq!(class_of(1), 1);
    assert_eq!(class_of(2), 2);
    assert_eq!(class_of(3), 2);

    // Binary distributions always sum to 1.
    for row in 0..4 {
        if let Prediction::Classification { distribution, .. } = model.predict(&dataset, row) {
            assert_relative_eq!(distribution[1] + distribution[2], 1.0, epsilon = 1e-6);
        }
    }
}

// =============================================================================
// Regression
// =============================================================================

#[test]
fn regression_single_leaf_predicts_the_mean() {
    // y = [1, 2, 3]: the initial prediction is the mean 2.0 and the residual
    // sum is zero, so every grown leaf is zero and the model serves 2.0.
    let dataset = DatasetBuilder::default()
        .numerical("y", vec![1.0, 2.0, 3.0])
        .numerical("f", vec![0.0, 1.0, 2.0])
        .build()
        .unwrap();
    let trainer = GbtTrainer::new(SingleLeafGrower, options(1));
    let spec = ModelSpec {
        name: "reg".to_string(),
        task: Task::Regression,
        loss: LossKind::SquaredError,
        label_col_idx: 0,
        ranking_group_col_idx: None,
    };
    let model = trainer.train(&spec, &dataset, &[], None).unwrap();

    for row in 0..3 {
        match model.predict(&dataset, row) {
            Prediction::Regression { value } => assert_relative_eq!(value, 2.0, epsilon = 1e-6),
            other => panic!("unexpected prediction {:?}", other),
        }
    }
}

#[test]
fn regression_stump_fits_separable_targets() {
    let dataset = DatasetBuilder::default()
        .numerical("y", vec![1.0, 1.0, 5.0, 5.0])
        .numerical("f", vec![0.0, 1.0, 2.0, 3.0])
        .build()
        .unwrap();
    let grower = ThresholdStumpGrower {
        feature: 1,
        threshold: 1.5,
    };
    let trainer = GbtTrainer::new(grower, options(8));
    let spec = ModelSpec {
        name: "reg".to_string(),
        task: Task::Regression,
        loss: LossKind::SquaredError,
        label_col_idx: 0,
        ranking_group_col_idx: None,
    };
    let model = trainer.train(&spec, &dataset, &[], None).unwrap();

    for (row, expected) in [(0, 1.0f32), (3, 5.0)] {
        match model.predict(&dataset, row) {
            Prediction::Regression { value } => assert_relative_eq!(value, expected, epsilon = 1e-3),
            other => panic!("unexpected prediction {:?}", other),
        }
    }
}

// =============================================================================
// Multi-class classification
// =============================================================================

#[test]
fn multiclass_training_respects_the_oov_slot() {
    // K = 2, labels [1, 2, 1, 2]: gradients cancel inside a single leaf, so
    // the softmax stays uniform; the distribution still reserves slot 0.
    let dataset = DatasetBuilder::default()
        .categorical("label", 3, vec![1, 2, 1, 2])
        .numerical("f", vec![0.0, 1.0, 2.0, 3.0])
        .build()
        .unwrap();
    let trainer = GbtTrainer::new(SingleLeafGrower, options(1));
    let spec = ModelSpec {
        name: "multiclass".to_string(),
        task: Task::Classification,
        loss: LossKind::MultinomialLogLikelihood,
        label_col_idx: 0,
        ranking_group_col_idx: None,
    };
    let model = trainer.train(&spec, &dataset, &[], None).unwrap();

    assert_eq!(model.num_trees_per_iter(), 2);
    assert_eq!(model.trees().len(), 2);

    for row in 0..4 {
        match model.predict(&dataset, row) {
            Prediction::Classification {
                value,
                distribution,
                ..
            } => {
                assert_eq!(distribution[0], 0.0);
                let total: f32 = distribution.iter().sum();
                assert_relative_eq!(total, 1.0, epsilon = 1e-5);
                assert_relative_eq!(distribution[1], 0.5, epsilon = 1e-6);
                assert_relative_eq!(distribution[2], 0.5, epsilon = 1e-6);
                assert!((1..=2).contains(&value));
            }
            other => panic!("unexpected prediction {:?}", other),
        }
    }
}

#[test]
fn multiclass_tree_count_is_a_multiple_of_the_class_count() {
    let dataset = DatasetBuilder::default()
        .categorical("label", 4, vec![1, 2, 3, 1, 2, 3])
        .numerical("f", vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0])
        .build()
        .unwrap();
    let trainer = GbtTrainer::new(SingleLeafGrower, options(4));
    let spec = ModelSpec {
        name: "multiclass".to_string(),
        task: Task::Classification,
        loss: LossKind::MultinomialLogLikelihood,
        label_col_idx: 0,
        ranking_group_col_idx: None,
    };
    let model = trainer.train(&spec, &dataset, &[], None).unwrap();

    assert_eq!(model.trees().len() % model.num_trees_per_iter(), 0);
    assert_eq!(model.trees().len(), 12);
}

// =============================================================================
// Ranking
// =============================================================================

fn ranking_dataset() -> Dataset {
    DatasetBuilder::default()
        .numerical("relevance", vec![2.0, 1.0, 0.0])
        .hash("group", vec![9, 9, 9])
        .numerical("f", vec![2.0, 1.0, 0.0])
        .build()
        .unwrap()
}

#[test]
fn lambdamart_tied_predictions_start_from_perfect_ndcg() {
    // With all predictions tied, the group index orders items by ground
    // truth, so NDCG@5 is 1.0 and the gradient sums to zero per group.
    let dataset = ranking_dataset();
    let index = RankingGroupsIndex::build(&dataset, 0, 1).unwrap();
    assert_relative_eq!(index.ndcg(&[0.0, 0.0, 0.0], &[], 5), 1.0, epsilon = 1e-9);

    let trainer = GbtTrainer::new(SingleLeafGrower, options(1));
    let spec = ModelSpec {
        name: "rank".to_string(),
        task: Task::Ranking,
        loss: LossKind::LambdaMartNdcg5,
        label_col_idx: 0,
        ranking_group_col_idx: Some(1),
    };
    let model = trainer.train(&spec, &dataset, &[], None).unwrap();

    // The single-leaf Newton step over a zero-sum gradient is zero.
    for row in 0..3 {
        match model.predict(&dataset, row) {
            Prediction::Ranking { relevance } => {
                assert_relative_eq!(relevance, 0.0, epsilon = 1e-6)
            }
            other => panic!("unexpected prediction {:?}", other),
        }
    }
}

#[test]
fn lambdamart_stump_learns_the_ordering() {
    let dataset = DatasetBuilder::default()
        .numerical("relevance", vec![2.0, 0.0, 2.0, 0.0])
        .hash("group", vec![1, 1, 2, 2])
        .numerical("f", vec![3.0, 0.0, 2.5, 0.5])
        .build()
        .unwrap();
    let grower = ThresholdStumpGrower {
        feature: 2,
        threshold: 1.5,
    };
    let trainer = GbtTrainer::new(grower, options(5));
    let spec = ModelSpec {
        name: "rank".to_string(),
        task: Task::Ranking,
        loss: LossKind::LambdaMartNdcg5,
        label_col_idx: 0,
        ranking_group_col_idx: Some(1),
    };
    let model = trainer.train(&spec, &dataset, &[], None).unwrap();

    let relevance_of = |row: usize| match model.predict(&dataset, row) {
        Prediction::Ranking { relevance } => relevance,
        other => panic!("unexpected prediction {:?}", other),
    };
    assert!(relevance_of(0) > relevance_of(1));
    assert!(relevance_of(2) > relevance_of(3));
}

#[test]
fn xe_ndcg_training_runs_and_scores() {
    let dataset = ranking_dataset();
    let mut opts = options(3);
    opts.gbt.xe_ndcg.gamma = XeNdcgGamma::One;
    let trainer = GbtTrainer::new(
        ThresholdStumpGrower {
            feature: 2,
            threshold: 1.5,
        },
        opts,
    );
    let spec = ModelSpec {
        name: "rank".to_string(),
        task: Task::Ranking,
        loss: LossKind::XeNdcgMart,
        label_col_idx: 0,
        ranking_group_col_idx: Some(1),
    };
    let model = trainer.train(&spec, &dataset, &[], None).unwrap();
    assert_eq!(model.trees().len(), 3);

    // The separable feature keeps the ground-truth ordering.
    let relevance_of = |row: usize| match model.predict(&dataset, row) {
        Prediction::Ranking { relevance } => relevance,
        other => panic!("unexpected prediction {:?}", other),
    };
    assert!(relevance_of(0) >= relevance_of(2));
}

// =============================================================================
// Weighted training
// =============================================================================

#[test]
fn weights_shift_the_initial_prediction() {
    let dataset = DatasetBuilder::default()
        .numerical("y", vec![0.0, 10.0])
        .build()
        .unwrap();
    let trainer = GbtTrainer::new(SingleLeafGrower, options(1));
    let spec = ModelSpec {
        name: "reg".to_string(),
        task: Task::Regression,
        loss: LossKind::SquaredError,
        label_col_idx: 0,
        ranking_group_col_idx: None,
    };

    let uniform = trainer.train(&spec, &dataset, &[], None).unwrap();
    assert_relative_eq!(uniform.initial_predictions()[0], 5.0, epsilon = 1e-6);

    let weighted = trainer.train(&spec, &dataset, &[9.0, 1.0], None).unwrap();
    assert_relative_eq!(weighted.initial_predictions()[0], 1.0, epsilon = 1e-6);
}
