//! Deterministic toy growers and helpers for tests and examples.
//!
//! Split finding is an external concern (see
//! [`TreeGrower`](crate::training::TreeGrower)); the growers here implement
//! just enough of that contract to drive the training loop end to end:
//! a single-leaf grower and a fixed-threshold stump grower. Neither looks at
//! gradients to choose a structure; they only exercise the leaf-setter
//! contract.

use crate::data::{Dataset, RowIdx};
use crate::error::Result;
use crate::training::{GradientData, SetLeafFn, TreeGrower};
use crate::trees::{Regressor, SplitType, Tree};

/// Grows a tree made of a single leaf holding every example.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleLeafGrower;

impl TreeGrower for SingleLeafGrower {
    fn grow_tree(
        &self,
        dataset: &Dataset,
        _gradient: &GradientData,
        weights: &[f32],
        set_leaf: &SetLeafFn<'_>,
    ) -> Result<Tree> {
        let selected: Vec<RowIdx> = (0..dataset.nrow() as RowIdx).collect();
        let mut tree = Tree::single_leaf(Regressor::default());
        set_leaf(dataset, &selected, weights, tree.regressor_mut(0))?;
        Ok(tree)
    }
}

/// Grows a depth-1 tree splitting a fixed numerical feature at a fixed
/// threshold (`value >= threshold` goes right, missing goes left).
#[derive(Debug, Clone, Copy)]
pub struct ThresholdStumpGrower {
    /// Feature column to split on.
    pub feature: usize,
    /// Split threshold.
    pub threshold: f32,
}

impl TreeGrower for ThresholdStumpGrower {
    fn grow_tree(
        &self,
        dataset: &Dataset,
        _gradient: &GradientData,
        weights: &[f32],
        set_leaf: &SetLeafFn<'_>,
    ) -> Result<Tree> {
        let values = dataset.numerical(self.feature);

        let mut left: Vec<RowIdx> = Vec::new();
        let mut right: Vec<RowIdx> = Vec::new();
        for (row, &value) in values.iter().enumerate() {
            if !value.is_nan() && value >= self.threshold {
                right.push(row as RowIdx);
            } else {
                left.push(row as RowIdx);
            }
        }

        let mut tree = Tree::from_arrays(
            vec![self.feature as u32, 0, 0],
            vec![self.threshold, 0.0, 0.0],
            vec![1, 0, 0],
            vec![2, 0, 0],
            vec![true, false, false],
            vec![SplitType::Numerical; 3],
            vec![Vec::new(); 3],
            vec![false, true, true],
            vec![Regressor::default(); 3],
        );
        set_leaf(dataset, &left, weights, tree.regressor_mut(1))?;
        set_leaf(dataset, &right, weights, tree.regressor_mut(2))?;
        Ok(tree)
    }
}
