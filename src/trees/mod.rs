//! Decision tree storage and traversal.
//!
//! Trees are stored as parallel arrays (structure of arrays) for
//! cache-friendly root-to-leaf traversal. Child indices are local to the
//! tree and the root is always node 0.
//!
//! Growing trees (split finding) is an external concern: growers produce
//! trees through [`Tree::from_arrays`] and assign leaf payloads through the
//! loss-provided leaf setter (see [`crate::training::SetLeafFn`]).

use crate::data::Dataset;

/// Node index local to one tree (0 = root).
pub type NodeId = u32;

// =============================================================================
// Leaf payload
// =============================================================================

/// Newton-step statistics attached to a leaf under hessian-gain split
/// scoring.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HessianStats {
    /// Weighted gradient sum over the leaf's examples.
    pub sum_gradients: f64,
    /// Weighted hessian sum over the leaf's examples.
    pub sum_hessians: f64,
    /// Weight sum over the leaf's examples.
    pub sum_weights: f64,
}

/// The payload of a leaf: the scalar contribution it adds to an example's
/// accumulated prediction, plus optional hessian statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Regressor {
    /// The leaf value added to the running prediction.
    pub top_value: f32,
    /// Present only when hessian-gain split scoring is enabled.
    pub hessian_stats: Option<HessianStats>,
}

// =============================================================================
// Splits
// =============================================================================

/// The kind of condition evaluated at a split node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitType {
    /// `value >= threshold` routes to the right child; `NaN` follows the
    /// node's default direction.
    Numerical,
    /// Membership of the categorical value in the node's category set routes
    /// to the right child.
    Categorical,
}

// =============================================================================
// Tree
// =============================================================================

/// Structure-of-arrays binary tree.
///
/// All arrays are indexed by [`NodeId`]. Non-leaf slots of `regressors` and
/// leaf slots of the split arrays hold defaults and are never read.
#[derive(Debug, Clone)]
pub struct Tree {
    split_indices: Vec<u32>,
    split_thresholds: Vec<f32>,
    left_children: Vec<NodeId>,
    right_children: Vec<NodeId>,
    default_left: Vec<bool>,
    split_types: Vec<SplitType>,
    /// Category set per node; empty for numerical splits and leaves.
    categories: Vec<Vec<u32>>,
    is_leaf: Vec<bool>,
    regressors: Vec<Regressor>,
}

impl Tree {
    /// A tree made of a single leaf.
    pub fn single_leaf(regressor: Regressor) -> Self {
        Self {
            split_indices: vec![0],
            split_thresholds: vec![0.0],
            left_children: vec![0],
            right_children: vec![0],
            default_left: vec![false],
            split_types: vec![SplitType::Numerical],
            categories: vec![Vec::new()],
            is_leaf: vec![true],
            regressors: vec![regressor],
        }
    }

    /// Assemble a tree from parallel arrays.
    ///
    /// All arrays must have the same length and node 0 must be the root.
    #[allow(clippy::too_many_arguments)]
    pub fn from_arrays(
        split_indices: Vec<u32>,
        split_thresholds: Vec<f32>,
        left_children: Vec<NodeId>,
        right_children: Vec<NodeId>,
        default_left: Vec<bool>,
        split_types: Vec<SplitType>,
        categories: Vec<Vec<u32>>,
        is_leaf: Vec<bool>,
        regressors: Vec<Regressor>,
    ) -> Self {
        let n = split_indices.len();
        debug_assert_eq!(n, split_thresholds.len());
        debug_assert_eq!(n, left_children.len());
        debug_assert_eq!(n, right_children.len());
        debug_assert_eq!(n, default_left.len());
        debug_assert_eq!(n, split_types.len());
        debug_assert_eq!(n, categories.len());
        debug_assert_eq!(n, is_leaf.len());
        debug_assert_eq!(n, regressors.len());

        Self {
            split_indices,
            split_thresholds,
            left_children,
            right_children,
            default_left,
            split_types,
            categories,
            is_leaf,
            regressors,
        }
    }

    /// Number of nodes (internal nodes + leaves).
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    /// Whether `node` is a leaf.
    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    /// Iterate the ids of all leaves, in node order.
    pub fn leaf_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.n_nodes() as NodeId).filter(move |&n| self.is_leaf(n))
    }

    /// Number of leaves.
    pub fn num_leaves(&self) -> usize {
        self.is_leaf.iter().filter(|&&l| l).count()
    }

    /// The regressor of leaf `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not a leaf.
    #[inline]
    pub fn regressor(&self, node: NodeId) -> &Regressor {
        assert!(self.is_leaf(node), "node {} is not a leaf", node);
        &self.regressors[node as usize]
    }

    /// Mutable access to the regressor of leaf `node`, for leaf setters.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not a leaf.
    #[inline]
    pub fn regressor_mut(&mut self, node: NodeId) -> &mut Regressor {
        assert!(self.is_leaf(node), "node {} is not a leaf", node);
        &mut self.regressors[node as usize]
    }

    /// Walk the tree for `row` and return the reached leaf's id.
    pub fn leaf_index(&self, dataset: &Dataset, row: usize) -> NodeId {
        let mut node = 0 as NodeId;
        while !self.is_leaf[node as usize] {
            let idx = node as usize;
            let feature = self.split_indices[idx] as usize;
            let go_right = match self.split_types[idx] {
                SplitType::Numerical => {
                    let value = dataset.numerical(feature)[row];
                    if value.is_nan() {
                        !self.default_left[idx]
                    } else {
                        value >= self.split_thresholds[idx]
                    }
                }
                SplitType::Categorical => {
                    let value = dataset.categorical(feature)[row];
                    self.categories[idx].contains(&value)
                }
            };
            node = if go_right {
                self.right_children[idx]
            } else {
                self.left_children[idx]
            };
        }
        node
    }

    /// Walk the tree for `row` and return the reached leaf's regressor.
    #[inline]
    pub fn leaf(&self, dataset: &Dataset, row: usize) -> &Regressor {
        let node = self.leaf_index(dataset, row);
        &self.regressors[node as usize]
    }

    // Raw array accessors, used by the persistence layer.

    pub(crate) fn split_indices(&self) -> &[u32] {
        &self.split_indices
    }
    pub(crate) fn split_thresholds(&self) -> &[f32] {
        &self.split_thresholds
    }
    pub(crate) fn left_children(&self) -> &[NodeId] {
        &self.left_children
    }
    pub(crate) fn right_children(&self) -> &[NodeId] {
        &self.right_children
    }
    pub(crate) fn default_left(&self) -> &[bool] {
        &self.default_left
    }
    pub(crate) fn split_types(&self) -> &[SplitType] {
        &self.split_types
    }
    pub(crate) fn categories(&self) -> &[Vec<u32>] {
        &self.categories
    }
    pub(crate) fn is_leaf_flags(&self) -> &[bool] {
        &self.is_leaf
    }
    pub(crate) fn regressors(&self) -> &[Regressor] {
        &self.regressors
    }
}

// =============================================================================
// Tests
// =============================================================================
