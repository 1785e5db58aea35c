//! Columnar dataset and data specification.
//!
//! The training and inference core consumes data through this module's typed
//! column contract:
//!
//! - numerical columns are `f32` slices, `NaN` marks a missing value;
//! - categorical columns are `u32` indices into a vocabulary, index 0 is
//!   reserved for the out-of-vocabulary value in every vocabulary;
//! - hash columns are opaque `u64` values (used for ranking groups).
//!
//! Loading datasets from files is out of scope; callers assemble datasets in
//! memory with [`DatasetBuilder`].

mod dataset;

pub use dataset::{Column, ColumnSpec, ColumnType, DataSpec, Dataset, DatasetBuilder};

/// Row index into a columnar dataset.
pub type RowIdx = u64;
