//! In-memory columnar dataset.

use serde::{Deserialize, Serialize};

use crate::error::{GbtError, Result};

// =============================================================================
// Data specification
// =============================================================================

/// The kind of values a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    /// `f32` values; `NaN` means missing.
    Numerical,
    /// `u32` vocabulary indices; 0 is the out-of-vocabulary value.
    Categorical,
    /// Opaque `u64` group identifiers.
    Hash,
}

/// Per-column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Column kind.
    pub column_type: ColumnType,
    /// Vocabulary size for categorical columns, including the reserved
    /// out-of-vocabulary slot at index 0. Zero for other column kinds.
    pub num_unique_values: u32,
}

/// Description of every column of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSpec {
    columns: Vec<ColumnSpec>,
}

impl DataSpec {
    /// Create a specification from column metadata.
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Metadata of column `col_idx`.
    ///
    /// # Panics
    ///
    /// Panics if `col_idx` is out of bounds.
    pub fn column(&self, col_idx: usize) -> &ColumnSpec {
        &self.columns[col_idx]
    }

    /// Index of the column named `name`, if any.
    pub fn column_idx_by_name(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

// =============================================================================
// Columns
// =============================================================================

/// A single typed column of values.
#[derive(Debug, Clone)]
pub enum Column {
    /// Numerical values, `NaN` = missing.
    Numerical(Vec<f32>),
    /// Categorical vocabulary indices, 0 = out-of-vocabulary.
    Categorical(Vec<u32>),
    /// Hashed group identifiers.
    Hash(Vec<u64>),
}

impl Column {
    /// Number of rows in this column.
    pub fn len(&self) -> usize {
        match self {
            Column::Numerical(v) => v.len(),
            Column::Categorical(v) => v.len(),
            Column::Hash(v) => v.len(),
        }
    }

    /// Returns true if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn column_type(&self) -> ColumnType {
        match self {
            Column::Numerical(_) => ColumnType::Numerical,
            Column::Categorical(_) => ColumnType::Categorical,
            Column::Hash(_) => ColumnType::Hash,
        }
    }
}

// =============================================================================
// Dataset
// =============================================================================

/// An ordered sequence of rows stored column by column.
///
/// Typed accessors panic on a column-kind mismatch: asking for the wrong kind
/// is a programming error, not a recoverable condition. The `as_*` variants
/// return `None` instead, for call sites that accept several kinds (e.g. the
/// ranking group column, which may be categorical or hash).
#[derive(Debug, Clone)]
pub struct Dataset {
    spec: DataSpec,
    columns: Vec<Column>,
    n_rows: usize,
}

impl Dataset {
    /// Number of rows.
    pub fn nrow(&self) -> usize {
        self.n_rows
    }

    /// The data specification describing the columns.
    pub fn spec(&self) -> &DataSpec {
        &self.spec
    }

    /// Numerical values of column `col_idx`.
    ///
    /// # Panics
    ///
    /// Panics if the column is not numerical.
    pub fn numerical(&self, col_idx: usize) -> &[f32] {
        match &self.columns[col_idx] {
            Column::Numerical(v) => v,
            other => panic!(
                "column {} (\"{}\") is {:?}, expected NUMERICAL",
                col_idx,
                self.spec.column(col_idx).name,
                other.column_type()
            ),
        }
    }

    /// Categorical values of column `col_idx`.
    ///
    /// # Panics
    ///
    /// Panics if the column is not categorical.
    pub fn categorical(&self, col_idx: usize) -> &[u32] {
        match &self.columns[col_idx] {
            Column::Categorical(v) => v,
            other => panic!(
                "column {} (\"{}\") is {:?}, expected CATEGORICAL",
                col_idx,
                self.spec.column(col_idx).name,
                other.column_type()
            ),
        }
    }

    /// Hash values of column `col_idx`.
    ///
    /// # Panics
    ///
    /// Panics if the column is not a hash column.
    pub fn hash(&self, col_idx: usize) -> &[u64] {
        match &self.columns[col_idx] {
            Column::Hash(v) => v,
            other => panic!(
                "column {} (\"{}\") is {:?}, expected HASH",
                col_idx,
                self.spec.column(col_idx).name,
                other.column_type()
            ),
        }
    }

    /// Categorical values of column `col_idx`, or `None` on a kind mismatch.
    pub fn as_categorical(&self, col_idx: usize) -> Option<&[u32]> {
        match &self.columns[col_idx] {
            Column::Categorical(v) => Some(v),
            _ => None,
        }
    }

    /// Hash values of column `col_idx`, or `None` on a kind mismatch.
    pub fn as_hash(&self, col_idx: usize) -> Option<&[u64]> {
        match &self.columns[col_idx] {
            Column::Hash(v) => Some(v),
            _ => None,
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Incremental [`Dataset`] construction with validation at `build()`.
///
/// # Example
///
/// ```
/// use canopy::data::DatasetBuilder;
///
/// let dataset = DatasetBuilder::default()
///     .numerical("age", vec![32.0, 41.0, 27.0])
///     .categorical("label", 3, vec![1, 2, 1])
///     .build()
///     .unwrap();
/// assert_eq!(dataset.nrow(), 3);
/// ```
#[derive(Debug, Default)]
pub struct DatasetBuilder {
    specs: Vec<ColumnSpec>,
    columns: Vec<Column>,
}

impl DatasetBuilder {
    /// Add a numerical column.
    pub fn numerical(mut self, name: &str, values: Vec<f32>) -> Self {
        self.specs.push(ColumnSpec {
            name: name.to_string(),
            column_type: ColumnType::Numerical,
            num_unique_values: 0,
        });
        self.columns.push(Column::Numerical(values));
        self
    }

    /// Add a categorical column with a vocabulary of `num_unique_values`
    /// entries (index 0 being the out-of-vocabulary slot).
    pub fn categorical(mut self, name: &str, num_unique_values: u32, values: Vec<u32>) -> Self {
        self.specs.push(ColumnSpec {
            name: name.to_string(),
            column_type: ColumnType::Categorical,
            num_unique_values,
        });
        self.columns.push(Column::Categorical(values));
        self
    }

    /// Add a hash column.
    pub fn hash(mut self, name: &str, values: Vec<u64>) -> Self {
        self.specs.push(ColumnSpec {
            name: name.to_string(),
            column_type: ColumnType::Hash,
            num_unique_values: 0,
        });
        self.columns.push(Column::Hash(values));
        self
    }

    /// Validate column consistency and assemble the dataset.
    pub fn build(self) -> Result<Dataset> {
        let n_rows = self.columns.first().map_or(0, Column::len);

        for (idx, column) in self.columns.iter().enumerate() {
            if column.len() != n_rows {
                return Err(GbtError::InvalidData(format!(
                    "column {} (\"{}\") has {} rows, expected {}",
                    idx,
                    self.specs[idx].name,
                    column.len(),
                    n_rows
                )));
            }
            if let Column::Categorical(values) = column {
                let vocab = self.specs[idx].num_unique_values;
                if let Some(bad) = values.iter().find(|&&v| v >= vocab) {
                    return Err(GbtError::InvalidData(format!(
                        "column {} (\"{}\") contains value {} outside its vocabulary of {} entries",
                        idx, self.specs[idx].name, bad, vocab
                    )));
                }
            }
        }

        Ok(Dataset {
            spec: DataSpec::new(self.specs),
            columns: self.columns,
            n_rows,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_access() {
        let dataset = DatasetBuilder::default()
            .numerical("f", vec![1.0, 2.0, f32::NAN])
            .categorical("label", 3, vec![1, 2, 1])
            .hash("group", vec![10, 10, 11])
            .build()
            .unwrap();

        assert_eq!(dataset.nrow(), 3);
        assert_eq!(dataset.numerical(0)[1], 2.0);
        assert!(dataset.numerical(0)[2].is_nan());
        assert_eq!(dataset.categorical(1), &[1, 2, 1]);
        assert_eq!(dataset.hash(2), &[10, 10, 11]);
    }

    #[test]
    fn soft_casts_return_none_on_mismatch() {
        let dataset = DatasetBuilder::default()
            .numerical("f", vec![1.0])
            .build()
            .unwrap();

        assert!(dataset.as_categorical(0).is_none());
        assert!(dataset.as_hash(0).is_none());
    }

    #[test]
    #[should_panic(expected = "expected CATEGORICAL")]
    fn hard_cast_panics_on_mismatch() {
        let dataset = DatasetBuilder::default()
            .numerical("f", vec![1.0])
            .build()
            .unwrap();
        dataset.categorical(0);
    }

    #[test]
    fn inconsistent_row_counts_rejected() {
        let err = DatasetBuilder::default()
            .numerical("a", vec![1.0, 2.0])
            .numerical("b", vec![1.0])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("has 1 rows, expected 2"));
    }

    #[test]
    fn out_of_vocabulary_values_rejected() {
        let err = DatasetBuilder::default()
            .categorical("label", 3, vec![1, 3])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("outside its vocabulary"));
    }

    #[test]
    fn column_lookup_by_name() {
        let dataset = DatasetBuilder::default()
            .numerical("a", vec![0.0])
            .categorical("b", 2, vec![1])
            .build()
            .unwrap();
        assert_eq!(dataset.spec().column_idx_by_name("b"), Some(1));
        assert_eq!(dataset.spec().column_idx_by_name("missing"), None);
    }
}
