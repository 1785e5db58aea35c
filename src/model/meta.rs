//! Abstract model metadata.

use serde::{Deserialize, Serialize};

use crate::data::DataSpec;

/// The learning task a model was trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Task {
    /// Predict a class of a categorical label.
    Classification,
    /// Predict a numerical value.
    Regression,
    /// Order examples within ranking groups by relevance.
    Ranking,
}

/// Metadata shared by every model kind: what was trained on which columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMeta {
    /// Model name.
    pub name: String,
    /// Learning task.
    pub task: Task,
    /// Index of the label column in the data specification.
    pub label_col_idx: usize,
    /// Index of the ranking group column; `None` for non-ranking tasks.
    pub ranking_group_col_idx: Option<usize>,
    /// Index of the example-weight column; `None` when weights were passed
    /// out of band or training was unweighted.
    pub weight_col_idx: Option<usize>,
    /// Indices of the input feature columns, in data-specification order.
    pub input_features: Vec<usize>,
    /// Specification of the training columns.
    pub data_spec: DataSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_serde_uses_stable_names() {
        assert_eq!(
            serde_json::to_string(&Task::Classification).unwrap(),
            "\"CLASSIFICATION\""
        );
        let task: Task = serde_json::from_str("\"RANKING\"").unwrap();
        assert_eq!(task, Task::Ranking);
    }
}
