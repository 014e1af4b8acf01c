//! Tabular feature/label extraction

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::{Subset, Table};
use crate::error::{Result, WorkbenchError};

/// Which numeric column becomes the label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "rule", content = "column", rename_all = "snake_case")]
pub enum LabelSelection {
    /// The last numeric column in table order
    #[default]
    LastNumeric,
    /// A named numeric column
    Column(String),
}

/// Row-major features and parallel labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTensors {
    pub features: Vec<f64>,
    pub labels: Vec<f64>,
    pub feature_names: Vec<String>,
    pub label_name: String,
    pub row_count: usize,
    /// Subset tag of each kept row when the pipeline split the data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsets: Option<Vec<Subset>>,
    /// Rows left out because a selected cell was missing
    #[serde(default)]
    pub skipped_rows: usize,
}

impl ExtractedTensors {
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let w = self.n_features();
        &self.features[i * w..(i + 1) * w]
    }

    /// Indices of rows in `subset`; every row when no split exists and `subset` is train
    pub fn rows_in(&self, subset: Subset) -> Vec<usize> {
        match &self.subsets {
            Some(tags) => tags
                .iter()
                .enumerate()
                .filter(|(_, t)| **t == subset)
                .map(|(i, _)| i)
                .collect(),
            None if subset == Subset::Train => (0..self.row_count).collect(),
            None => Vec::new(),
        }
    }
}

/// Derives feature and label tensors from a transformed table
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    selection: LabelSelection,
}

impl FeatureExtractor {
    pub fn new(selection: LabelSelection) -> Self {
        Self { selection }
    }

    pub fn extract(&self, table: &Table) -> Result<ExtractedTensors> {
        let numeric = table.numeric_columns();
        if numeric.len() < 2 {
            return Err(WorkbenchError::InsufficientFeatures { found: numeric.len() });
        }

        let label_name = match &self.selection {
            LabelSelection::LastNumeric => numeric[numeric.len() - 1].clone(),
            LabelSelection::Column(name) => {
                if !numeric.contains(name) {
                    return Err(WorkbenchError::InvalidParameter {
                        name: "label_column".to_string(),
                        value: name.clone(),
                        reason: "not a numeric column of the transformed data".to_string(),
                    });
                }
                name.clone()
            }
        };
        let feature_names: Vec<String> = numeric.into_iter().filter(|n| *n != label_name).collect();

        let feature_cols: Vec<_> = feature_names
            .iter()
            .filter_map(|n| table.column(n))
            .collect();
        let label_col = table
            .column(&label_name)
            .ok_or_else(|| WorkbenchError::NotFound(format!("column '{}'", label_name)))?;

        let mut features = Vec::with_capacity(table.n_rows() * feature_cols.len());
        let mut labels = Vec::with_capacity(table.n_rows());
        let mut subsets = table.subsets().map(|_| Vec::with_capacity(table.n_rows()));
        let mut skipped = 0;

        'rows: for i in 0..table.n_rows() {
            let Some(y) = label_col.values[i].as_number() else {
                skipped += 1;
                continue;
            };
            let start = features.len();
            for col in &feature_cols {
                match col.values[i].as_number() {
                    Some(v) => features.push(v),
                    None => {
                        features.truncate(start);
                        skipped += 1;
                        continue 'rows;
                    }
                }
            }
            labels.push(y);
            if let (Some(out), Some(tags)) = (subsets.as_mut(), table.subsets()) {
                out.push(tags[i]);
            }
        }

        if skipped > 0 {
            info!(skipped, "rows with missing values excluded from training tensors");
        }
        debug!(
            features = ?feature_names,
            label = %label_name,
            rows = labels.len(),
            "extracted tabular tensors"
        );

        Ok(ExtractedTensors {
            row_count: labels.len(),
            features,
            labels,
            feature_names,
            label_name,
            subsets,
            skipped_rows: skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Cell, Column};

    fn table() -> Table {
        Table::from_rows(
            vec!["x1".into(), "name".into(), "x2".into(), "y".into()],
            vec![
                vec![Cell::Number(1.0), Cell::from("a"), Cell::Number(2.0), Cell::Number(10.0)],
                vec![Cell::Number(2.0), Cell::from("b"), Cell::Missing, Cell::Number(20.0)],
                vec![Cell::Number(3.0), Cell::from("c"), Cell::Number(4.0), Cell::Number(30.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_last_numeric_is_label() {
        let out = FeatureExtractor::default().extract(&table()).unwrap();
        assert_eq!(out.feature_names, vec!["x1", "x2"]);
        assert_eq!(out.label_name, "y");
        assert_eq!(out.row_count, 2);
        assert_eq!(out.skipped_rows, 1);
        assert_eq!(out.features.len(), out.n_features() * out.labels.len());
        assert_eq!(out.row(1), &[3.0, 4.0]);
        assert_eq!(out.labels, vec![10.0, 30.0]);
    }

    #[test]
    fn test_explicit_label_column() {
        let out = FeatureExtractor::new(LabelSelection::Column("x1".into()))
            .extract(&table())
            .unwrap();
        assert_eq!(out.label_name, "x1");
        assert_eq!(out.feature_names, vec!["x2", "y"]);
    }

    #[test]
    fn test_insufficient_features() {
        let t = Table::new(vec![
            Column::numeric("only", vec![1.0]),
            Column::new("text", vec![Cell::from("z")]),
        ])
        .unwrap();
        let err = FeatureExtractor::default().extract(&t).unwrap_err();
        assert!(matches!(err, WorkbenchError::InsufficientFeatures { found: 1 }));
    }

    #[test]
    fn test_subsets_follow_kept_rows() {
        let mut t = table();
        t.set_subsets(vec![Subset::Train, Subset::Test, Subset::Validation]).unwrap();
        let out = FeatureExtractor::default().extract(&t).unwrap();
        assert_eq!(out.subsets, Some(vec![Subset::Train, Subset::Validation]));
        assert_eq!(out.rows_in(Subset::Validation), vec![1]);
    }

    #[test]
    fn test_label_selection_serde() {
        let json = serde_json::to_value(LabelSelection::Column("y".into())).unwrap();
        assert_eq!(json, serde_json::json!({"rule": "column", "column": "y"}));
        let back: LabelSelection = serde_json::from_value(serde_json::json!({"rule": "last_numeric"})).unwrap();
        assert_eq!(back, LabelSelection::LastNumeric);
    }
}
