//! Deterministic replay of recorded pipeline steps

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::columns::{self, ColumnsParams};
use super::encoder::{self, EncodeParams};
use super::imputer::{self, MissingParams};
use super::outlier::{self, ClipParams};
use super::scaler::{self, NormalizeParams, ScaleStepParams};
use super::split::{self, SplitParams};
use super::step::{Step, StepType};
use crate::data::Table;
use crate::error::Result;

/// Output of a replay: the transformed table and the steps with resolved parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformedData {
    pub table: Table,
    pub preprocessing_steps: Vec<Step>,
}

/// Replays steps in ascending `order`; ties keep their array position
#[derive(Debug, Clone, Default)]
pub struct PipelineInterpreter;

impl PipelineInterpreter {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(&self, table: Table, steps: &[Step]) -> Result<TransformedData> {
        let start = Instant::now();
        let mut ordered: Vec<&Step> = steps.iter().collect();
        ordered.sort_by_key(|s| s.order);

        let mut table = table;
        let mut applied = Vec::with_capacity(ordered.len());
        for step in ordered {
            let (next, resolved) = self.apply_step(&table, step).map_err(|e| {
                warn!(step_id = %step.id, step = %step.step_type, error = %e, "pipeline step failed");
                e
            })?;
            table = next;
            applied.push(resolved);
        }

        info!(
            steps = applied.len(),
            rows = table.n_rows(),
            columns = table.n_cols(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pipeline replayed"
        );
        Ok(TransformedData {
            table,
            preprocessing_steps: applied,
        })
    }

    /// Run one step on a copy of `table`; the input is never modified
    pub fn apply_step(&self, table: &Table, step: &Step) -> Result<(Table, Step)> {
        let mut work = table.clone();
        let now = Utc::now();
        let resolved = match step.step_type {
            StepType::HandleMissing => {
                let mut p: MissingParams = step.params()?;
                imputer::handle_missing(&mut work, &mut p)?;
                step.resolved(&p, now)?
            }
            StepType::Normalize => {
                let mut p: NormalizeParams = step.params()?;
                scaler::normalize(&mut work, &mut p)?;
                step.resolved(&p, now)?
            }
            StepType::Scale => {
                let mut p: ScaleStepParams = step.params()?;
                scaler::scale(&mut work, &mut p)?;
                step.resolved(&p, now)?
            }
            StepType::EncodeCategorical => {
                let mut p: EncodeParams = step.params()?;
                encoder::encode_categorical(&mut work, &mut p)?;
                step.resolved(&p, now)?
            }
            StepType::Split => {
                let mut p: SplitParams = step.params()?;
                split::split(&mut work, &mut p)?;
                step.resolved(&p, now)?
            }
            StepType::ClipOutliers => {
                let mut p: ClipParams = step.params()?;
                outlier::clip_outliers(&mut work, &mut p)?;
                step.resolved(&p, now)?
            }
            StepType::DropColumns => {
                let p: ColumnsParams = step.params()?;
                columns::drop_columns(&mut work, &p)?;
                step.resolved(&p, now)?
            }
            StepType::ReorderColumns => {
                let p: ColumnsParams = step.params()?;
                columns::reorder_columns(&mut work, &p)?;
                step.resolved(&p, now)?
            }
        };
        debug!(step = %step.step_type, rows = work.n_rows(), columns = work.n_cols(), "step applied");
        Ok((work, resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Cell, Column, Subset};
    use crate::error::WorkbenchError;
    use serde_json::json;

    fn xy_table() -> Table {
        Table::from_rows(
            vec!["x1".into(), "x2".into(), "y".into()],
            vec![
                vec![Cell::Number(1.0), Cell::Number(2.0), Cell::Number(10.0)],
                vec![Cell::Number(2.0), Cell::Number(3.0), Cell::Number(20.0)],
                vec![Cell::Number(3.0), Cell::Number(4.0), Cell::Number(30.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_steps_run_in_order() {
        let steps = vec![
            Step::new(StepType::Normalize, json!({"method": "minmax"})).with_order(2),
            Step::new(StepType::ReorderColumns, json!({"columns": ["x1"]})).with_order(1),
        ];
        let out = PipelineInterpreter::new().apply(xy_table(), &steps).unwrap();
        assert_eq!(out.table.column_names(), vec!["x2", "y", "x1"]);
        assert_eq!(out.preprocessing_steps[0].step_type, StepType::ReorderColumns);
        assert_eq!(out.table.column("x1").unwrap().numbers(), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_replay_is_deterministic_and_reuses_fitted_values() {
        let steps = vec![
            Step::new(StepType::Split, json!({"train": 0.6, "validation": 0.2, "test": 0.2})),
            Step::new(StepType::Normalize, json!({"method": "zscore"})),
        ];
        let interpreter = PipelineInterpreter::new();
        let first = interpreter.apply(xy_table(), &steps).unwrap();
        let second = interpreter.apply(xy_table(), &steps).unwrap();
        assert_eq!(first.table, second.table);

        // resolved steps carry the fitted values and replay to the same table
        let replayed = interpreter.apply(xy_table(), &first.preprocessing_steps).unwrap();
        assert_eq!(replayed.table, first.table);
        assert!(first.preprocessing_steps[1].parameters["fitted"]["x1"]["scale"].is_number());
        assert_eq!(first.preprocessing_steps[0].parameters["seed"], 42);
    }

    #[test]
    fn test_failing_step_aborts_and_names_column() {
        let table = Table::new(vec![
            Column::new("city", vec![Cell::from("a"), Cell::from("b")]),
            Column::numeric("v", vec![1.0, 2.0]),
        ])
        .unwrap();
        let steps = vec![Step::new(
            StepType::Normalize,
            json!({"method": "minmax", "target_columns": ["v", "city"]}),
        )];
        let err = PipelineInterpreter::new().apply(table, &steps).unwrap_err();
        match err {
            WorkbenchError::PipelineStep { step, column, .. } => {
                assert_eq!(step, "normalize");
                assert_eq!(column.as_deref(), Some("city"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_failed_step_leaves_input_untouched() {
        let table = xy_table();
        let step = Step::new(StepType::Normalize, json!({"target_columns": ["x1", "nope"]}));
        assert!(PipelineInterpreter::new().apply_step(&table, &step).is_err());
        assert_eq!(table, xy_table());
    }

    #[test]
    fn test_unknown_strategy_is_step_error() {
        let steps = vec![Step::new(StepType::HandleMissing, json!({"strategy": "guess"}))];
        let err = PipelineInterpreter::new().apply(xy_table(), &steps).unwrap_err();
        assert!(matches!(err, WorkbenchError::PipelineStep { .. }));
    }

    #[test]
    fn test_split_then_drop_keeps_subsets_aligned() {
        let mut rows: Vec<Vec<Cell>> = (0..20).map(|i| vec![Cell::Number(i as f64)]).collect();
        rows[3] = vec![Cell::Missing];
        let table = Table::from_rows(vec!["x".into()], rows).unwrap();
        let steps = vec![
            Step::new(StepType::Split, json!({"train": 0.5, "validation": 0.25, "test": 0.25})).with_order(0),
            Step::new(StepType::HandleMissing, json!({"strategy": "drop"})).with_order(1),
        ];
        let out = PipelineInterpreter::new().apply(table, &steps).unwrap();
        assert_eq!(out.table.n_rows(), 19);
        let subsets = out.table.subsets().unwrap();
        assert_eq!(subsets.len(), 19);
        assert!(subsets.contains(&Subset::Train));
    }
}
