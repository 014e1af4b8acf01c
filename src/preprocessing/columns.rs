//! Column selection helpers and the drop/reorder steps

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{Cell, Table};
use crate::error::{Result, WorkbenchError};

/// Parameters of `drop_columns` and `reorder_columns`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnsParams {
    #[serde(default)]
    pub columns: Vec<String>,
}

/// Explicit targets (validated to exist) or the step's default set
pub(crate) fn resolve_targets(
    table: &Table,
    step: &str,
    explicit: Option<&[String]>,
    default: impl FnOnce(&Table) -> Vec<String>,
) -> Result<Vec<String>> {
    match explicit {
        Some(cols) => {
            let mut targets: Vec<String> = Vec::with_capacity(cols.len());
            for name in cols {
                if table.column(name).is_none() {
                    return Err(WorkbenchError::pipeline_step(step, Some(name), "unknown column"));
                }
                // Listed twice still means transformed once
                if !targets.contains(name) {
                    targets.push(name.clone());
                }
            }
            Ok(targets)
        }
        None => Ok(default(table)),
    }
}

/// Fail unless every non-missing cell of `name` is a number
pub(crate) fn ensure_numeric(table: &Table, step: &str, name: &str) -> Result<Vec<f64>> {
    let column = table
        .column(name)
        .ok_or_else(|| WorkbenchError::pipeline_step(step, Some(name), "unknown column"))?;
    if column.values.iter().any(|c| matches!(c, Cell::Text(_))) {
        return Err(WorkbenchError::pipeline_step(step, Some(name), "column is not numeric"));
    }
    Ok(column.numbers())
}

/// Apply `f` to every non-missing numeric cell of `name`
pub(crate) fn map_numbers(table: &mut Table, name: &str, f: impl Fn(f64) -> f64) {
    if let Some(column) = table.column_mut(name) {
        for cell in &mut column.values {
            if let Some(v) = cell.as_number() {
                *cell = Cell::Number(f(v));
            }
        }
    }
}

pub(crate) fn drop_columns(table: &mut Table, params: &ColumnsParams) -> Result<()> {
    let targets = resolve_targets(table, "drop_columns", Some(&params.columns), |_| Vec::new())?;
    for name in &targets {
        table.remove_column(name);
    }
    debug!(dropped = targets.len(), "dropped columns");
    Ok(())
}

/// Unlisted columns keep their relative order and come first
pub(crate) fn reorder_columns(table: &mut Table, params: &ColumnsParams) -> Result<()> {
    let listed = resolve_targets(table, "reorder_columns", Some(&params.columns), |_| Vec::new())?;
    let mut order: Vec<String> = table
        .column_names()
        .into_iter()
        .filter(|n| !listed.contains(n))
        .collect();
    for name in listed {
        if !order.contains(&name) {
            order.push(name);
        }
    }
    table
        .reorder(&order)
        .map_err(|e| WorkbenchError::pipeline_step("reorder_columns", None, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;

    fn table() -> Table {
        Table::new(vec![
            Column::numeric("y", vec![1.0, 2.0]),
            Column::numeric("a", vec![3.0, 4.0]),
            Column::new("c", vec![Cell::from("x"), Cell::Missing]),
        ])
        .unwrap()
    }

    #[test]
    fn test_reorder_moves_listed_to_end() {
        let mut t = table();
        reorder_columns(&mut t, &ColumnsParams { columns: vec!["y".into()] }).unwrap();
        assert_eq!(t.column_names(), vec!["a", "c", "y"]);
    }

    #[test]
    fn test_drop_unknown_column_fails() {
        let mut t = table();
        let err = drop_columns(&mut t, &ColumnsParams { columns: vec!["zzz".into()] }).unwrap_err();
        assert!(matches!(err, WorkbenchError::PipelineStep { column: Some(ref c), .. } if c == "zzz"));
    }

    #[test]
    fn test_ensure_numeric_rejects_text() {
        let t = table();
        assert!(ensure_numeric(&t, "normalize", "c").is_err());
        assert_eq!(ensure_numeric(&t, "normalize", "a").unwrap(), vec![3.0, 4.0]);
    }
}
