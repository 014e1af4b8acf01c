//! Missing value handling

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::columns::{ensure_numeric, resolve_targets};
use super::stats;
use crate::data::{Cell, Table};
use crate::error::Result;

const STEP: &str = "handle_missing";

/// Strategy for missing cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingStrategy {
    /// Remove rows with a missing cell in any target column
    #[serde(alias = "drop_rows", alias = "drop-rows")]
    Drop,
    Mean,
    Median,
    /// Most frequent value; works on text columns too
    #[serde(alias = "most_frequent")]
    Mode,
}

impl Default for MissingStrategy {
    fn default() -> Self {
        Self::Drop
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissingParams {
    #[serde(default)]
    pub strategy: MissingStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_columns: Option<Vec<String>>,
    /// Fitted fill value per column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_values: Option<BTreeMap<String, Cell>>,
}

pub(crate) fn handle_missing(table: &mut Table, params: &mut MissingParams) -> Result<()> {
    let strategy = params.strategy;
    let targets = resolve_targets(table, STEP, params.target_columns.as_deref(), |t| {
        match strategy {
            MissingStrategy::Mean | MissingStrategy::Median => t.numeric_columns(),
            _ => t.column_names(),
        }
    })?;

    if strategy == MissingStrategy::Drop {
        let keep: Vec<bool> = (0..table.n_rows())
            .map(|i| {
                targets.iter().all(|name| {
                    table
                        .column(name)
                        .map(|c| !c.values[i].is_missing())
                        .unwrap_or(true)
                })
            })
            .collect();
        let before = table.n_rows();
        table.retain_rows(&keep);
        debug!(dropped = before - table.n_rows(), "dropped rows with missing values");
        params.target_columns = Some(targets);
        return Ok(());
    }

    let mut fills = match params.fill_values.take() {
        Some(existing) => existing,
        None => fit_fill_values(table, strategy, &targets)?,
    };

    for name in &targets {
        let Some(fill) = fills.get(name) else {
            warn!(column = %name, "no fill value available, column left unchanged");
            continue;
        };
        if let Some(column) = table.column_mut(name) {
            for cell in column.values.iter_mut().filter(|c| c.is_missing()) {
                *cell = fill.clone();
            }
        }
    }

    fills.retain(|k, _| targets.contains(k));
    params.fill_values = Some(fills);
    params.target_columns = Some(targets);
    Ok(())
}

fn fit_fill_values(
    table: &Table,
    strategy: MissingStrategy,
    targets: &[String],
) -> Result<BTreeMap<String, Cell>> {
    let mut fills = BTreeMap::new();
    for name in targets {
        let fill = match strategy {
            MissingStrategy::Mean => stats::mean(&ensure_numeric(table, STEP, name)?).map(Cell::Number),
            MissingStrategy::Median => stats::median(&ensure_numeric(table, STEP, name)?).map(Cell::Number),
            MissingStrategy::Mode => table.column(name).and_then(|c| stats::mode(&c.values)),
            MissingStrategy::Drop => None,
        };
        if let Some(fill) = fill {
            fills.insert(name.clone(), fill);
        }
    }
    Ok(fills)
}
