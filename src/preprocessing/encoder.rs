//! Categorical encoding

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::columns::{ensure_numeric, resolve_targets};
use crate::data::{Cell, Column, Table};
use crate::error::{Result, WorkbenchError};

const STEP: &str = "encode_categorical";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeMethod {
    /// One 0/1 column per category, named `<col>_<value>`
    #[serde(alias = "one_hot", alias = "one-hot")]
    Onehot,
    /// Integer code by first appearance
    Label,
    /// Mean of the target column per category
    Target,
}

impl Default for EncodeMethod {
    fn default() -> Self {
        Self::Onehot
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncodeParams {
    #[serde(default)]
    pub method: EncodeMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_columns: Option<Vec<String>>,
    /// Numeric column supplying means for target encoding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
    /// Categories per column, in first-seen order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<BTreeMap<String, Vec<String>>>,
    /// Category means per column for target encoding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_means: Option<BTreeMap<String, BTreeMap<String, f64>>>,
    /// Value used for categories without a fitted mean
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_mean: Option<f64>,
}

fn distinct_in_order(column: &Column) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for key in column.values.iter().filter_map(Cell::category_key) {
        if !seen.contains(&key) {
            seen.push(key);
        }
    }
    seen
}

pub(crate) fn encode_categorical(table: &mut Table, params: &mut EncodeParams) -> Result<()> {
    let target_column = params.target_column.clone();
    let targets = resolve_targets(table, STEP, params.target_columns.as_deref(), |t| {
        t.text_columns()
            .into_iter()
            .filter(|c| Some(c) != target_column.as_ref())
            .collect()
    })?;

    let mut categories = params.categories.take().unwrap_or_default();
    for name in &targets {
        if !categories.contains_key(name) {
            if let Some(column) = table.column(name) {
                categories.insert(name.clone(), distinct_in_order(column));
            }
        }
    }

    match params.method {
        EncodeMethod::Onehot => {
            for name in &targets {
                onehot(table, name, &categories[name])?;
            }
        }
        EncodeMethod::Label => {
            for name in &targets {
                let cats = &categories[name];
                if let Some(column) = table.column_mut(name) {
                    for cell in &mut column.values {
                        *cell = match cell.category_key() {
                            Some(key) => cats
                                .iter()
                                .position(|c| *c == key)
                                .map(|i| Cell::Number(i as f64))
                                .unwrap_or(Cell::Missing),
                            None => Cell::Missing,
                        };
                    }
                }
            }
        }
        EncodeMethod::Target => target_encode(table, params, &targets)?,
    }

    categories.retain(|k, _| targets.contains(k));
    params.categories = Some(categories);
    params.target_columns = Some(targets);
    Ok(())
}

fn onehot(table: &mut Table, name: &str, cats: &[String]) -> Result<()> {
    let index = table
        .column_index(name)
        .ok_or_else(|| WorkbenchError::pipeline_step(STEP, Some(name), "unknown column"))?;
    let source = &table.columns()[index];
    let replacement: Vec<Column> = cats
        .iter()
        .map(|cat| {
            let values = source
                .values
                .iter()
                .map(|cell| {
                    let hit = cell.category_key().as_deref() == Some(cat.as_str());
                    Cell::Number(if hit { 1.0 } else { 0.0 })
                })
                .collect();
            Column::new(format!("{}_{}", name, cat), values)
        })
        .collect();
    debug!(column = %name, categories = cats.len(), "one-hot encoded");
    table
        .splice_column(index, replacement)
        .map_err(|e| WorkbenchError::pipeline_step(STEP, Some(name), e.to_string()))
}

/// Category means are fitted on train rows when a split exists
fn target_encode(table: &mut Table, params: &mut EncodeParams, targets: &[String]) -> Result<()> {
    let target_name = params.target_column.clone().ok_or_else(|| {
        WorkbenchError::pipeline_step(STEP, None, "target encoding requires 'target_column'")
    })?;
    if targets.contains(&target_name) {
        return Err(WorkbenchError::pipeline_step(
            STEP,
            Some(&target_name),
            "target column cannot encode itself",
        ));
    }
    if table.column(&target_name).is_none() {
        return Err(WorkbenchError::pipeline_step(STEP, Some(&target_name), "unknown column"));
    }
    ensure_numeric(table, STEP, &target_name)?;
    let y: Vec<Option<f64>> = table
        .column(&target_name)
        .map(|c| c.values.iter().map(Cell::as_number).collect())
        .unwrap_or_default();

    let fallback = match params.fallback_mean {
        Some(v) => v,
        None => {
            let train: Vec<f64> = y
                .iter()
                .enumerate()
                .filter(|(i, _)| table.is_train_row(*i))
                .filter_map(|(_, v)| *v)
                .collect();
            super::stats::mean(&train).unwrap_or(0.0)
        }
    };

    let mut means = params.target_means.take().unwrap_or_default();
    for name in targets {
        let Some(column) = table.column(name) else { continue };
        if !means.contains_key(name) {
            let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
            for (i, cell) in column.values.iter().enumerate() {
                if !table.is_train_row(i) {
                    continue;
                }
                if let (Some(key), Some(v)) = (cell.category_key(), y[i]) {
                    let entry = sums.entry(key).or_insert((0.0, 0));
                    entry.0 += v;
                    entry.1 += 1;
                }
            }
            let fitted = sums
                .into_iter()
                .map(|(k, (sum, n))| (k, sum / n as f64))
                .collect();
            means.insert(name.clone(), fitted);
        }

        let column_means = &means[name];
        let encoded: Vec<Cell> = column
            .values
            .iter()
            .map(|cell| {
                let v = cell
                    .category_key()
                    .and_then(|k| column_means.get(&k).copied())
                    .unwrap_or(fallback);
                Cell::Number(v)
            })
            .collect();
        if let Some(column) = table.column_mut(name) {
            column.values = encoded;
        }
    }

    means.retain(|k, _| targets.contains(k));
    params.target_means = Some(means);
    params.fallback_mean = Some(fallback);
    Ok(())
}
