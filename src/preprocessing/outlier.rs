//! Outlier clipping

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::columns::{ensure_numeric, map_numbers, resolve_targets};
use super::stats;
use crate::data::Table;
use crate::error::{Result, WorkbenchError};

const STEP: &str = "clip_outliers";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipMethod {
    /// `[Q1 - k*IQR, Q3 + k*IQR]`
    Iqr,
    /// Percentile bounds, linear interpolation
    Percentile,
}

impl Default for ClipMethod {
    fn default() -> Self {
        Self::Iqr
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipBounds {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipParams {
    #[serde(default)]
    pub method: ClipMethod,
    #[serde(default = "default_lower")]
    pub lower_percentile: f64,
    #[serde(default = "default_upper")]
    pub upper_percentile: f64,
    #[serde(default = "default_multiplier")]
    pub iqr_multiplier: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BTreeMap<String, ClipBounds>>,
}

fn default_lower() -> f64 {
    1.0
}

fn default_upper() -> f64 {
    99.0
}

fn default_multiplier() -> f64 {
    1.5
}

impl Default for ClipParams {
    fn default() -> Self {
        Self {
            method: ClipMethod::default(),
            lower_percentile: default_lower(),
            upper_percentile: default_upper(),
            iqr_multiplier: default_multiplier(),
            target_columns: None,
            bounds: None,
        }
    }
}

impl ClipParams {
    fn validate(&self) -> Result<()> {
        let ok = (0.0..=100.0).contains(&self.lower_percentile)
            && (0.0..=100.0).contains(&self.upper_percentile)
            && self.lower_percentile <= self.upper_percentile;
        if !ok {
            return Err(WorkbenchError::pipeline_step(
                STEP,
                None,
                format!(
                    "percentiles must satisfy 0 <= lower <= upper <= 100, got {} and {}",
                    self.lower_percentile, self.upper_percentile
                ),
            ));
        }
        if self.iqr_multiplier < 0.0 {
            return Err(WorkbenchError::pipeline_step(STEP, None, "iqr_multiplier must be non-negative"));
        }
        Ok(())
    }

    fn fit(&self, values: &[f64]) -> Option<ClipBounds> {
        let sorted = stats::sorted(values);
        match self.method {
            ClipMethod::Iqr => {
                let q1 = stats::quantile_sorted(&sorted, 0.25)?;
                let q3 = stats::quantile_sorted(&sorted, 0.75)?;
                let spread = self.iqr_multiplier * (q3 - q1);
                Some(ClipBounds {
                    lower: q1 - spread,
                    upper: q3 + spread,
                })
            }
            ClipMethod::Percentile => Some(ClipBounds {
                lower: stats::quantile_sorted(&sorted, self.lower_percentile / 100.0)?,
                upper: stats::quantile_sorted(&sorted, self.upper_percentile / 100.0)?,
            }),
        }
    }
}

pub(crate) fn clip_outliers(table: &mut Table, params: &mut ClipParams) -> Result<()> {
    params.validate()?;
    let targets = resolve_targets(table, STEP, params.target_columns.as_deref(), Table::numeric_columns)?;

    let mut bounds = params.bounds.take().unwrap_or_default();
    for name in &targets {
        let values = ensure_numeric(table, STEP, name)?;
        if !bounds.contains_key(name) {
            match params.fit(&values) {
                Some(b) => {
                    bounds.insert(name.clone(), b);
                }
                None => continue,
            }
        }
        let b = bounds[name];
        map_numbers(table, name, |x| x.clamp(b.lower, b.upper));
    }

    bounds.retain(|k, _| targets.contains(k));
    params.bounds = Some(bounds);
    params.target_columns = Some(targets);
    Ok(())
}
