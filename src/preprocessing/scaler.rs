//! Normalization and scaling of numeric columns

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::columns::{ensure_numeric, map_numbers, resolve_targets};
use super::stats;
use crate::data::Table;
use crate::error::Result;

/// Method of the `normalize` step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMethod {
    /// (x - min) / (max - min)
    #[serde(alias = "min_max", alias = "min-max")]
    Minmax,
    /// (x - mean) / population std
    #[serde(alias = "z_score", alias = "z-score")]
    Zscore,
    /// (x - median) / IQR
    Robust,
}

impl Default for NormalizeMethod {
    fn default() -> Self {
        Self::Minmax
    }
}

/// Method of the `scale` step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMethod {
    /// (x - mean) / sample std
    Standard,
    /// x / max(|x|)
    #[serde(alias = "max_abs", alias = "max-abs")]
    Maxabs,
}

impl Default for ScaleMethod {
    fn default() -> Self {
        Self::Standard
    }
}

/// Fitted affine map `(x - center) / scale`; a zero scale maps to 0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleParams {
    pub center: f64,
    pub scale: f64,
}

impl ScaleParams {
    pub fn apply(&self, x: f64) -> f64 {
        if self.scale == 0.0 || !self.scale.is_finite() {
            0.0
        } else {
            (x - self.center) / self.scale
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizeParams {
    #[serde(default)]
    pub method: NormalizeMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fitted: Option<BTreeMap<String, ScaleParams>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScaleStepParams {
    #[serde(default)]
    pub method: ScaleMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fitted: Option<BTreeMap<String, ScaleParams>>,
}

fn fit_normalize(values: &[f64], method: NormalizeMethod) -> ScaleParams {
    match method {
        NormalizeMethod::Minmax => {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if values.is_empty() {
                ScaleParams { center: 0.0, scale: 0.0 }
            } else {
                ScaleParams { center: min, scale: max - min }
            }
        }
        NormalizeMethod::Zscore => ScaleParams {
            center: stats::mean(values).unwrap_or(0.0),
            scale: stats::std_dev(values, 0).unwrap_or(0.0),
        },
        NormalizeMethod::Robust => {
            let sorted = stats::sorted(values);
            let q1 = stats::quantile_sorted(&sorted, 0.25).unwrap_or(0.0);
            let q3 = stats::quantile_sorted(&sorted, 0.75).unwrap_or(0.0);
            ScaleParams {
                center: stats::quantile_sorted(&sorted, 0.5).unwrap_or(0.0),
                scale: q3 - q1,
            }
        }
    }
}

fn fit_scale(values: &[f64], method: ScaleMethod) -> ScaleParams {
    match method {
        ScaleMethod::Standard => ScaleParams {
            center: stats::mean(values).unwrap_or(0.0),
            scale: stats::std_dev(values, 1).unwrap_or(0.0),
        },
        ScaleMethod::Maxabs => ScaleParams {
            center: 0.0,
            scale: values.iter().fold(0.0, |acc: f64, v| acc.max(v.abs())),
        },
    }
}

fn transform(
    table: &mut Table,
    step: &str,
    targets: &[String],
    fitted: Option<BTreeMap<String, ScaleParams>>,
    fit: impl Fn(&[f64]) -> ScaleParams,
) -> Result<BTreeMap<String, ScaleParams>> {
    let mut fitted = fitted.unwrap_or_default();
    for name in targets {
        let values = ensure_numeric(table, step, name)?;
        let params = *fitted.entry(name.clone()).or_insert_with(|| fit(&values));
        map_numbers(table, name, |x| params.apply(x));
    }
    fitted.retain(|k, _| targets.contains(k));
    Ok(fitted)
}

pub(crate) fn normalize(table: &mut Table, params: &mut NormalizeParams) -> Result<()> {
    let targets = resolve_targets(table, "normalize", params.target_columns.as_deref(), Table::numeric_columns)?;
    let method = params.method;
    let fitted = transform(table, "normalize", &targets, params.fitted.take(), |v| {
        fit_normalize(v, method)
    })?;
    params.fitted = Some(fitted);
    params.target_columns = Some(targets);
    Ok(())
}

pub(crate) fn scale(table: &mut Table, params: &mut ScaleStepParams) -> Result<()> {
    let targets = resolve_targets(table, "scale", params.target_columns.as_deref(), Table::numeric_columns)?;
    let method = params.method;
    let fitted = transform(table, "scale", &targets, params.fitted.take(), |v| fit_scale(v, method))?;
    params.fitted = Some(fitted);
    params.target_columns = Some(targets);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Cell, Column};

    fn table() -> Table {
        Table::new(vec![
            Column::numeric("x", vec![1.0, 2.0, 3.0]),
            Column::numeric("k", vec![5.0, 5.0, 5.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_minmax_hits_exact_bounds() {
        let mut t = Table::new(vec![Column::numeric("x", vec![0.3, 0.1, 0.7, 0.9])]).unwrap();
        normalize(&mut t, &mut NormalizeParams::default()).unwrap();
        let v = t.column("x").unwrap().numbers();
        assert_eq!(v[1], 0.0);
        assert_eq!(v[3], 1.0);
    }

    #[test]
    fn test_repeated_target_is_normalized_once() {
        let mut t = table();
        let mut params = NormalizeParams {
            target_columns: Some(vec!["x".into(), "x".into()]),
            ..Default::default()
        };
        normalize(&mut t, &mut params).unwrap();
        assert_eq!(t.column("x").unwrap().numbers(), vec![0.0, 0.5, 1.0]);
        assert_eq!(params.target_columns, Some(vec!["x".to_string()]));
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let mut t = table();
        let mut params = NormalizeParams {
            method: NormalizeMethod::Zscore,
            ..Default::default()
        };
        normalize(&mut t, &mut params).unwrap();
        assert_eq!(t.column("k").unwrap().numbers(), vec![0.0, 0.0, 0.0]);
        let fitted = params.fitted.unwrap();
        assert_eq!(fitted["x"].center, 2.0);
    }

    #[test]
    fn test_robust_uses_median_and_iqr() {
        let mut t = Table::new(vec![Column::numeric("x", vec![1.0, 2.0, 3.0, 4.0, 5.0])]).unwrap();
        let mut params = NormalizeParams {
            method: NormalizeMethod::Robust,
            ..Default::default()
        };
        normalize(&mut t, &mut params).unwrap();
        assert_eq!(t.column("x").unwrap().numbers(), vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_scale_standard_uses_sample_std() {
        let mut t = Table::new(vec![Column::numeric("x", vec![1.0, 3.0])]).unwrap();
        let mut params = ScaleStepParams::default();
        scale(&mut t, &mut params).unwrap();
        let v = t.column("x").unwrap().numbers();
        let s = 2.0_f64.sqrt();
        assert!((v[0] + 1.0 / s).abs() < 1e-12);
        assert!((v[1] - 1.0 / s).abs() < 1e-12);
    }

    #[test]
    fn test_maxabs_keeps_missing() {
        let mut t = Table::new(vec![Column::new(
            "x",
            vec![Cell::Number(-4.0), Cell::Missing, Cell::Number(2.0)],
        )])
        .unwrap();
        let mut params = ScaleStepParams {
            method: ScaleMethod::Maxabs,
            ..Default::default()
        };
        scale(&mut t, &mut params).unwrap();
        let col = t.column("x").unwrap();
        assert_eq!(col.values[0], Cell::Number(-1.0));
        assert!(col.values[1].is_missing());
        assert_eq!(col.values[2], Cell::Number(0.5));
    }
}
