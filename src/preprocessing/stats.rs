//! Descriptive statistics over non-missing values

use crate::data::Cell;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Standard deviation with `ddof` delta degrees of freedom (0 = population, 1 = sample)
pub fn std_dev(values: &[f64], ddof: usize) -> Option<f64> {
    let m = mean(values)?;
    if values.len() <= ddof {
        return Some(0.0);
    }
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (values.len() - ddof) as f64).sqrt())
}

pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Quantile `q` in `[0, 1]` of already sorted values, linear interpolation
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile_sorted(&sorted(values), 0.5)
}

/// Most frequent non-missing cell; ties go to the first value seen
pub fn mode(cells: &[Cell]) -> Option<Cell> {
    let mut counts: Vec<(String, &Cell, usize)> = Vec::new();
    for cell in cells {
        let Some(key) = cell.category_key() else {
            continue;
        };
        match counts.iter_mut().find(|(k, _, _)| *k == key) {
            Some(entry) => entry.2 += 1,
            None => counts.push((key, cell, 1)),
        }
    }
    let mut best: Option<(&Cell, usize)> = None;
    for (_, cell, count) in counts {
        if best.map(|(_, c)| count > c).unwrap_or(true) {
            best = Some((cell, count));
        }
    }
    best.map(|(cell, _)| cell.clone())
}
