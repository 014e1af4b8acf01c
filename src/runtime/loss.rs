//! Loss functions evaluated on raw network outputs (logits)

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

const EPS: f64 = 1e-7;

/// Training objective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    /// Regression, single linear output
    MeanSquaredError,
    /// Binary classification, single logit with sigmoid
    BinaryCrossentropy,
    /// Multi-class classification over sparse integer labels, softmax
    CategoricalCrossentropy,
}

impl Default for Loss {
    fn default() -> Self {
        Self::MeanSquaredError
    }
}

impl Loss {
    pub fn is_classification(&self) -> bool {
        !matches!(self, Loss::MeanSquaredError)
    }

    /// Width of the output layer for this loss
    pub fn output_units(&self, n_classes: usize) -> usize {
        match self {
            Loss::CategoricalCrossentropy => n_classes.max(2),
            _ => 1,
        }
    }

    /// Loss value and gradient with respect to the logits
    pub fn evaluate(&self, logits: &Array2<f64>, targets: &Array1<f64>) -> (f64, Array2<f64>) {
        let n = logits.nrows().max(1) as f64;
        match self {
            Loss::MeanSquaredError => {
                let pred = logits.column(0);
                let diff = &pred - targets;
                let value = diff.mapv(|d| d * d).sum() / n;
                let grad = (diff * (2.0 / n)).insert_axis(Axis(1));
                (value, grad)
            }
            Loss::BinaryCrossentropy => {
                let probs = self.activate(logits);
                let p = probs.column(0);
                let value = p
                    .iter()
                    .zip(targets.iter())
                    .map(|(&p, &y)| {
                        let p = p.clamp(EPS, 1.0 - EPS);
                        -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
                    })
                    .sum::<f64>()
                    / n;
                let grad = ((&p - targets) / n).insert_axis(Axis(1));
                (value, grad)
            }
            Loss::CategoricalCrossentropy => {
                let mut grad = self.activate(logits);
                let mut value = 0.0;
                for (mut row, &y) in grad.rows_mut().into_iter().zip(targets.iter()) {
                    let class = y as usize;
                    if class < row.len() {
                        value -= row[class].max(EPS).ln();
                        row[class] -= 1.0;
                    }
                }
                grad.mapv_inplace(|g| g / n);
                (value / n, grad)
            }
        }
    }

    /// Map logits to predictions (identity, sigmoid or softmax)
    pub fn activate(&self, logits: &Array2<f64>) -> Array2<f64> {
        match self {
            Loss::MeanSquaredError => logits.clone(),
            Loss::BinaryCrossentropy => logits.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Loss::CategoricalCrossentropy => {
                let mut result = logits.clone();
                for mut row in result.rows_mut() {
                    let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    let exp_sum: f64 = row.iter().map(|&v| (v - max).exp()).sum();
                    for v in row.iter_mut() {
                        *v = (*v - max).exp() / exp_sum;
                    }
                }
                result
            }
        }
    }

    /// Fraction of correct predictions; None for regression
    pub fn accuracy(&self, logits: &Array2<f64>, targets: &Array1<f64>) -> Option<f64> {
        if targets.is_empty() {
            return None;
        }
        let predicted: Vec<f64> = match self {
            Loss::MeanSquaredError => return None,
            Loss::BinaryCrossentropy => logits
                .column(0)
                .iter()
                .map(|&z| if z >= 0.0 { 1.0 } else { 0.0 })
                .collect(),
            Loss::CategoricalCrossentropy => logits
                .rows()
                .into_iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .fold((0usize, f64::NEG_INFINITY), |best, (i, &v)| {
                            if v > best.1 {
                                (i, v)
                            } else {
                                best
                            }
                        })
                        .0 as f64
                })
                .collect(),
        };
        let correct = predicted
            .iter()
            .zip(targets.iter())
            .filter(|(p, t)| (**p - **t).abs() < 0.5)
            .count();
        Some(correct as f64 / targets.len() as f64)
    }
}
