//! Version comparison

use serde::{Deserialize, Serialize};

use super::version::{ModelStatus, ModelVersion};

/// Side-by-side view of several versions with the winning id per criterion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    pub models: Vec<ModelVersion>,
    pub best_accuracy: Option<String>,
    pub best_loss: Option<String>,
    pub fastest_training: Option<String>,
}

/// Pick the best version per metric
///
/// Accuracy candidates are versions that report one. Loss and training time
/// only count for completed versions. The first of equal values wins.
pub fn compare_versions(models: Vec<ModelVersion>) -> ModelComparison {
    let best_accuracy = best_by(&models, |m| m.metrics.accuracy, |a, b| a > b);

    let completed = |m: &ModelVersion| m.status == ModelStatus::Completed;
    let best_loss = best_by(
        &models,
        |m| Some(m.metrics.loss).filter(|l| completed(m) && l.is_finite()),
        |a, b| a < b,
    );
    let fastest_training = best_by(
        &models,
        |m| Some(m.metrics.training_time).filter(|t| completed(m) && t.is_finite()),
        |a, b| a < b,
    );

    ModelComparison {
        models,
        best_accuracy,
        best_loss,
        fastest_training,
    }
}

fn best_by(
    models: &[ModelVersion],
    metric: impl Fn(&ModelVersion) -> Option<f64>,
    better: impl Fn(f64, f64) -> bool,
) -> Option<String> {
    let mut best: Option<(&ModelVersion, f64)> = None;
    for model in models {
        let Some(value) = metric(model).filter(|v| !v.is_nan()) else {
            continue;
        };
        match best {
            Some((_, current)) if !better(value, current) => {}
            _ => best = Some((model, value)),
        }
    }
    best.map(|(m, _)| m.id.clone())
}
