//! Registry statistics

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::version::{ModelStatus, ModelVersion};

/// Aggregate view over the cached versions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStatistics {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_status: BTreeMap<ModelStatus, usize>,
    pub completed: usize,
    /// Means over completed versions; zero when none completed
    pub average_accuracy: f64,
    pub average_loss: f64,
    pub average_training_time: f64,
}

impl ModelStatistics {
    pub fn from_versions<'a>(versions: impl IntoIterator<Item = &'a ModelVersion>) -> Self {
        let mut stats = Self::default();
        let mut accuracies = Vec::new();
        let mut losses = Vec::new();
        let mut times = Vec::new();

        for v in versions {
            stats.total += 1;
            *stats.by_type.entry(v.model_type.clone()).or_insert(0) += 1;
            *stats.by_status.entry(v.status).or_insert(0) += 1;
            if v.status != ModelStatus::Completed {
                continue;
            }
            stats.completed += 1;
            if let Some(acc) = v.metrics.accuracy {
                accuracies.push(acc);
            }
            losses.push(v.metrics.loss);
            times.push(v.metrics.training_time);
        }

        stats.average_accuracy = mean_or_zero(&accuracies);
        stats.average_loss = mean_or_zero(&losses);
        stats.average_training_time = mean_or_zero(&times);
        stats
    }
}

fn mean_or_zero(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        0.0
    } else {
        finite.iter().sum::<f64>() / finite.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::version::{ModelMetrics, TrainingConfigSnapshot};
    use chrono::Utc;

    fn version(model_type: &str, status: ModelStatus, accuracy: Option<f64>, loss: f64) -> ModelVersion {
        let now = Utc::now();
        ModelVersion {
            id: uuid::Uuid::new_v4().to_string(),
            name: "m".to_string(),
            version: "v1".to_string(),
            model_type: model_type.to_string(),
            created_at: now,
            updated_at: now,
            status,
            metrics: ModelMetrics {
                accuracy,
                loss,
                training_time: 2.0,
                ..Default::default()
            },
            parameters: serde_json::Value::Null,
            training_config: TrainingConfigSnapshot::default(),
            preprocessing_steps: Vec::new(),
            model_data: None,
            dataset_id: "d".to_string(),
            pipeline_id: None,
            training_job_id: None,
            parent_model_id: None,
            is_latest_version: true,
            training_history: Vec::new(),
            error_message: None,
            error_details: None,
        }
    }

    #[test]
    fn test_zeroed_without_completed() {
        let models = vec![version("cnn", ModelStatus::Failed, Some(0.9), 1.0)];
        let stats = ModelStatistics::from_versions(&models);
        assert_eq!(stats.total, 1);
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.average_accuracy, 0.0);
        assert_eq!(stats.average_loss, 0.0);
        assert_eq!(stats.by_status[&ModelStatus::Failed], 1);
    }

    #[test]
    fn test_means_over_completed() {
        let models = vec![
            version("neural_network", ModelStatus::Completed, Some(0.8), 0.2),
            version("neural_network", ModelStatus::Completed, Some(0.6), 0.4),
            version("linear_regression", ModelStatus::Completed, None, 0.6),
            version("neural_network", ModelStatus::Training, None, 0.0),
        ];
        let stats = ModelStatistics::from_versions(&models);
        assert_eq!(stats.by_type["neural_network"], 3);
        assert_eq!(stats.completed, 3);
        assert!((stats.average_accuracy - 0.7).abs() < 1e-12);
        assert!((stats.average_loss - 0.4).abs() < 1e-12);
        assert_eq!(stats.average_training_time, 2.0);
    }
}
