//! Model version records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::{ImageConfig, LabelSelection};
use crate::preprocessing::Step;
use crate::training::{EpochRecord, ModelArtifact, TrainingMetrics};

/// One row of a version's training history
pub type HistoryEntry = EpochRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Training,
    Completed,
    Failed,
    Cancelled,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub loss: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_loss: Option<f64>,
    /// Seconds
    #[serde(default)]
    pub training_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epochs: Option<usize>,
}

impl From<&TrainingMetrics> for ModelMetrics {
    fn from(m: &TrainingMetrics) -> Self {
        Self {
            accuracy: m.final_accuracy,
            loss: if m.final_loss.is_finite() { m.final_loss } else { 0.0 },
            validation_accuracy: m.validation_accuracy,
            validation_loss: m.validation_loss,
            training_time: m.training_time,
            epochs: Some(m.epochs),
        }
    }
}

/// Data-handling settings the version was trained with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfigSnapshot {
    pub test_size: f64,
    pub validation_size: f64,
    pub random_state: u64,
    #[serde(default)]
    pub label_selection: LabelSelection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageConfig>,
}

impl Default for TrainingConfigSnapshot {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            validation_size: 0.1,
            random_state: 42,
            label_selection: LabelSelection::default(),
            image: None,
        }
    }
}

/// An immutable, lineage-tracked trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: String,
    pub name: String,
    /// `v<N>`
    pub version: String,
    pub model_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: ModelStatus,
    #[serde(default)]
    pub metrics: ModelMetrics,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub training_config: TrainingConfigSnapshot,
    #[serde(default)]
    pub preprocessing_steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_data: Option<ModelArtifact>,
    pub dataset_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_model_id: Option<String>,
    #[serde(default)]
    pub is_latest_version: bool,
    #[serde(default)]
    pub training_history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<serde_json::Value>,
}

impl ModelVersion {
    /// Numeric part of `v<N>`
    pub fn version_number(&self) -> Option<u64> {
        parse_version(&self.version)
    }

    pub fn is_terminal(&self) -> bool {
        self.status != ModelStatus::Training
    }
}

pub fn parse_version(version: &str) -> Option<u64> {
    version.strip_prefix('v').and_then(|n| n.parse().ok())
}

/// Partial update sent to the model backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ModelStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ModelMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_data: Option<ModelArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_history: Option<Vec<HistoryEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preprocessing_steps: Option<Vec<Step>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_latest_version: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ModelUpdate {
    pub fn apply(&self, version: &mut ModelVersion) {
        if let Some(status) = self.status {
            version.status = status;
        }
        if let Some(metrics) = &self.metrics {
            version.metrics = metrics.clone();
        }
        if let Some(data) = &self.model_data {
            version.model_data = Some(data.clone());
        }
        if let Some(history) = &self.training_history {
            version.training_history = history.clone();
        }
        if let Some(steps) = &self.preprocessing_steps {
            version.preprocessing_steps = steps.clone();
        }
        if let Some(job) = &self.training_job_id {
            version.training_job_id = Some(job.clone());
        }
        if let Some(latest) = self.is_latest_version {
            version.is_latest_version = latest;
        }
        if let Some(msg) = &self.error_message {
            version.error_message = Some(msg.clone());
        }
        if let Some(details) = &self.error_details {
            version.error_details = Some(details.clone());
        }
        version.updated_at = self.updated_at.unwrap_or_else(Utc::now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample(id: &str, version: &str) -> ModelVersion {
        let now = Utc::now();
        ModelVersion {
            id: id.to_string(),
            name: format!("model {}", id),
            version: version.to_string(),
            model_type: "neural_network".to_string(),
            created_at: now,
            updated_at: now,
            status: ModelStatus::Training,
            metrics: ModelMetrics::default(),
            parameters: serde_json::json!({}),
            training_config: TrainingConfigSnapshot::default(),
            preprocessing_steps: Vec::new(),
            model_data: None,
            dataset_id: "ds".to_string(),
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
    fn test_version_number() {
        assert_eq!(sample("a", "v12").version_number(), Some(12));
        assert_eq!(parse_version("12"), None);
    }

    #[test]
    fn test_update_applies_only_set_fields() {
        let mut m = sample("a", "v1");
        ModelUpdate {
            status: Some(ModelStatus::Failed),
            error_message: Some("boom".into()),
            ..Default::default()
        }
        .apply(&mut m);
        assert_eq!(m.status, ModelStatus::Failed);
        assert_eq!(m.error_message.as_deref(), Some("boom"));
        assert!(m.is_latest_version);
        assert!(m.is_terminal());
    }

    #[test]
    fn test_record_json_round_trip() {
        let m = sample("a", "v3");
        let json = serde_json::to_string(&m).unwrap();
        let back: ModelVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
