//! External collaborator interfaces
//!
//! The engine reads datasets and pipelines, reports job progress and persists
//! model versions through these traits. Two implementations ship with the
//! crate: an in-process [`MemoryBackend`] and a JSON-on-disk [`LocalFsBackend`].

mod local_fs;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::preprocessing::Step;
use crate::registry::{ModelMetrics, ModelUpdate, ModelVersion};

pub use local_fs::LocalFsBackend;
pub use memory::MemoryBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DatasetFormat {
    #[default]
    Csv,
    Images,
}

/// Stored image with its class label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub storage_id: String,
    pub label: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_storage_id: Option<String>,
    #[serde(default)]
    pub format: DatasetFormat,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

impl DatasetRecord {
    pub fn csv(id: impl Into<String>, name: impl Into<String>, storage_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            file_storage_id: Some(storage_id.into()),
            format: DatasetFormat::Csv,
            metadata: serde_json::Value::Null,
            images: Vec::new(),
        }
    }

    pub fn images(id: impl Into<String>, name: impl Into<String>, images: Vec<ImageRef>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            file_storage_id: None,
            format: DatasetFormat::Images,
            metadata: serde_json::Value::Null,
            images,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Request to open a training job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJobSpec {
    pub model_id: String,
    pub dataset_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    pub model_type: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Partial job update; unset fields are left as they are
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    /// Percent, 0 to 100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ModelMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Training job as the job store keeps it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub spec: TrainingJobSpec,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ModelMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: String, spec: TrainingJobSpec) -> Self {
        let now = Utc::now();
        Self {
            id,
            spec,
            status: JobStatus::Pending,
            progress: 0.0,
            message: None,
            metrics: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress.clamp(0.0, 100.0);
        }
        if update.message.is_some() {
            self.message = update.message;
        }
        if update.metrics.is_some() {
            self.metrics = update.metrics;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        self.updated_at = Utc::now();
    }
}

#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn get_dataset_by_id(&self, id: &str) -> Result<DatasetRecord>;

    /// Resolve a storage id to something [`fetch_bytes`](Self::fetch_bytes) accepts
    async fn get_download_url(&self, storage_id: &str) -> Result<String>;

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn get_pipeline_by_id(&self, id: &str) -> Result<PipelineRecord>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_training_job(&self, spec: TrainingJobSpec) -> Result<String>;

    async fn update_training_job(&self, id: &str, update: JobUpdate) -> Result<()>;
}

/// Durable home of model versions
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Store a new record, returning the id it is stored under
    async fn create_model(&self, version: &ModelVersion) -> Result<String>;

    async fn update_model(&self, id: &str, update: &ModelUpdate) -> Result<()>;

    async fn delete_model(&self, id: &str) -> Result<()>;

    async fn get_my_models(&self) -> Result<Vec<ModelVersion>>;
}
