//! In-process backend

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    DatasetRecord, DatasetStore, JobRecord, JobStore, JobUpdate, ModelBackend, PipelineRecord,
    PipelineStore, TrainingJobSpec,
};
use crate::error::{Result, WorkbenchError};
use crate::registry::{ModelUpdate, ModelVersion};

const URL_SCHEME: &str = "memory://";

/// All four collaborator traits backed by hash maps
#[derive(Debug, Default)]
pub struct MemoryBackend {
    datasets: RwLock<HashMap<String, DatasetRecord>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    pipelines: RwLock<HashMap<String, PipelineRecord>>,
    jobs: RwLock<HashMap<String, JobRecord>>,
    models: RwLock<HashMap<String, ModelVersion>>,
    reject_model_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_blob(&self, storage_id: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.write().insert(storage_id.into(), bytes);
    }

    pub fn put_dataset(&self, record: DatasetRecord) {
        self.datasets.write().insert(record.id.clone(), record);
    }

    /// Register a CSV dataset and its bytes under `<id>.csv`
    pub fn add_csv_dataset(&self, id: &str, name: &str, csv: &str) -> DatasetRecord {
        let storage_id = format!("{}.csv", id);
        self.put_blob(storage_id.clone(), csv.as_bytes().to_vec());
        let record = DatasetRecord::csv(id, name, storage_id);
        self.put_dataset(record.clone());
        record
    }

    pub fn put_pipeline(&self, record: PipelineRecord) {
        self.pipelines.write().insert(record.id.clone(), record);
    }

    pub fn job(&self, id: &str) -> Option<JobRecord> {
        self.jobs.read().get(id).cloned()
    }

    pub fn model(&self, id: &str) -> Option<ModelVersion> {
        self.models.read().get(id).cloned()
    }

    pub fn model_count(&self) -> usize {
        self.models.read().len()
    }

    /// Make model create/update/delete fail until switched back
    pub fn reject_model_writes(&self, reject: bool) {
        self.reject_model_writes.store(reject, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.reject_model_writes.load(Ordering::SeqCst) {
            return Err(WorkbenchError::Backend("model store is read-only".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DatasetStore for MemoryBackend {
    async fn get_dataset_by_id(&self, id: &str) -> Result<DatasetRecord> {
        self.datasets
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| WorkbenchError::NotFound(format!("dataset {}", id)))
    }

    async fn get_download_url(&self, storage_id: &str) -> Result<String> {
        if !self.blobs.read().contains_key(storage_id) {
            return Err(WorkbenchError::DatasetAccess(format!(
                "no stored file {}",
                storage_id
            )));
        }
        Ok(format!("{}{}", URL_SCHEME, storage_id))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let key = url.strip_prefix(URL_SCHEME).unwrap_or(url);
        self.blobs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| WorkbenchError::DatasetAccess(format!("cannot fetch {}", url)))
    }
}

#[async_trait]
impl PipelineStore for MemoryBackend {
    async fn get_pipeline_by_id(&self, id: &str) -> Result<PipelineRecord> {
        self.pipelines
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| WorkbenchError::NotFound(format!("pipeline {}", id)))
    }
}

#[async_trait]
impl JobStore for MemoryBackend {
    async fn create_training_job(&self, spec: TrainingJobSpec) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.jobs
            .write()
            .insert(id.clone(), JobRecord::new(id.clone(), spec));
        Ok(id)
    }

    async fn update_training_job(&self, id: &str, update: JobUpdate) -> Result<()> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| WorkbenchError::NotFound(format!("job {}", id)))?;
        job.apply(update);
        Ok(())
    }
}

#[async_trait]
impl ModelBackend for MemoryBackend {
    async fn create_model(&self, version: &ModelVersion) -> Result<String> {
        self.check_writable()?;
        self.models
            .write()
            .insert(version.id.clone(), version.clone());
        Ok(version.id.clone())
    }

    async fn update_model(&self, id: &str, update: &ModelUpdate) -> Result<()> {
        self.check_writable()?;
        let mut models = self.models.write();
        let model = models
            .get_mut(id)
            .ok_or_else(|| WorkbenchError::NotFound(format!("model {}", id)))?;
        update.apply(model);
        Ok(())
    }

    async fn delete_model(&self, id: &str) -> Result<()> {
        self.check_writable()?;
        self.models
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| WorkbenchError::NotFound(format!("model {}", id)))
    }

    async fn get_my_models(&self) -> Result<Vec<ModelVersion>> {
        Ok(self.models.read().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dataset_round_trip() {
        let backend = MemoryBackend::new();
        let record = backend.add_csv_dataset("d1", "iris", "a,b\n1,2\n");

        let fetched = backend.get_dataset_by_id("d1").await.unwrap();
        assert_eq!(fetched, record);

        let storage = fetched.file_storage_id.unwrap();
        let url = backend.get_download_url(&storage).await.unwrap();
        assert_eq!(backend.fetch_bytes(&url).await.unwrap(), b"a,b\n1,2\n");
        assert!(backend.get_download_url("missing").await.is_err());
        assert!(matches!(
            backend.get_dataset_by_id("nope").await,
            Err(WorkbenchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_writes() {
        let backend = MemoryBackend::new();
        backend.reject_model_writes(true);
        assert!(matches!(
            backend.delete_model("x").await,
            Err(WorkbenchError::Backend(_))
        ));
        backend.reject_model_writes(false);
        assert!(matches!(
            backend.delete_model("x").await,
            Err(WorkbenchError::NotFound(_))
        ));
    }
}
