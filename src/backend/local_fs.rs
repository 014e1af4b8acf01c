//! JSON-file backend under a data directory
//!
//! Layout:
//!
//! ```text
//! <root>/datasets/<id>.json   dataset records
//! <root>/files/<storage id>   dataset bytes
//! <root>/pipelines/<id>.json
//! <root>/jobs/<id>.json
//! <root>/models/<id>.json
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    DatasetRecord, DatasetStore, JobRecord, JobStore, JobUpdate, ModelBackend, PipelineRecord,
    PipelineStore, TrainingJobSpec,
};
use crate::error::{Result, WorkbenchError};
use crate::registry::{ModelUpdate, ModelVersion};

const URL_SCHEME: &str = "file://";

pub struct LocalFsBackend {
    root: PathBuf,
    // Serializes read-modify-write of job and model files
    write_lock: Mutex<()>,
}

impl LocalFsBackend {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in ["datasets", "files", "pipelines", "jobs", "models"] {
            fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, kind: &str, id: &str) -> Result<PathBuf> {
        Ok(self.root.join(kind).join(format!("{}.json", safe_name(id)?)))
    }

    fn file_path(&self, storage_id: &str) -> Result<PathBuf> {
        Ok(self.root.join("files").join(safe_name(storage_id)?))
    }

    /// Copy a CSV file into the store and register it as a dataset
    pub async fn import_csv(&self, path: &Path, name: Option<&str>) -> Result<DatasetRecord> {
        let bytes = fs::read(path).await.map_err(|e| {
            WorkbenchError::DatasetAccess(format!("cannot read {}: {}", path.display(), e))
        })?;
        let id = Uuid::new_v4().to_string();
        let storage_id = format!("{}.csv", id);
        write_atomic(&self.file_path(&storage_id)?, &bytes).await?;

        let name = name
            .map(str::to_string)
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| id.clone());
        let record = DatasetRecord::csv(id, name, storage_id);
        self.save_dataset(&record).await?;
        Ok(record)
    }

    pub async fn save_dataset(&self, record: &DatasetRecord) -> Result<()> {
        write_json(&self.record_path("datasets", &record.id)?, record).await
    }

    pub async fn save_pipeline(&self, record: &PipelineRecord) -> Result<()> {
        write_json(&self.record_path("pipelines", &record.id)?, record).await
    }

    pub async fn job(&self, id: &str) -> Result<JobRecord> {
        read_json(&self.record_path("jobs", id)?, "job", id).await
    }
}

fn safe_name(id: &str) -> Result<&str> {
    if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
        return Err(WorkbenchError::InvalidParameter {
            name: "id".to_string(),
            value: id.to_string(),
            reason: "not usable as a file name".to_string(),
        });
    }
    Ok(id)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json).await
}

async fn read_json<T: DeserializeOwned>(path: &Path, kind: &str, id: &str) -> Result<T> {
    match fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(WorkbenchError::NotFound(format!("{} {}", kind, id)))
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl DatasetStore for LocalFsBackend {
    async fn get_dataset_by_id(&self, id: &str) -> Result<DatasetRecord> {
        read_json(&self.record_path("datasets", id)?, "dataset", id).await
    }

    async fn get_download_url(&self, storage_id: &str) -> Result<String> {
        let path = self.file_path(storage_id)?;
        if fs::metadata(&path).await.is_err() {
            return Err(WorkbenchError::DatasetAccess(format!(
                "no stored file {}",
                storage_id
            )));
        }
        Ok(format!("{}{}", URL_SCHEME, path.display()))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let path = url.strip_prefix(URL_SCHEME).ok_or_else(|| {
            WorkbenchError::DatasetAccess(format!("unsupported url {}", url))
        })?;
        debug!(path, "Reading dataset file");
        fs::read(path)
            .await
            .map_err(|e| WorkbenchError::DatasetAccess(format!("cannot fetch {}: {}", url, e)))
    }
}

#[async_trait]
impl PipelineStore for LocalFsBackend {
    async fn get_pipeline_by_id(&self, id: &str) -> Result<PipelineRecord> {
        read_json(&self.record_path("pipelines", id)?, "pipeline", id).await
    }
}

#[async_trait]
impl JobStore for LocalFsBackend {
    async fn create_training_job(&self, spec: TrainingJobSpec) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let record = JobRecord::new(id.clone(), spec);
        write_json(&self.record_path("jobs", &id)?, &record).await?;
        Ok(id)
    }

    async fn update_training_job(&self, id: &str, update: JobUpdate) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.record_path("jobs", id)?;
        let mut job: JobRecord = read_json(&path, "job", id).await?;
        job.apply(update);
        write_json(&path, &job).await
    }
}

#[async_trait]
impl ModelBackend for LocalFsBackend {
    async fn create_model(&self, version: &ModelVersion) -> Result<String> {
        write_json(&self.record_path("models", &version.id)?, version).await?;
        Ok(version.id.clone())
    }

    async fn update_model(&self, id: &str, update: &ModelUpdate) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.record_path("models", id)?;
        let mut model: ModelVersion = read_json(&path, "model", id).await?;
        update.apply(&mut model);
        write_json(&path, &model).await
    }

    async fn delete_model(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.record_path("models", id)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(WorkbenchError::NotFound(format!("model {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_my_models(&self) -> Result<Vec<ModelVersion>> {
        let mut models = Vec::new();
        let mut entries = fs::read_dir(self.root.join("models")).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            match serde_json::from_slice::<ModelVersion>(&bytes) {
                Ok(model) => models.push(model),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable model record"),
            }
        }
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_import_and_fetch_csv() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("houses.csv");
        std::fs::write(&csv, "rooms,price\n3,100\n4,150\n").unwrap();

        let backend = LocalFsBackend::open(dir.path().join("store")).await.unwrap();
        let record = backend.import_csv(&csv, None).await.unwrap();
        assert_eq!(record.name, "houses");

        let loaded = backend.get_dataset_by_id(&record.id).await.unwrap();
        let url = backend
            .get_download_url(loaded.file_storage_id.as_deref().unwrap())
            .await
            .unwrap();
        let bytes = backend.fetch_bytes(&url).await.unwrap();
        assert_eq!(bytes, b"rooms,price\n3,100\n4,150\n");
    }

    #[tokio::test]
    async fn test_job_updates_persist() {
        let dir = TempDir::new().unwrap();
        let backend = LocalFsBackend::open(dir.path()).await.unwrap();
        let id = backend
            .create_training_job(TrainingJobSpec {
                model_id: "m".into(),
                dataset_id: "d".into(),
                pipeline_id: None,
                model_type: "linear_regression".into(),
                parameters: serde_json::Value::Null,
            })
            .await
            .unwrap();
        backend
            .update_training_job(
                &id,
                JobUpdate {
                    progress: Some(55.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(backend.job(&id).await.unwrap().progress, 55.0);
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let backend = LocalFsBackend::open(dir.path()).await.unwrap();
        assert!(backend.get_dataset_by_id("../etc").await.is_err());
        assert!(matches!(
            backend.delete_model("missing").await,
            Err(WorkbenchError::NotFound(_))
        ));
        let update = ModelUpdate {
            status: Some(ModelStatus::Failed),
            ..Default::default()
        };
        assert!(backend.update_model("missing", &update).await.is_err());
        assert!(backend.get_my_models().await.unwrap().is_empty());
    }
}
