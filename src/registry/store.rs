//! Model version store
//!
//! A read-through cache in front of a [`ModelBackend`]. The backend is the
//! durability authority; the cache is replaced wholesale on [`sync`].
//!
//! [`sync`]: ModelVersionStore::sync

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::compare::{compare_versions, ModelComparison};
use super::stats::ModelStatistics;
use super::version::{
    HistoryEntry, ModelMetrics, ModelStatus, ModelUpdate, ModelVersion, TrainingConfigSnapshot,
};
use crate::backend::ModelBackend;
use crate::error::{Result, WorkbenchError};
use crate::preprocessing::Step;
use crate::training::ModelArtifact;

/// Fields of a version that the caller chooses
#[derive(Debug, Clone)]
pub struct NewModel {
    pub name: String,
    pub model_type: String,
    pub parameters: serde_json::Value,
    pub training_config: TrainingConfigSnapshot,
    pub dataset_id: String,
    pub pipeline_id: Option<String>,
}

/// How a training run ended
#[derive(Debug, Clone)]
pub enum Finalization {
    Completed {
        metrics: ModelMetrics,
        artifact: ModelArtifact,
        history: Vec<HistoryEntry>,
        preprocessing_steps: Vec<Step>,
    },
    Cancelled {
        metrics: ModelMetrics,
        history: Vec<HistoryEntry>,
    },
    Failed {
        message: String,
        details: serde_json::Value,
        history: Vec<HistoryEntry>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// The full version record
    Json,
    /// Model data only
    Artifact,
}

impl std::str::FromStr for ExportFormat {
    type Err = WorkbenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "artifact" | "model" => Ok(Self::Artifact),
            other => Err(WorkbenchError::InvalidParameter {
                name: "format".to_string(),
                value: other.to_string(),
                reason: "expected json or artifact".to_string(),
            }),
        }
    }
}

pub struct ModelVersionStore {
    backend: Arc<dyn ModelBackend>,
    cache: RwLock<HashMap<String, ModelVersion>>,
    last_version: AtomicU64,
}

impl ModelVersionStore {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            cache: RwLock::new(HashMap::new()),
            last_version: AtomicU64::new(0),
        }
    }

    fn next_version(&self) -> String {
        format!("v{}", self.last_version.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn bump_past(&self, seen: u64) {
        self.last_version.fetch_max(seen, Ordering::SeqCst);
    }

    /// Write the shell record of a new training run
    pub async fn create(&self, new: NewModel) -> Result<ModelVersion> {
        let now = Utc::now();
        let version = ModelVersion {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            version: self.next_version(),
            model_type: new.model_type,
            created_at: now,
            updated_at: now,
            status: ModelStatus::Training,
            metrics: ModelMetrics::default(),
            parameters: new.parameters,
            training_config: new.training_config,
            preprocessing_steps: Vec::new(),
            model_data: None,
            dataset_id: new.dataset_id,
            pipeline_id: new.pipeline_id,
            training_job_id: None,
            parent_model_id: None,
            is_latest_version: true,
            training_history: Vec::new(),
            error_message: None,
            error_details: None,
        };
        self.insert_new(version).await
    }

    /// New training-status version derived from `id`
    pub async fn clone_model(
        &self,
        id: &str,
        new_name: &str,
        new_parameters: Option<serde_json::Value>,
    ) -> Result<ModelVersion> {
        let source = self.get(id)?;
        let now = Utc::now();
        let version = ModelVersion {
            id: Uuid::new_v4().to_string(),
            name: new_name.to_string(),
            version: self.next_version(),
            created_at: now,
            updated_at: now,
            status: ModelStatus::Training,
            metrics: ModelMetrics::default(),
            parameters: new_parameters.unwrap_or_else(|| source.parameters.clone()),
            training_job_id: None,
            parent_model_id: Some(source.id.clone()),
            is_latest_version: false,
            training_history: Vec::new(),
            error_message: None,
            error_details: None,
            ..source
        };
        info!(source = %id, clone = %version.id, version = %version.version, "Cloning model");
        self.insert_new(version).await
    }

    async fn insert_new(&self, mut version: ModelVersion) -> Result<ModelVersion> {
        let stored_id = self.backend.create_model(&version).await?;
        version.id = stored_id;
        self.cache.write().insert(version.id.clone(), version.clone());
        Ok(version)
    }

    /// Record the training job driving `id`
    pub async fn attach_job(&self, id: &str, job_id: &str) -> Result<()> {
        let update = ModelUpdate {
            training_job_id: Some(job_id.to_string()),
            ..Default::default()
        };
        self.backend.update_model(id, &update).await?;
        self.apply_cached(id, &update);
        Ok(())
    }

    /// Append an epoch to the cached history; persisted on finalize
    pub fn record_epoch(&self, id: &str, entry: HistoryEntry) {
        if let Some(version) = self.cache.write().get_mut(id) {
            version.training_history.push(entry);
            version.updated_at = Utc::now();
        }
    }

    /// Write the terminal state of a run
    ///
    /// On a backend failure the error carries the version as it would have
    /// been stored, so trained metrics still reach the caller.
    pub async fn finalize(&self, id: &str, outcome: Finalization) -> Result<ModelVersion> {
        let mut current = self.get(id)?;
        let was_latest = current.is_latest_version;
        let completed = matches!(outcome, Finalization::Completed { .. });
        let update = match outcome {
            Finalization::Completed {
                metrics,
                artifact,
                history,
                preprocessing_steps,
            } => ModelUpdate {
                status: Some(ModelStatus::Completed),
                metrics: Some(metrics),
                model_data: Some(artifact),
                training_history: Some(history),
                preprocessing_steps: Some(preprocessing_steps),
                is_latest_version: Some(true),
                ..Default::default()
            },
            Finalization::Cancelled { metrics, history } => ModelUpdate {
                status: Some(ModelStatus::Cancelled),
                metrics: Some(metrics),
                training_history: Some(history),
                ..Default::default()
            },
            Finalization::Failed {
                message,
                details,
                history,
            } => ModelUpdate {
                status: Some(ModelStatus::Failed),
                training_history: Some(history),
                error_message: Some(message),
                error_details: Some(details),
                ..Default::default()
            },
        };
        update.apply(&mut current);

        if let Err(e) = self.backend.update_model(id, &update).await {
            warn!(model_id = %id, error = %e, "Failed to persist model version");
            let err = WorkbenchError::Persistence {
                message: e.to_string(),
                version: Box::new(current.clone()),
            };
            // The cached record still ends terminal; sync reconciles later
            let mut cached = current;
            if completed {
                ModelUpdate {
                    status: Some(ModelStatus::Failed),
                    is_latest_version: Some(was_latest),
                    error_message: Some(err.user_message()),
                    error_details: Some(err.details()),
                    ..Default::default()
                }
                .apply(&mut cached);
            }
            self.cache.write().insert(id.to_string(), cached);
            return Err(err);
        }
        self.cache.write().insert(id.to_string(), current.clone());

        if completed {
            self.retire_lineage(&current).await;
        }
        Ok(current)
    }

    /// Unset `is_latest_version` on every other member of the lineage
    async fn retire_lineage(&self, latest: &ModelVersion) {
        let root = self.root_of(&latest.id);
        let stale: Vec<String> = {
            let cache = self.cache.read();
            cache
                .values()
                .filter(|m| m.id != latest.id && m.is_latest_version)
                .filter(|m| root_in(&cache, &m.id) == root)
                .map(|m| m.id.clone())
                .collect()
        };
        let update = ModelUpdate {
            is_latest_version: Some(false),
            ..Default::default()
        };
        for id in stale {
            match self.backend.update_model(&id, &update).await {
                Ok(()) => self.apply_cached(&id, &update),
                Err(e) => warn!(model_id = %id, error = %e, "Failed to clear latest flag"),
            }
        }
    }

    fn apply_cached(&self, id: &str, update: &ModelUpdate) {
        if let Some(version) = self.cache.write().get_mut(id) {
            update.apply(version);
        }
    }

    fn root_of(&self, id: &str) -> String {
        root_in(&self.cache.read(), id)
    }

    pub fn get(&self, id: &str) -> Result<ModelVersion> {
        self.cache
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| WorkbenchError::NotFound(format!("model {}", id)))
    }

    /// All cached versions, newest first
    pub fn list(&self) -> Vec<ModelVersion> {
        let mut models: Vec<ModelVersion> = self.cache.read().values().cloned().collect();
        models.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.version_number().cmp(&a.version_number()))
        });
        models
    }

    /// Backend delete first; the cache entry survives a backend error
    pub async fn delete(&self, id: &str) -> Result<()> {
        if !self.cache.read().contains_key(id) {
            return Err(WorkbenchError::NotFound(format!("model {}", id)));
        }
        self.backend.delete_model(id).await?;
        self.cache.write().remove(id);
        info!(model_id = %id, "Deleted model");
        Ok(())
    }

    /// Unknown ids are skipped
    pub fn compare(&self, ids: &[String]) -> ModelComparison {
        let models: Vec<ModelVersion> = {
            let cache = self.cache.read();
            ids.iter().filter_map(|id| cache.get(id).cloned()).collect()
        };
        compare_versions(models)
    }

    pub fn statistics(&self) -> ModelStatistics {
        let cache = self.cache.read();
        ModelStatistics::from_versions(cache.values())
    }

    /// Replace the cache with the backend's records
    pub async fn sync(&self) -> Result<usize> {
        let models = self.backend.get_my_models().await?;
        if let Some(max) = models.iter().filter_map(|m| m.version_number()).max() {
            self.bump_past(max);
        }
        let fresh: HashMap<String, ModelVersion> =
            models.into_iter().map(|m| (m.id.clone(), m)).collect();
        let count = fresh.len();
        *self.cache.write() = fresh;
        info!(models = count, "Synchronized model cache");
        Ok(count)
    }

    /// `id` followed by its ancestors up to the lineage root
    pub fn lineage(&self, id: &str) -> Result<Vec<ModelVersion>> {
        let cache = self.cache.read();
        let mut current = cache
            .get(id)
            .ok_or_else(|| WorkbenchError::NotFound(format!("model {}", id)))?;
        let mut chain = vec![current.clone()];
        while let Some(parent) = current.parent_model_id.as_ref().and_then(|p| cache.get(p)) {
            if chain.iter().any(|m| m.id == parent.id) {
                break;
            }
            chain.push(parent.clone());
            current = parent;
        }
        Ok(chain)
    }

    /// The version flagged latest in the lineage containing `id`
    pub fn latest_in_lineage(&self, id: &str) -> Result<Option<ModelVersion>> {
        let cache = self.cache.read();
        if !cache.contains_key(id) {
            return Err(WorkbenchError::NotFound(format!("model {}", id)));
        }
        let root = root_in(&cache, id);
        Ok(cache
            .values()
            .filter(|m| m.is_latest_version && root_in(&cache, &m.id) == root)
            .max_by_key(|m| m.version_number())
            .cloned())
    }

    pub fn export(&self, id: &str, format: ExportFormat) -> Result<serde_json::Value> {
        let version = self.get(id)?;
        match format {
            ExportFormat::Json => Ok(serde_json::to_value(&version)?),
            ExportFormat::Artifact => {
                let artifact = version.model_data.ok_or_else(|| {
                    WorkbenchError::NotFound(format!("model data for {}", id))
                })?;
                Ok(serde_json::to_value(&artifact)?)
            }
        }
    }
}

/// Walk parent links to the oldest cached ancestor
fn root_in(cache: &HashMap<String, ModelVersion>, id: &str) -> String {
    let mut root = id.to_string();
    let mut hops = 0;
    while let Some(parent) = cache
        .get(&root)
        .and_then(|m| m.parent_model_id.as_ref())
        .filter(|p| cache.contains_key(p.as_str()))
    {
        root = parent.clone();
        hops += 1;
        if hops > cache.len() {
            break;
        }
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::runtime::{Dense, Loss, Sequential};
    use crate::training::TrainingMetadata;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn new_model(name: &str) -> NewModel {
        NewModel {
            name: name.to_string(),
            model_type: "linear_regression".to_string(),
            parameters: serde_json::json!({"epochs": 5}),
            training_config: TrainingConfigSnapshot::default(),
            dataset_id: "ds".to_string(),
            pipeline_id: None,
        }
    }

    fn artifact() -> ModelArtifact {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let mut model = Sequential::new(vec![2]);
        model.push(Dense::new(2, 1, &mut rng));
        ModelArtifact::new(
            &model,
            TrainingMetadata {
                feature_names: Some(vec!["a".into(), "b".into()]),
                label_name: Some("y".into()),
                model_type: "linear_regression".into(),
                loss: Loss::MeanSquaredError,
                classes: None,
                epochs_completed: 5,
                random_state: 42,
                trained_at: Utc::now(),
            },
        )
    }

    fn completed(loss: f64) -> Finalization {
        Finalization::Completed {
            metrics: ModelMetrics {
                loss,
                training_time: 1.0,
                epochs: Some(5),
                ..Default::default()
            },
            artifact: artifact(),
            history: Vec::new(),
            preprocessing_steps: Vec::new(),
        }
    }

    fn store() -> (Arc<MemoryBackend>, ModelVersionStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = ModelVersionStore::new(backend.clone());
        (backend, store)
    }

    #[tokio::test]
    async fn test_versions_increase() {
        let (_, store) = store();
        let a = store.create(new_model("a")).await.unwrap();
        let b = store.create(new_model("b")).await.unwrap();
        assert_eq!(a.version, "v1");
        assert_eq!(b.version, "v2");
        assert_eq!(a.status, ModelStatus::Training);
    }

    #[tokio::test]
    async fn test_clone_links_parent_and_moves_latest_flag() {
        let (backend, store) = store();
        for _ in 0..2 {
            store.create(new_model("filler")).await.unwrap();
        }
        let m1 = store.create(new_model("m1")).await.unwrap();
        assert_eq!(m1.version, "v3");
        store.finalize(&m1.id, completed(0.5)).await.unwrap();

        let clone = store.clone_model(&m1.id, "m1 retrain", None).await.unwrap();
        assert_eq!(clone.parent_model_id.as_deref(), Some(m1.id.as_str()));
        assert_eq!(clone.status, ModelStatus::Training);
        assert!(clone.version_number().unwrap() > 3);
        assert!(clone.training_history.is_empty());
        assert_eq!(clone.metrics, ModelMetrics::default());
        assert_eq!(clone.parameters, m1.parameters);
        assert!(store.get(&m1.id).unwrap().is_latest_version);

        store.finalize(&clone.id, completed(0.3)).await.unwrap();
        assert!(!store.get(&m1.id).unwrap().is_latest_version);
        assert!(!backend.model(&m1.id).unwrap().is_latest_version);
        assert!(store.get(&clone.id).unwrap().is_latest_version);

        let latest = store.latest_in_lineage(&m1.id).unwrap().unwrap();
        assert_eq!(latest.id, clone.id);
        let chain = store.lineage(&clone.id).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].id, m1.id);
    }

    #[tokio::test]
    async fn test_persistence_error_carries_version() {
        let (backend, store) = store();
        let m = store.create(new_model("m")).await.unwrap();
        backend.reject_model_writes(true);
        match store.finalize(&m.id, completed(0.25)).await {
            Err(WorkbenchError::Persistence { version, .. }) => {
                assert_eq!(version.status, ModelStatus::Completed);
                assert_eq!(version.metrics.loss, 0.25);
                assert!(version.model_data.is_some());
            }
            other => panic!("expected persistence error, got {:?}", other.map(|v| v.id)),
        }

        let cached = store.get(&m.id).unwrap();
        assert_eq!(cached.status, ModelStatus::Failed);
        assert_eq!(cached.metrics.loss, 0.25);
        assert_eq!(cached.error_details.unwrap()["kind"], "persistence");
    }

    #[tokio::test]
    async fn test_unstored_cancel_still_ends_terminal() {
        let (backend, store) = store();
        let m = store.create(new_model("m")).await.unwrap();
        backend.reject_model_writes(true);
        let outcome = Finalization::Cancelled {
            metrics: ModelMetrics::default(),
            history: Vec::new(),
        };
        assert!(store.finalize(&m.id, outcome).await.is_err());
        assert_eq!(store.get(&m.id).unwrap().status, ModelStatus::Cancelled);
        assert_eq!(backend.model(&m.id).unwrap().status, ModelStatus::Training);
    }

    #[tokio::test]
    async fn test_delete_keeps_cache_on_backend_error() {
        let (backend, store) = store();
        let m = store.create(new_model("m")).await.unwrap();
        backend.reject_model_writes(true);
        assert!(store.delete(&m.id).await.is_err());
        assert!(store.get(&m.id).is_ok());

        backend.reject_model_writes(false);
        store.delete(&m.id).await.unwrap();
        assert!(store.get(&m.id).is_err());
        assert_eq!(backend.model_count(), 0);
    }

    #[tokio::test]
    async fn test_sync_replaces_cache_and_bumps_counter() {
        let (backend, store) = store();
        let m = store.create(new_model("m")).await.unwrap();

        let mut foreign = m.clone();
        foreign.id = "foreign".to_string();
        foreign.version = "v40".to_string();
        backend.create_model(&foreign).await.unwrap();
        backend.delete_model(&m.id).await.unwrap();

        assert_eq!(store.sync().await.unwrap(), 1);
        assert!(store.get(&m.id).is_err());
        let next = store.create(new_model("n")).await.unwrap();
        assert_eq!(next.version, "v41");
    }

    #[tokio::test]
    async fn test_export_formats() {
        let (_, store) = store();
        let m = store.create(new_model("m")).await.unwrap();
        assert!(store.export(&m.id, ExportFormat::Artifact).is_err());
        store.finalize(&m.id, completed(0.1)).await.unwrap();

        let full = store.export(&m.id, ExportFormat::Json).unwrap();
        assert_eq!(full["status"], "completed");
        let data = store.export(&m.id, ExportFormat::Artifact).unwrap();
        assert_eq!(data["training_metadata"]["label_name"], "y");
        assert_eq!("artifact".parse::<ExportFormat>().unwrap(), ExportFormat::Artifact);
        assert!("zip".parse::<ExportFormat>().is_err());
    }

    #[tokio::test]
    async fn test_failed_finalize_records_error() {
        let (_, store) = store();
        let m = store.create(new_model("m")).await.unwrap();
        let v = store
            .finalize(
                &m.id,
                Finalization::Failed {
                    message: "bad data".into(),
                    details: serde_json::json!({"kind": "non_numeric_data"}),
                    history: Vec::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(v.status, ModelStatus::Failed);
        assert_eq!(v.error_message.as_deref(), Some("bad data"));
        assert_eq!(store.list().len(), 1);
    }
}
