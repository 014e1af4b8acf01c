//! Training engine
//!
//! Resolves a request into data, replays the pipeline, trains and persists
//! the result as a model version. Any error after the version record exists
//! finalizes that record (and its job) as failed.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::progress::{CancellationFlag, Phase, ProgressEvent, ProgressReporter};
use super::request::TrainingRequest;
use crate::backend::{
    DatasetFormat, DatasetRecord, DatasetStore, JobStore, ModelBackend, PipelineStore,
    TrainingJobSpec,
};
use crate::config::WorkbenchConfig;
use crate::data::{DataLoader, Subset};
use crate::error::{Result, WorkbenchError};
use crate::features::{FeatureExtractor, ImagePreprocessor};
use crate::preprocessing::{assign_subsets, PipelineInterpreter, Step};
use crate::registry::{
    ExportFormat, Finalization, ModelComparison, ModelMetrics, ModelStatistics, ModelVersion,
    ModelVersionStore, NewModel, TrainingConfigSnapshot,
};
use crate::runtime::{RuntimeHandle, RuntimeOptions};
use crate::training::{
    DriverState, ModelFamily, TrainingConfig, TrainingData, TrainingDriver, TrainingOutcome,
};

/// Everything needed to train one version
struct TrainingPlan {
    family: ModelFamily,
    dataset_id: String,
    pipeline_id: Option<String>,
    /// Resolved steps of a parent version, replayed instead of the pipeline
    recorded_steps: Vec<Step>,
    snapshot: TrainingConfigSnapshot,
}

struct EngineInner {
    config: WorkbenchConfig,
    datasets: Arc<dyn DatasetStore>,
    pipelines: Arc<dyn PipelineStore>,
    jobs: Arc<dyn JobStore>,
    store: Arc<ModelVersionStore>,
    runtime: RuntimeHandle,
    interpreter: PipelineInterpreter,
    loader: DataLoader,
}

/// Cheap to clone; clones share the store, backends and tensor runtime
#[derive(Clone)]
pub struct TrainingEngine {
    inner: Arc<EngineInner>,
}

impl TrainingEngine {
    pub fn new(
        config: WorkbenchConfig,
        datasets: Arc<dyn DatasetStore>,
        pipelines: Arc<dyn PipelineStore>,
        jobs: Arc<dyn JobStore>,
        models: Arc<dyn ModelBackend>,
    ) -> Self {
        let runtime = RuntimeHandle::new(RuntimeOptions {
            backend: config.runtime_backend.clone(),
            num_threads: config.num_threads,
        });
        Self {
            inner: Arc::new(EngineInner {
                config,
                datasets,
                pipelines,
                jobs,
                store: Arc::new(ModelVersionStore::new(models)),
                runtime,
                interpreter: PipelineInterpreter::new(),
                loader: DataLoader::new(),
            }),
        }
    }

    /// Wire all four collaborators to one backend
    pub fn with_backend<B>(config: WorkbenchConfig, backend: Arc<B>) -> Self
    where
        B: DatasetStore + PipelineStore + JobStore + ModelBackend + 'static,
    {
        Self::new(
            config,
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend,
        )
    }

    pub fn config(&self) -> &WorkbenchConfig {
        &self.inner.config
    }

    pub fn store(&self) -> Arc<ModelVersionStore> {
        Arc::clone(&self.inner.store)
    }

    pub async fn start_training(
        &self,
        request: TrainingRequest,
        progress: Option<UnboundedSender<ProgressEvent>>,
    ) -> Result<ModelVersion> {
        self.start_training_with_cancel(request, progress, CancellationFlag::new())
            .await
    }

    pub async fn start_training_with_cancel(
        &self,
        request: TrainingRequest,
        progress: Option<UnboundedSender<ProgressEvent>>,
        cancel: CancellationFlag,
    ) -> Result<ModelVersion> {
        request.validate()?;
        let family = ModelFamily::from_model_type(&request.model_type, &request.hyperparameters)?;
        let snapshot = TrainingConfigSnapshot {
            test_size: request.test_size,
            validation_size: request.validation_size,
            random_state: request
                .random_state
                .unwrap_or(self.inner.config.default_random_state),
            label_selection: request.label.clone(),
            image: Some(request.image.clone()),
        };

        let version = self
            .inner
            .store
            .create(NewModel {
                name: request
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{} model", family.model_type())),
                model_type: family.model_type().to_string(),
                parameters: family.parameters(),
                training_config: snapshot.clone(),
                dataset_id: request.dataset_id.clone(),
                pipeline_id: request.pipeline_id.clone(),
            })
            .await?;
        info!(
            model_id = %version.id,
            version = %version.version,
            model_type = %version.model_type,
            dataset_id = %request.dataset_id,
            "Training requested"
        );

        let plan = TrainingPlan {
            family,
            dataset_id: request.dataset_id,
            pipeline_id: request.pipeline_id,
            recorded_steps: Vec::new(),
            snapshot,
        };
        self.run(version, plan, progress, cancel).await
    }

    /// Run a training request on its own tokio task
    pub fn spawn_training(
        &self,
        request: TrainingRequest,
        progress: Option<UnboundedSender<ProgressEvent>>,
    ) -> (JoinHandle<Result<ModelVersion>>, CancellationFlag) {
        let cancel = CancellationFlag::new();
        let engine = self.clone();
        let flag = cancel.clone();
        let handle = tokio::spawn(async move {
            engine
                .start_training_with_cancel(request, progress, flag)
                .await
        });
        (handle, cancel)
    }

    /// Clone `id` into a new version and retrain it
    ///
    /// The clone replays the parent's resolved preprocessing steps, so fitted
    /// values carry over unchanged.
    pub async fn clone_model(
        &self,
        id: &str,
        new_name: &str,
        new_parameters: Option<serde_json::Value>,
        progress: Option<UnboundedSender<ProgressEvent>>,
    ) -> Result<ModelVersion> {
        self.clone_model_with_cancel(id, new_name, new_parameters, progress, CancellationFlag::new())
            .await
    }

    pub async fn clone_model_with_cancel(
        &self,
        id: &str,
        new_name: &str,
        new_parameters: Option<serde_json::Value>,
        progress: Option<UnboundedSender<ProgressEvent>>,
        cancel: CancellationFlag,
    ) -> Result<ModelVersion> {
        let source = self.inner.store.get(id)?;
        let params = new_parameters.unwrap_or_else(|| source.parameters.clone());
        let family = ModelFamily::from_model_type(&source.model_type, &params)?;

        let version = self
            .inner
            .store
            .clone_model(id, new_name, Some(family.parameters()))
            .await?;
        let plan = TrainingPlan {
            family,
            dataset_id: version.dataset_id.clone(),
            pipeline_id: version.pipeline_id.clone(),
            recorded_steps: version.preprocessing_steps.clone(),
            snapshot: version.training_config.clone(),
        };
        self.run(version, plan, progress, cancel).await
    }

    async fn run(
        &self,
        version: ModelVersion,
        plan: TrainingPlan,
        progress: Option<UnboundedSender<ProgressEvent>>,
        cancel: CancellationFlag,
    ) -> Result<ModelVersion> {
        let inner = &self.inner;
        let spec = TrainingJobSpec {
            model_id: version.id.clone(),
            dataset_id: plan.dataset_id.clone(),
            pipeline_id: plan.pipeline_id.clone(),
            model_type: version.model_type.clone(),
            parameters: version.parameters.clone(),
        };
        let job_id = match inner.jobs.create_training_job(spec).await {
            Ok(id) => id,
            Err(e) => {
                error!(model_id = %version.id, error = %e, "Failed to create training job");
                self.fail_version(&version.id, &e).await;
                return Err(e);
            }
        };
        if let Err(e) = inner.store.attach_job(&version.id, &job_id).await {
            warn!(model_id = %version.id, job_id = %job_id, error = %e, "Failed to link job to model");
        }

        let reporter = ProgressReporter::start(
            job_id.as_str(),
            version.id.as_str(),
            Arc::clone(&inner.jobs),
            progress,
            cancel,
        )
        .with_history(Arc::clone(&inner.store));
        reporter.started(&version.version);
        info!(job_id = %job_id, model_id = %version.id, "Training job started");

        let result = self.execute(&plan, &reporter).await;
        let finished = self.conclude(&version, result, &reporter).await;
        reporter.finish().await;
        finished
    }

    async fn execute(
        &self,
        plan: &TrainingPlan,
        reporter: &ProgressReporter,
    ) -> Result<(TrainingOutcome, Vec<Step>)> {
        let inner = &self.inner;
        let runtime = inner.runtime.get()?;

        reporter.phase(Phase::Fetch, 0.0, "Fetching dataset");
        let dataset = inner
            .datasets
            .get_dataset_by_id(&plan.dataset_id)
            .await
            .map_err(dataset_error)?;
        let (data, steps) = match dataset.format {
            DatasetFormat::Csv => self.prepare_tabular(&dataset, plan, reporter).await?,
            DatasetFormat::Images => self.prepare_images(&dataset, plan, reporter).await?,
        };

        reporter.phase(Phase::Training, 0.0, "Training model");
        let config = TrainingConfig::new()
            .with_max_tensor_elements(inner.config.max_tensor_elements)
            .with_random_state(plan.snapshot.random_state);
        let mut driver = TrainingDriver::new(runtime, config);
        let outcome = driver.train(&plan.family, data, reporter).await?;
        Ok((outcome, steps))
    }

    async fn prepare_tabular(
        &self,
        dataset: &DatasetRecord,
        plan: &TrainingPlan,
        reporter: &ProgressReporter,
    ) -> Result<(TrainingData, Vec<Step>)> {
        let inner = &self.inner;
        let storage_id = dataset.file_storage_id.as_deref().ok_or_else(|| {
            WorkbenchError::DatasetAccess(format!("dataset {} has no stored file", dataset.id))
        })?;
        let url = inner
            .datasets
            .get_download_url(storage_id)
            .await
            .map_err(dataset_error)?;
        reporter.phase(Phase::Fetch, 0.5, "Downloading dataset");
        let bytes = inner.datasets.fetch_bytes(&url).await.map_err(dataset_error)?;
        let table = inner.loader.parse_csv(&bytes)?;
        reporter.phase(Phase::Fetch, 1.0, format!("Loaded {} rows", table.n_rows()));

        let steps = if !plan.recorded_steps.is_empty() {
            plan.recorded_steps.clone()
        } else if let Some(pipeline_id) = &plan.pipeline_id {
            inner.pipelines.get_pipeline_by_id(pipeline_id).await?.steps
        } else {
            Vec::new()
        };
        reporter.phase(
            Phase::Preprocessing,
            0.0,
            format!("Applying {} preprocessing steps", steps.len()),
        );
        let transformed = inner.interpreter.apply(table, &steps)?;

        reporter.phase(Phase::Preprocessing, 0.6, "Extracting features");
        let mut tensors = FeatureExtractor::new(plan.snapshot.label_selection.clone())
            .extract(&transformed.table)?;
        if tensors.subsets.is_none() {
            tensors.subsets = Some(holdout(tensors.row_count, &plan.snapshot));
        }
        reporter.phase(
            Phase::Preprocessing,
            1.0,
            format!("{} rows, {} features", tensors.row_count, tensors.n_features()),
        );
        Ok((TrainingData::Tabular(tensors), transformed.preprocessing_steps))
    }

    async fn prepare_images(
        &self,
        dataset: &DatasetRecord,
        plan: &TrainingPlan,
        reporter: &ProgressReporter,
    ) -> Result<(TrainingData, Vec<Step>)> {
        let inner = &self.inner;
        if plan.pipeline_id.is_some() {
            warn!(dataset_id = %dataset.id, "Pipeline steps are not applied to image datasets");
        }
        let n = dataset.images.len();
        if n == 0 {
            return Err(WorkbenchError::DatasetAccess(format!(
                "dataset {} has no images",
                dataset.id
            )));
        }

        let mut blobs = Vec::with_capacity(n);
        let mut labels = Vec::with_capacity(n);
        for (i, image) in dataset.images.iter().enumerate() {
            let url = inner
                .datasets
                .get_download_url(&image.storage_id)
                .await
                .map_err(dataset_error)?;
            blobs.push(inner.datasets.fetch_bytes(&url).await.map_err(dataset_error)?);
            labels.push(image.label);
            reporter.phase(
                Phase::Fetch,
                (i + 1) as f64 / n as f64,
                format!("Fetched {}/{} images", i + 1, n),
            );
        }

        reporter.phase(Phase::Preprocessing, 0.0, "Decoding images");
        let config = plan.snapshot.image.clone().unwrap_or_default();
        let tensors = ImagePreprocessor::new(config).prepare(&blobs, &labels)?;
        let subsets = holdout(tensors.shape[0], &plan.snapshot);
        reporter.phase(Phase::Preprocessing, 1.0, format!("{} images ready", n));
        Ok((
            TrainingData::Images {
                tensors,
                subsets: Some(subsets),
            },
            Vec::new(),
        ))
    }

    async fn conclude(
        &self,
        version: &ModelVersion,
        result: Result<(TrainingOutcome, Vec<Step>)>,
        reporter: &ProgressReporter,
    ) -> Result<ModelVersion> {
        let (outcome, steps) = match result {
            Ok(done) => done,
            Err(e) => {
                error!(model_id = %version.id, error = %e, "Training failed");
                reporter.failed(&e.user_message());
                self.fail_version(&version.id, &e).await;
                return Err(e);
            }
        };

        reporter.phase(Phase::Persistence, 0.0, "Saving model");
        let metrics = ModelMetrics::from(&outcome.metrics);
        let cancelled = outcome.state == DriverState::Cancelled;
        let finalization = if cancelled {
            Finalization::Cancelled {
                metrics: metrics.clone(),
                history: outcome.history,
            }
        } else {
            Finalization::Completed {
                metrics: metrics.clone(),
                artifact: outcome.artifact,
                history: outcome.history,
                preprocessing_steps: steps,
            }
        };

        match self.inner.store.finalize(&version.id, finalization).await {
            Ok(saved) => {
                if cancelled {
                    reporter.cancelled();
                    info!(model_id = %saved.id, epochs = saved.training_history.len(), "Training cancelled");
                } else {
                    reporter.completed(&metrics);
                    info!(
                        model_id = %saved.id,
                        version = %saved.version,
                        loss = metrics.loss,
                        accuracy = ?metrics.accuracy,
                        "Training completed"
                    );
                }
                Ok(saved)
            }
            Err(e) => {
                error!(model_id = %version.id, error = %e, "Trained model could not be saved");
                reporter.failed(&e.user_message());
                self.fail_version(&version.id, &e).await;
                Err(e)
            }
        }
    }

    /// Best-effort terminal write for a run that did not finish
    async fn fail_version(&self, id: &str, err: &WorkbenchError) {
        let store = &self.inner.store;
        let history = store
            .get(id)
            .map(|v| v.training_history)
            .unwrap_or_default();
        let outcome = Finalization::Failed {
            message: err.user_message(),
            details: err.details(),
            history,
        };
        if let Err(e) = store.finalize(id, outcome).await {
            error!(model_id = %id, error = %e, "Failed to mark model as failed");
        }
    }

    pub fn get_model(&self, id: &str) -> Result<ModelVersion> {
        self.inner.store.get(id)
    }

    /// Newest first
    pub fn list_models(&self) -> Vec<ModelVersion> {
        self.inner.store.list()
    }

    pub fn compare_models(&self, ids: &[String]) -> ModelComparison {
        self.inner.store.compare(ids)
    }

    pub async fn delete_model(&self, id: &str) -> Result<()> {
        self.inner.store.delete(id).await
    }

    pub fn export_model(&self, id: &str, format: ExportFormat) -> Result<serde_json::Value> {
        self.inner.store.export(id, format)
    }

    pub fn lineage(&self, id: &str) -> Result<Vec<ModelVersion>> {
        self.inner.store.lineage(id)
    }

    pub fn statistics(&self) -> ModelStatistics {
        self.inner.store.statistics()
    }

    /// Reload the model cache from the backend
    pub async fn sync(&self) -> Result<usize> {
        self.inner.store.sync().await
    }
}

/// Seeded train/validation/test tags from the request's holdout fractions
fn holdout(rows: usize, snapshot: &TrainingConfigSnapshot) -> Vec<Subset> {
    let train = 1.0 - snapshot.test_size - snapshot.validation_size;
    assign_subsets(rows, train, snapshot.validation_size, snapshot.random_state)
}

fn dataset_error(err: WorkbenchError) -> WorkbenchError {
    match err {
        WorkbenchError::DatasetAccess(_) => err,
        other => WorkbenchError::DatasetAccess(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{JobStatus, MemoryBackend};
    use crate::registry::ModelStatus;

    fn engine() -> (Arc<MemoryBackend>, TrainingEngine) {
        let backend = Arc::new(MemoryBackend::new());
        let config = WorkbenchConfig::new().with_runtime_backend("cpu");
        (backend.clone(), TrainingEngine::with_backend(config, backend))
    }

    fn linear_csv() -> String {
        let mut csv = String::from("x1,x2,y\n");
        for i in 0..40 {
            let x1 = i as f64 / 40.0;
            let x2 = (i % 7) as f64 / 7.0;
            csv.push_str(&format!("{},{},{}\n", x1, x2, 2.0 * x1 - x2 + 0.5));
        }
        csv
    }

    #[tokio::test]
    async fn test_unknown_dataset_fails_record() {
        let (backend, engine) = engine();
        let err = engine
            .start_training(TrainingRequest::new("missing", "linear_regression"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkbenchError::DatasetAccess(_)));

        let models = engine.list_models();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].status, ModelStatus::Failed);
        assert_eq!(backend.model(&models[0].id).unwrap().status, ModelStatus::Failed);
        let job = backend
            .job(models[0].training_job_id.as_deref().unwrap())
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_unsupported_family_is_recorded() {
        let (backend, engine) = engine();
        backend.add_csv_dataset("d", "lin", &linear_csv());
        let err = engine
            .start_training(TrainingRequest::new("d", "random_forest"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkbenchError::TrainingRuntime { .. }));
        let m = &engine.list_models()[0];
        assert_eq!(m.status, ModelStatus::Failed);
        assert_eq!(m.error_details.as_ref().unwrap()["category"], "unsupported_architecture");
    }

    #[tokio::test]
    async fn test_unknown_model_type_creates_nothing() {
        let (_, engine) = engine();
        let err = engine
            .start_training(TrainingRequest::new("d", "transformer"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkbenchError::InvalidParameter { .. }));
        assert!(engine.list_models().is_empty());
    }

    #[tokio::test]
    async fn test_trains_and_completes_job() {
        let (backend, engine) = engine();
        backend.add_csv_dataset("d", "lin", &linear_csv());
        let request = TrainingRequest::new("d", "linear_regression")
            .with_hyperparameters(serde_json::json!({"epochs": 20, "learning_rate": 0.1}));
        let model = engine.start_training(request, None).await.unwrap();

        assert_eq!(model.status, ModelStatus::Completed);
        assert_eq!(model.training_history.len(), 20);
        assert!(model.is_latest_version);
        let artifact = model.model_data.as_ref().unwrap();
        assert_eq!(artifact.feature_names(), vec!["x1", "x2"]);
        assert_eq!(artifact.label_name(), "y");

        let job = backend.job(model.training_job_id.as_deref().unwrap()).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100.0);
    }
}
