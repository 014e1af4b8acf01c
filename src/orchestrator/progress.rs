//! Job progress reporting
//!
//! Training runs in four phases that map onto a single 0-100 percentage:
//!
//! | phase         | range   |
//! |---------------|---------|
//! | fetch         | 0-15    |
//! | preprocessing | 15-30   |
//! | training      | 30-90   |
//! | persistence   | 90-100  |
//!
//! Job-store updates are forwarded in order by a background task; a failed
//! update is logged and dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{JobStatus, JobStore, JobUpdate};
use crate::registry::{ModelMetrics, ModelVersionStore};
use crate::training::{EpochRecord, TrainingObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Fetch,
    Preprocessing,
    Training,
    Persistence,
}

impl Phase {
    /// Percent range covered by the phase
    pub fn range(&self) -> (f64, f64) {
        match self {
            Self::Fetch => (0.0, 15.0),
            Self::Preprocessing => (15.0, 30.0),
            Self::Training => (30.0, 90.0),
            Self::Persistence => (90.0, 100.0),
        }
    }

    /// Overall percent for a phase-local fraction in [0, 1]
    pub fn project(&self, fraction: f64) -> f64 {
        let (start, end) = self.range();
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        start + (end - start) * fraction
    }
}

/// Event delivered to the caller's channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started {
        job_id: String,
        model_id: String,
        version: String,
    },
    Phase {
        phase: Phase,
        progress: f64,
        message: String,
    },
    Epoch {
        epoch: usize,
        total_epochs: usize,
        loss: f64,
        accuracy: Option<f64>,
        validation_loss: Option<f64>,
        validation_accuracy: Option<f64>,
        progress: f64,
    },
    Completed {
        model_id: String,
        metrics: ModelMetrics,
    },
    Cancelled {
        model_id: String,
    },
    Failed {
        model_id: String,
        message: String,
    },
}

/// Shared cancel switch checked at every epoch boundary
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ProgressReporter {
    job_id: String,
    model_id: String,
    events: Option<UnboundedSender<ProgressEvent>>,
    updates: UnboundedSender<JobUpdate>,
    worker: JoinHandle<()>,
    cancel: CancellationFlag,
    history: Option<Arc<ModelVersionStore>>,
    last_percent: Mutex<f64>,
}

impl ProgressReporter {
    /// Spawn the job-update forwarder; must be called inside a tokio runtime
    pub fn start(
        job_id: impl Into<String>,
        model_id: impl Into<String>,
        jobs: Arc<dyn JobStore>,
        events: Option<UnboundedSender<ProgressEvent>>,
        cancel: CancellationFlag,
    ) -> Self {
        let job_id = job_id.into();
        let (updates, mut rx) = mpsc::unbounded_channel::<JobUpdate>();
        let worker_job = job_id.clone();
        let worker = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                if let Err(e) = jobs.update_training_job(&worker_job, update).await {
                    warn!(job_id = %worker_job, error = %e, "Failed to report job progress");
                }
            }
        });

        Self {
            job_id,
            model_id: model_id.into(),
            events,
            updates,
            worker,
            cancel,
            history: None,
            last_percent: Mutex::new(-1.0),
        }
    }

    /// Also append every epoch to the cached model version
    pub fn with_history(mut self, store: Arc<ModelVersionStore>) -> Self {
        self.history = Some(store);
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening
            let _ = tx.send(event);
        }
    }

    fn push(&self, update: JobUpdate) {
        if self.updates.send(update).is_err() {
            debug!(job_id = %self.job_id, "Job update forwarder already stopped");
        }
    }

    /// Send a progress update unless it moves less than one point
    fn push_progress(&self, percent: f64, message: String, force: bool) {
        {
            let mut last = self.last_percent.lock();
            if !force && percent - *last < 1.0 {
                return;
            }
            *last = percent;
        }
        self.push(JobUpdate {
            status: Some(JobStatus::Running),
            progress: Some(percent),
            message: Some(message),
            ..Default::default()
        });
    }

    pub fn started(&self, version: &str) {
        self.emit(ProgressEvent::Started {
            job_id: self.job_id.clone(),
            model_id: self.model_id.clone(),
            version: version.to_string(),
        });
    }

    pub fn phase(&self, phase: Phase, fraction: f64, message: impl Into<String>) {
        let message = message.into();
        let progress = phase.project(fraction);
        debug!(job_id = %self.job_id, ?phase, progress, "{}", message);
        self.push_progress(progress, message.clone(), fraction <= 0.0);
        self.emit(ProgressEvent::Phase {
            phase,
            progress,
            message,
        });
    }

    pub fn completed(&self, metrics: &ModelMetrics) {
        self.push(JobUpdate {
            status: Some(JobStatus::Completed),
            progress: Some(100.0),
            message: Some("Training completed".to_string()),
            metrics: Some(metrics.clone()),
            ..Default::default()
        });
        self.emit(ProgressEvent::Completed {
            model_id: self.model_id.clone(),
            metrics: metrics.clone(),
        });
    }

    pub fn cancelled(&self) {
        self.push(JobUpdate {
            status: Some(JobStatus::Cancelled),
            message: Some("Training cancelled".to_string()),
            ..Default::default()
        });
        self.emit(ProgressEvent::Cancelled {
            model_id: self.model_id.clone(),
        });
    }

    pub fn failed(&self, message: &str) {
        self.push(JobUpdate {
            status: Some(JobStatus::Failed),
            message: Some("Training failed".to_string()),
            error: Some(message.to_string()),
            ..Default::default()
        });
        self.emit(ProgressEvent::Failed {
            model_id: self.model_id.clone(),
            message: message.to_string(),
        });
    }

    /// Wait until every queued job update has been delivered
    pub async fn finish(self) {
        let Self {
            updates, worker, job_id, ..
        } = self;
        drop(updates);
        if let Err(e) = worker.await {
            warn!(job_id = %job_id, error = %e, "Job update forwarder panicked");
        }
    }
}

impl TrainingObserver for ProgressReporter {
    fn on_epoch(&self, record: &EpochRecord, total_epochs: usize) {
        let fraction = record.epoch as f64 / total_epochs.max(1) as f64;
        let progress = Phase::Training.project(fraction);
        if let Some(store) = &self.history {
            store.record_epoch(&self.model_id, record.clone());
        }
        self.push_progress(
            progress,
            format!("Epoch {}/{}", record.epoch, total_epochs),
            record.epoch == total_epochs,
        );
        self.emit(ProgressEvent::Epoch {
            epoch: record.epoch,
            total_epochs,
            loss: record.loss,
            accuracy: record.accuracy,
            validation_loss: record.validation_loss,
            validation_accuracy: record.validation_accuracy,
            progress,
        });
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{JobRecord, MemoryBackend, TrainingJobSpec};
    use chrono::Utc;

    #[test]
    fn test_phase_projection() {
        assert_eq!(Phase::Fetch.project(0.0), 0.0);
        assert_eq!(Phase::Fetch.project(1.0), 15.0);
        assert_eq!(Phase::Training.project(0.5), 60.0);
        assert_eq!(Phase::Persistence.project(2.0), 100.0);
        assert_eq!(Phase::Preprocessing.project(f64::NAN), 15.0);
    }

    fn record(epoch: usize) -> EpochRecord {
        EpochRecord {
            epoch,
            loss: 1.0 / epoch as f64,
            accuracy: None,
            validation_loss: None,
            validation_accuracy: None,
            timestamp: Utc::now(),
        }
    }

    async fn job(backend: &MemoryBackend) -> String {
        backend
            .create_training_job(TrainingJobSpec {
                model_id: "m".into(),
                dataset_id: "d".into(),
                pipeline_id: None,
                model_type: "neural_network".into(),
                parameters: serde_json::Value::Null,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_epochs_reach_job_store_and_channel() {
        let backend = Arc::new(MemoryBackend::new());
        let job_id = job(&backend).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter =
            ProgressReporter::start(&job_id, "m", backend.clone(), Some(tx), CancellationFlag::new());

        reporter.phase(Phase::Fetch, 0.0, "Fetching");
        for epoch in 1..=4 {
            reporter.on_epoch(&record(epoch), 4);
        }
        reporter.finish().await;

        let stored: JobRecord = backend.job(&job_id).unwrap();
        assert_eq!(stored.progress, 90.0);
        assert_eq!(stored.status, JobStatus::Running);

        let mut epochs = 0;
        while let Ok(event) = rx.try_recv() {
            if let ProgressEvent::Epoch { progress, .. } = event {
                epochs += 1;
                assert!(progress > 30.0 && progress <= 90.0);
            }
        }
        assert_eq!(epochs, 4);
    }

    #[tokio::test]
    async fn test_job_store_errors_are_not_fatal() {
        let backend = Arc::new(MemoryBackend::new());
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        // Unknown job id: every update fails inside the forwarder
        let reporter =
            ProgressReporter::start("missing", "m", backend, Some(tx), CancellationFlag::new());
        reporter.on_epoch(&record(1), 1);
        reporter.failed("boom");
        reporter.finish().await;
    }

    #[test]
    fn test_cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
