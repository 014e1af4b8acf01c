//! Iterative training loop

use chrono::Utc;
use ndarray::{Array1, ArrayD, IxDyn};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::artifact::{ModelArtifact, TrainingMetadata};
use super::config::{ModelFamily, Schedule, TrainingConfig};
use super::metrics::{EpochRecord, TrainingMetrics};
use crate::data::Subset;
use crate::error::{Result, TrainingFailure, WorkbenchError};
use crate::features::{ExtractedTensors, ImageTensors};
use crate::runtime::{
    ActivationLayer, Conv2d, Dense, Dropout, Flatten, Loss, MaxPool2d, Optimizer, Sequential,
    TensorRuntime,
};

/// Receives epoch results and answers cancellation checks
pub trait TrainingObserver: Send + Sync {
    fn on_epoch(&self, record: &EpochRecord, total_epochs: usize);

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TrainingObserver for NoopObserver {
    fn on_epoch(&self, _record: &EpochRecord, _total_epochs: usize) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Numeric input to the driver
#[derive(Debug, Clone)]
pub enum TrainingData {
    Tabular(ExtractedTensors),
    Images {
        tensors: ImageTensors,
        subsets: Option<Vec<Subset>>,
    },
}

impl TrainingData {
    fn n_rows(&self) -> usize {
        match self {
            Self::Tabular(t) => t.row_count,
            Self::Images { tensors, .. } => tensors.shape[0],
        }
    }

    fn sample_shape(&self) -> Vec<usize> {
        match self {
            Self::Tabular(t) => vec![t.n_features()],
            Self::Images { tensors, .. } => tensors.shape[1..].to_vec(),
        }
    }

    fn values(&self) -> &[f64] {
        match self {
            Self::Tabular(t) => &t.features,
            Self::Images { tensors, .. } => &tensors.data,
        }
    }

    fn labels(&self) -> &[f64] {
        match self {
            Self::Tabular(t) => &t.labels,
            Self::Images { tensors, .. } => &tensors.labels,
        }
    }

    fn rows_in(&self, subset: Subset) -> Vec<usize> {
        let tags = match self {
            Self::Tabular(t) => t.subsets.as_deref(),
            Self::Images { subsets, .. } => subsets.as_deref(),
        };
        match tags {
            Some(tags) => tags
                .iter()
                .enumerate()
                .filter(|(_, t)| **t == subset)
                .map(|(i, _)| i)
                .collect(),
            None if subset == Subset::Train => (0..self.n_rows()).collect(),
            None => Vec::new(),
        }
    }

    fn names(&self) -> (Option<Vec<String>>, Option<String>) {
        match self {
            Self::Tabular(t) => (Some(t.feature_names.clone()), Some(t.label_name.clone())),
            Self::Images { .. } => (None, Some("label".to_string())),
        }
    }
}

/// Result of a run that was not aborted by an error
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub state: DriverState,
    pub artifact: ModelArtifact,
    pub metrics: TrainingMetrics,
    pub history: Vec<EpochRecord>,
}

/// Trains one model: `pending -> running -> completed | failed | cancelled`
#[derive(Debug)]
pub struct TrainingDriver {
    runtime: Arc<TensorRuntime>,
    config: TrainingConfig,
    state: DriverState,
}

impl TrainingDriver {
    pub fn new(runtime: Arc<TensorRuntime>, config: TrainingConfig) -> Self {
        Self {
            runtime,
            config,
            state: DriverState::Pending,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub async fn train(
        &mut self,
        family: &ModelFamily,
        data: TrainingData,
        observer: &dyn TrainingObserver,
    ) -> Result<TrainingOutcome> {
        self.state = DriverState::Running;
        match self.run(family, data, observer).await {
            Ok(outcome) => {
                self.state = outcome.state;
                Ok(outcome)
            }
            Err(e) => {
                self.state = DriverState::Failed;
                warn!(model_type = family.model_type(), error = %e, "training failed");
                Err(e)
            }
        }
    }

    async fn run(
        &mut self,
        family: &ModelFamily,
        data: TrainingData,
        observer: &dyn TrainingObserver,
    ) -> Result<TrainingOutcome> {
        let schedule = family.schedule().ok_or_else(|| {
            WorkbenchError::training(
                TrainingFailure::UnsupportedArchitecture,
                format!("model family '{}' cannot be trained by this engine", family.model_type()),
            )
        })?;
        if schedule.epochs == 0 {
            return Err(WorkbenchError::InvalidParameter {
                name: "epochs".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if family.is_image_model() && !matches!(data, TrainingData::Images { .. }) {
            return Err(WorkbenchError::training(
                TrainingFailure::UnsupportedArchitecture,
                "convolutional models require an image dataset",
            ));
        }

        let n = data.n_rows();
        let sample_shape = data.sample_shape();
        let elements = n.saturating_mul(sample_shape.iter().product());
        if elements > self.config.max_tensor_elements {
            return Err(WorkbenchError::training(
                TrainingFailure::DatasetTooLarge,
                format!(
                    "{} feature elements exceed the limit of {}",
                    elements, self.config.max_tensor_elements
                ),
            ));
        }
        if data.values().iter().any(|v| !v.is_finite()) {
            return Err(WorkbenchError::training(
                TrainingFailure::NonNumericData,
                "feature tensor contains NaN or infinite values",
            ));
        }

        let classes = distinct(data.labels());
        let loss = family.loss(classes.len());
        let (labels, classes) = encode_labels(loss, data.labels(), classes)?;

        let mut shape = vec![n];
        shape.extend(&sample_shape);
        let x = ArrayD::from_shape_vec(IxDyn(&shape), data.values().to_vec())?;
        let y = Array1::from(labels);

        let train_idx = data.rows_in(Subset::Train);
        if train_idx.is_empty() {
            return Err(WorkbenchError::training(
                TrainingFailure::Unknown,
                "the training partition has no rows",
            ));
        }
        let val_idx = data.rows_in(Subset::Validation);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        let out_units = loss.output_units(classes.as_ref().map(Vec::len).unwrap_or(1));
        let mut model = build_model(family, &sample_shape, out_units, &mut rng)?;
        let mut optimizer = Optimizer::new(schedule.optimizer, schedule.learning_rate);

        info!(
            model_type = family.model_type(),
            rows = n,
            train_rows = train_idx.len(),
            validation_rows = val_idx.len(),
            parameters = model.param_count(),
            epochs = schedule.epochs,
            "training started"
        );

        let runtime = Arc::clone(&self.runtime);
        let x_train = runtime.gather(&x, &train_idx)?;
        let y_train = select(&y, &train_idx);
        let validation = if val_idx.is_empty() {
            None
        } else {
            Some((runtime.gather(&x, &val_idx)?, select(&y, &val_idx)))
        };

        let started = Instant::now();
        let mut history = Vec::with_capacity(schedule.epochs);
        let mut state = DriverState::Completed;
        for epoch in 1..=schedule.epochs {
            let epoch_loss = self.run_epoch(
                &mut model,
                &mut optimizer,
                loss,
                &schedule,
                (&x, &y),
                &train_idx,
                &mut rng,
                epoch,
            )?;

            let accuracy = if loss.is_classification() {
                runtime
                    .evaluate(&mut model, loss, &x_train, &y_train, self.config.eval_batch_size)?
                    .accuracy
            } else {
                None
            };
            let (validation_loss, validation_accuracy) = match &validation {
                Some((xv, yv)) => {
                    let e = runtime.evaluate(&mut model, loss, xv, yv, self.config.eval_batch_size)?;
                    (Some(e.loss), e.accuracy)
                }
                None => (None, None),
            };

            let record = EpochRecord {
                epoch,
                loss: epoch_loss,
                accuracy,
                validation_loss,
                validation_accuracy,
                timestamp: Utc::now(),
            };
            debug!(epoch, loss = epoch_loss, ?accuracy, ?validation_loss, "epoch finished");
            observer.on_epoch(&record, schedule.epochs);
            history.push(record);

            if observer.is_cancelled() {
                info!(epoch, "training cancelled");
                state = DriverState::Cancelled;
                break;
            }
            tokio::task::yield_now().await;
        }

        let metrics = TrainingMetrics::from_history(&history, started.elapsed().as_secs_f64());
        let (feature_names, label_name) = data.names();
        let artifact = ModelArtifact::new(
            &model,
            TrainingMetadata {
                feature_names,
                label_name,
                model_type: family.model_type().to_string(),
                loss,
                classes,
                epochs_completed: history.len(),
                random_state: self.config.random_state,
                trained_at: Utc::now(),
            },
        );
        info!(
            model_type = family.model_type(),
            epochs = history.len(),
            final_loss = metrics.final_loss,
            seconds = metrics.training_time,
            "training finished"
        );

        Ok(TrainingOutcome {
            state,
            artifact,
            metrics,
            history,
        })
    }

    /// Shuffled mini-batch pass; returns the sample-weighted mean batch loss
    #[allow(clippy::too_many_arguments)]
    fn run_epoch(
        &self,
        model: &mut Sequential,
        optimizer: &mut Optimizer,
        loss: Loss,
        schedule: &Schedule,
        (x, y): (&ArrayD<f64>, &Array1<f64>),
        train_idx: &[usize],
        rng: &mut Xoshiro256PlusPlus,
        epoch: usize,
    ) -> Result<f64> {
        let mut order = train_idx.to_vec();
        order.shuffle(rng);

        let mut total = 0.0;
        let mut seen = 0usize;
        for batch in order.chunks(schedule.batch_size.max(1)) {
            let xb = self.runtime.gather(x, batch)?;
            let yb = select(y, batch);
            let value = self
                .runtime
                .train_step(model, optimizer, loss, xb, &yb, rng)
                .map_err(|e| match e {
                    WorkbenchError::TrainingRuntime { kind, detail } => {
                        WorkbenchError::training(kind, format!("epoch {}: {}", epoch, detail))
                    }
                    other => other,
                })?;
            total += value * batch.len() as f64;
            seen += batch.len();
        }
        Ok(total / seen.max(1) as f64)
    }
}

fn select(y: &Array1<f64>, idx: &[usize]) -> Array1<f64> {
    idx.iter().map(|&i| y[i]).collect()
}

fn distinct(labels: &[f64]) -> Vec<f64> {
    let mut values = labels.to_vec();
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup();
    values
}

/// Map labels to class ids for classification losses
fn encode_labels(loss: Loss, labels: &[f64], classes: Vec<f64>) -> Result<(Vec<f64>, Option<Vec<f64>>)> {
    if !loss.is_classification() {
        return Ok((labels.to_vec(), None));
    }
    if loss == Loss::BinaryCrossentropy && classes.len() > 2 {
        return Err(WorkbenchError::InvalidParameter {
            name: "loss".to_string(),
            value: "binary_crossentropy".to_string(),
            reason: format!("labels have {} classes, expected 2", classes.len()),
        });
    }
    let encoded = labels
        .iter()
        .map(|y| classes.iter().position(|c| c == y).unwrap_or(0) as f64)
        .collect();
    Ok((encoded, Some(classes)))
}

fn build_model(
    family: &ModelFamily,
    sample_shape: &[usize],
    out_units: usize,
    rng: &mut Xoshiro256PlusPlus,
) -> Result<Sequential> {
    let mut model = Sequential::new(sample_shape.to_vec());
    if sample_shape.len() > 1 && !family.is_image_model() {
        model.push(Flatten::new());
    }
    let width = |m: &Sequential| m.output_shape().iter().product::<usize>();

    match family {
        ModelFamily::NeuralNetwork(p) => {
            for &units in &p.hidden_layers {
                let input = width(&model);
                model.push(Dense::new(input, units, rng)).push(ActivationLayer::new(p.activation));
                if p.dropout > 0.0 {
                    model.push(Dropout::new(p.dropout));
                }
            }
            let input = width(&model);
            model.push(Dense::new(input, out_units, rng));
        }
        ModelFamily::Convolutional(p) => {
            for &filters in &p.filters {
                let shape = model.output_shape();
                if shape.len() != 3 || shape[0] < p.kernel_size || shape[1] < p.kernel_size {
                    return Err(WorkbenchError::training(
                        TrainingFailure::UnsupportedArchitecture,
                        format!("input {:?} is too small for kernel size {}", shape, p.kernel_size),
                    ));
                }
                model
                    .push(Conv2d::new(shape[2], filters, p.kernel_size, rng))
                    .push(ActivationLayer::new(p.activation));
                let shape = model.output_shape();
                if p.pool_size > 1 && shape[0] >= p.pool_size && shape[1] >= p.pool_size {
                    model.push(MaxPool2d::new(p.pool_size));
                }
            }
            model.push(Flatten::new());
            let input = width(&model);
            model
                .push(Dense::new(input, p.dense_units, rng))
                .push(ActivationLayer::new(p.activation));
            if p.dropout > 0.0 {
                model.push(Dropout::new(p.dropout));
            }
            model.push(Dense::new(p.dense_units, out_units, rng));
        }
        ModelFamily::LinearRegression(_) | ModelFamily::LogisticRegression(_) => {
            let input = width(&model);
            model.push(Dense::new(input, out_units, rng));
        }
        ModelFamily::Unsupported { declared } => {
            return Err(WorkbenchError::training(
                TrainingFailure::UnsupportedArchitecture,
                format!("model family '{}' cannot be trained by this engine", declared.as_str()),
            ))
        }
    }
    Ok(model)
}
