//! Tensor runtime adapter
//!
//! Owns the numeric execution context (a dedicated rayon pool) and exposes the
//! three primitives the training driver needs:
//! - tensor construction with shape validation
//! - layer composition via [`Sequential`]
//! - a single optimizer step ([`TensorRuntime::train_step`]) and batched evaluation
//!
//! The runtime is created lazily through [`RuntimeHandle`]. A failed
//! initialization is cached and reported as `DependencyUnavailable` on every
//! later access.

pub mod layers;
mod loss;
mod optimizer;
mod sequential;

pub use layers::{
    Activation, ActivationLayer, Conv2d, Dense, Dropout, Flatten, ForwardCtx, Layer, LayerSpec,
    MaxPool2d, Param, WeightTensor,
};
pub use loss::Loss;
pub use optimizer::{Optimizer, OptimizerKind};
pub use sequential::{Architecture, Sequential};

use ndarray::{concatenate, Array1, Array2, Array4, ArrayD, Axis, Ix2, IxDyn, Slice};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use crate::error::{Result, TrainingFailure, WorkbenchError};

/// Options used when the runtime is first initialized
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub backend: String,
    pub num_threads: Option<usize>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            backend: "cpu".to_string(),
            num_threads: None,
        }
    }
}

/// Loss and optional accuracy over a dataset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: Option<f64>,
}

/// Initialized numeric execution context
pub struct TensorRuntime {
    backend: String,
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for TensorRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorRuntime")
            .field("backend", &self.backend)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl TensorRuntime {
    fn initialize(options: &RuntimeOptions) -> std::result::Result<Self, String> {
        if options.backend != "cpu" {
            return Err(format!("tensor backend '{}' is not available", options.backend));
        }
        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("workbench-tensor-{}", i));
        if let Some(n) = options.num_threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| format!("failed to start tensor thread pool: {}", e))?;

        info!(
            backend = %options.backend,
            threads = pool.current_num_threads(),
            "tensor runtime initialized"
        );
        Ok(Self {
            backend: options.backend.clone(),
            pool,
        })
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Row-major `[rows, cols]` tensor
    pub fn tensor2(&self, data: Vec<f64>, rows: usize, cols: usize) -> Result<Array2<f64>> {
        Array2::from_shape_vec((rows, cols), data).map_err(|e| {
            WorkbenchError::training(
                TrainingFailure::Unknown,
                format!("cannot build [{}, {}] tensor: {}", rows, cols, e),
            )
        })
    }

    /// NHWC `[n, h, w, c]` tensor
    pub fn tensor4(&self, data: Vec<f64>, shape: [usize; 4]) -> Result<Array4<f64>> {
        Array4::from_shape_vec((shape[0], shape[1], shape[2], shape[3]), data).map_err(|e| {
            WorkbenchError::training(
                TrainingFailure::Unknown,
                format!("cannot build {:?} tensor: {}", shape, e),
            )
        })
    }

    /// One forward/backward/update pass over a batch; returns the batch loss
    pub fn train_step(
        &self,
        model: &mut Sequential,
        optimizer: &mut Optimizer,
        loss: Loss,
        x: ArrayD<f64>,
        y: &Array1<f64>,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Result<f64> {
        self.pool.install(|| {
            let mut ctx = ForwardCtx { training: true, rng };
            let logits = model.forward(x, &mut ctx)?.into_dimensionality::<Ix2>()?;
            let (value, grad) = loss.evaluate(&logits, y);
            if !value.is_finite() {
                return Err(WorkbenchError::training(
                    TrainingFailure::NonNumericData,
                    format!("batch loss became {}", value),
                ));
            }
            model.backward(grad.into_dyn())?;
            optimizer.apply(model.params());
            Ok(value)
        })
    }

    /// Inference over `x` in batches; returns raw logits
    pub fn predict(&self, model: &mut Sequential, x: &ArrayD<f64>, batch_size: usize) -> Result<Array2<f64>> {
        let n = x.shape().first().copied().unwrap_or(0);
        let batch_size = batch_size.max(1);
        self.pool.install(|| {
            let mut outputs = Vec::new();
            let mut start = 0;
            while start < n {
                let end = (start + batch_size).min(n);
                let batch = x.slice_axis(Axis(0), Slice::from(start..end)).to_owned();
                outputs.push(model.predict(batch)?.into_dimensionality::<Ix2>()?);
                start = end;
            }
            if outputs.is_empty() {
                let width: usize = model.output_shape().iter().product();
                return Ok(Array2::zeros((0, width)));
            }
            let views: Vec<_> = outputs.iter().map(|a| a.view()).collect();
            Ok(concatenate(Axis(0), &views)?)
        })
    }

    /// Loss and accuracy of `model` on `(x, y)`
    pub fn evaluate(
        &self,
        model: &mut Sequential,
        loss: Loss,
        x: &ArrayD<f64>,
        y: &Array1<f64>,
        batch_size: usize,
    ) -> Result<Evaluation> {
        let logits = self.predict(model, x, batch_size)?;
        let (value, _) = loss.evaluate(&logits, y);
        Ok(Evaluation {
            loss: value,
            accuracy: loss.accuracy(&logits, y),
        })
    }

    /// Gather rows of a batch-first tensor
    pub fn gather(&self, x: &ArrayD<f64>, indices: &[usize]) -> Result<ArrayD<f64>> {
        let mut shape = x.shape().to_vec();
        if shape.is_empty() {
            return Err(WorkbenchError::training(TrainingFailure::Unknown, "cannot gather from a scalar"));
        }
        shape[0] = indices.len();
        let row_width: usize = x.shape().iter().skip(1).product();
        let mut data = Vec::with_capacity(indices.len() * row_width);
        for &i in indices {
            data.extend(x.index_axis(Axis(0), i).iter().copied());
        }
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), data)?)
    }
}

/// Lazily-initialized handle to the tensor runtime
pub struct RuntimeHandle {
    options: RuntimeOptions,
    cell: OnceLock<std::result::Result<Arc<TensorRuntime>, String>>,
}

impl RuntimeHandle {
    pub fn new(options: RuntimeOptions) -> Self {
        Self {
            options,
            cell: OnceLock::new(),
        }
    }

    /// Initialize on first use
    pub fn get(&self) -> Result<Arc<TensorRuntime>> {
        let state = self.cell.get_or_init(|| {
            TensorRuntime::initialize(&self.options)
                .map(Arc::new)
                .map_err(|msg| {
                    warn!(error = %msg, "tensor runtime failed to initialize");
                    msg
                })
        });
        match state {
            Ok(runtime) => Ok(Arc::clone(runtime)),
            Err(msg) => Err(WorkbenchError::DependencyUnavailable(msg.clone())),
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.cell.get(), Some(Ok(_)))
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("options", &self.options)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
