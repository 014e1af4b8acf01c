//! Kolosal Workbench - training orchestration and model versioning
//!
//! The training core of the Kolosal ML workbench. Given a dataset and a
//! recorded preprocessing pipeline it:
//! - replays the pipeline deterministically against the raw data
//! - extracts numeric feature/label tensors under an explicit label rule
//! - trains a neural network, convolutional or linear model while reporting
//!   progress
//! - stores the result as an immutable, lineage-tracked model version
//!
//! # Modules
//!
//! ## Engine
//! - [`orchestrator`] - Training requests, progress reporting, the engine facade
//! - [`registry`] - Model versions, comparison, statistics
//! - [`backend`] - Dataset, pipeline, job and model stores
//!
//! ## Data
//! - [`data`] - Cell tables and CSV loading
//! - [`preprocessing`] - Pipeline step interpreter
//! - [`features`] - Tabular and image tensor extraction
//!
//! ## Training
//! - [`training`] - Model families, training driver, artifacts
//! - [`runtime`] - CPU tensor runtime: layers, losses, optimizers
//!
//! ## Services
//! - [`cli`] - Command-line interface

// Core error handling and configuration
pub mod config;
pub mod error;

// Data
pub mod data;
pub mod features;
pub mod preprocessing;

// Training
pub mod runtime;
pub mod training;

// Engine
pub mod backend;
pub mod orchestrator;
pub mod registry;

// Services
pub mod cli;

pub use config::WorkbenchConfig;
pub use error::{Result, WorkbenchError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, TrainingFailure, WorkbenchError};

    // Configuration
    pub use crate::config::{BackendKind, WorkbenchConfig};

    // Data
    pub use crate::data::{Cell, Column, DataLoader, Subset, Table};

    // Preprocessing
    pub use crate::preprocessing::{PipelineInterpreter, Step, StepType, TransformedData};

    // Features
    pub use crate::features::{
        ExtractedTensors, FeatureExtractor, ImageConfig, ImagePreprocessor, LabelSelection,
    };

    // Training
    pub use crate::training::{ModelArtifact, ModelFamily, TrainingConfig, TrainingDriver};

    // Registry
    pub use crate::registry::{
        ExportFormat, ModelComparison, ModelStatistics, ModelStatus, ModelVersion,
        ModelVersionStore,
    };

    // Backends
    pub use crate::backend::{
        DatasetRecord, DatasetStore, JobStore, LocalFsBackend, MemoryBackend, ModelBackend,
        PipelineRecord, PipelineStore,
    };

    // Orchestration
    pub use crate::orchestrator::{
        CancellationFlag, ProgressEvent, TrainingEngine, TrainingRequest,
    };
}
