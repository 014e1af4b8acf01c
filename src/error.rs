//! Error types for the Kolosal workbench engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ModelVersion;

/// Result type alias for workbench operations
pub type Result<T> = std::result::Result<T, WorkbenchError>;

/// Classification of a failure raised while building or fitting a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingFailure {
    /// The tensor runtime could not be used
    RuntimeUnavailable,
    /// Data produced NaN/Infinity during fitting
    NonNumericData,
    /// Input tensors exceed the configured element budget
    DatasetTooLarge,
    /// The requested model family cannot be trained by this engine
    UnsupportedArchitecture,
    /// Anything else
    Unknown,
}

impl TrainingFailure {
    /// Sanitized, user-facing description of the failure category
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RuntimeUnavailable => {
                "The tensor runtime is unavailable. Reload the workbench and try again."
            }
            Self::NonNumericData => {
                "Training produced invalid numbers. Check that the dataset is numeric and normalized."
            }
            Self::DatasetTooLarge => {
                "The dataset is too large to train in the workbench. Reduce rows or features."
            }
            Self::UnsupportedArchitecture => {
                "The selected model type is not supported by the training engine."
            }
            Self::Unknown => "Training failed unexpectedly. See job details for diagnostics.",
        }
    }
}

impl std::fmt::Display for TrainingFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RuntimeUnavailable => "runtime unavailable",
            Self::NonNumericData => "non-numeric data",
            Self::DatasetTooLarge => "dataset too large",
            Self::UnsupportedArchitecture => "unsupported architecture",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Main error type for the workbench engine
#[derive(Error, Debug)]
pub enum WorkbenchError {
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Dataset access error: {0}")]
    DatasetAccess(String),

    #[error("Pipeline step '{step}' failed{}: {reason}", on_column(.column))]
    PipelineStep {
        step: String,
        column: Option<String>,
        reason: String,
    },

    #[error("Insufficient features: found {found} numeric column(s), need at least 2")]
    InsufficientFeatures { found: usize },

    #[error("Training error ({kind}): {detail}")]
    TrainingRuntime { kind: TrainingFailure, detail: String },

    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        /// The trained version, with metrics, that could not be saved
        version: Box<ModelVersion>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn on_column(column: &Option<String>) -> String {
    column
        .as_ref()
        .map(|c| format!(" on column '{}'", c))
        .unwrap_or_default()
}

impl WorkbenchError {
    pub fn pipeline_step(
        step: impl Into<String>,
        column: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        WorkbenchError::PipelineStep {
            step: step.into(),
            column: column.map(str::to_string),
            reason: reason.into(),
        }
    }

    pub fn training(kind: TrainingFailure, detail: impl Into<String>) -> Self {
        WorkbenchError::TrainingRuntime {
            kind,
            detail: detail.into(),
        }
    }

    /// Human-readable message safe to show in the UI
    pub fn user_message(&self) -> String {
        match self {
            Self::DependencyUnavailable(_) => TrainingFailure::RuntimeUnavailable.user_message().to_string(),
            Self::DatasetAccess(_) => "The dataset could not be downloaded or parsed.".to_string(),
            // Step failures are surfaced verbatim so the user can fix the pipeline
            Self::PipelineStep { .. } | Self::InsufficientFeatures { .. } => self.to_string(),
            Self::TrainingRuntime { kind, .. } => kind.user_message().to_string(),
            Self::Persistence { .. } => {
                "The model trained successfully but could not be saved.".to_string()
            }
            Self::NotFound(what) => format!("Not found: {}", what),
            Self::InvalidParameter { .. } => self.to_string(),
            Self::Backend(_) | Self::Serialization(_) | Self::Io(_) => {
                "An internal error occurred. See job details for diagnostics.".to_string()
            }
        }
    }

    /// Opaque diagnostics blob retained alongside failed records
    pub fn details(&self) -> serde_json::Value {
        let kind = match self {
            Self::DependencyUnavailable(_) => "dependency_unavailable",
            Self::DatasetAccess(_) => "dataset_access",
            Self::PipelineStep { .. } => "pipeline_step",
            Self::InsufficientFeatures { .. } => "insufficient_features",
            Self::TrainingRuntime { .. } => "training_runtime",
            Self::Persistence { .. } => "persistence",
            Self::NotFound(_) => "not_found",
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::Backend(_) => "backend",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        };
        let mut details = serde_json::json!({
            "kind": kind,
            "error": self.to_string(),
        });
        if let Self::TrainingRuntime { kind, detail } = self {
            details["category"] = serde_json::json!(kind);
            details["raw"] = serde_json::json!(detail);
        }
        if let Self::PipelineStep { step, column, .. } = self {
            details["step"] = serde_json::json!(step);
            details["column"] = serde_json::json!(column);
        }
        details
    }

    /// Fatal errors end the job; a persistence failure keeps the trained result
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Persistence { .. })
    }
}

impl From<serde_json::Error> for WorkbenchError {
    fn from(err: serde_json::Error) -> Self {
        WorkbenchError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for WorkbenchError {
    fn from(err: ndarray::ShapeError) -> Self {
        WorkbenchError::training(TrainingFailure::Unknown, format!("invalid tensor shape: {}", err))
    }
}

impl From<polars::error::PolarsError> for WorkbenchError {
    fn from(err: polars::error::PolarsError) -> Self {
        WorkbenchError::DatasetAccess(err.to_string())
    }
}

impl From<image::ImageError> for WorkbenchError {
    fn from(err: image::ImageError) -> Self {
        WorkbenchError::DatasetAccess(format!("image decode failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkbenchError::DatasetAccess("timeout".to_string());
        assert_eq!(err.to_string(), "Dataset access error: timeout");
    }

    #[test]
    fn test_pipeline_step_names_column() {
        let err = WorkbenchError::pipeline_step("normalize", Some("city"), "column is not numeric");
        assert_eq!(
            err.to_string(),
            "Pipeline step 'normalize' failed on column 'city': column is not numeric"
        );
        assert_eq!(err.user_message(), err.to_string());

        let err = WorkbenchError::pipeline_step("split", None, "fractions sum to 0.9");
        assert_eq!(err.to_string(), "Pipeline step 'split' failed: fractions sum to 0.9");
    }

    #[test]
    fn test_training_error_is_sanitized() {
        let err = WorkbenchError::training(TrainingFailure::NonNumericData, "loss=NaN at epoch 3");
        assert!(!err.user_message().contains("NaN at epoch"));
        let details = err.details();
        assert_eq!(details["category"], "non_numeric_data");
        assert_eq!(details["raw"], "loss=NaN at epoch 3");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WorkbenchError = io_err.into();
        assert!(matches!(err, WorkbenchError::Io(_)));
        assert!(err.is_fatal());
    }
}
