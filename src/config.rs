//! Engine-wide configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, WorkbenchError};

/// Which collaborator backend the CLI wires the engine to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process, lost on exit
    Memory,
    /// JSON records under `data_dir`
    LocalFs,
}

/// Configuration for the workbench engine
///
/// `Default` reads the `WORKBENCH_*` environment variables noted on each field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkbenchConfig {
    /// Root directory for the local filesystem backend (`WORKBENCH_DATA_DIR`)
    pub data_dir: PathBuf,

    /// Backend used by the CLI (`WORKBENCH_BACKEND`)
    pub backend: BackendKind,

    /// Threads for the tensor runtime pool, None = rayon default (`WORKBENCH_THREADS`)
    pub num_threads: Option<usize>,

    /// Tensor runtime backend name; only "cpu" is available (`WORKBENCH_RUNTIME`)
    pub runtime_backend: String,

    /// Upper bound on feature tensor elements before training is refused
    /// (`WORKBENCH_MAX_ELEMENTS`)
    pub max_tensor_elements: usize,

    /// Seed used when a request does not carry its own random state
    pub default_random_state: u64,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::var("WORKBENCH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./workbench-data")),
            backend: match std::env::var("WORKBENCH_BACKEND").as_deref() {
                Ok("memory") => BackendKind::Memory,
                _ => BackendKind::LocalFs,
            },
            num_threads: std::env::var("WORKBENCH_THREADS")
                .ok()
                .and_then(|v| v.parse().ok()),
            runtime_backend: std::env::var("WORKBENCH_RUNTIME").unwrap_or_else(|_| "cpu".to_string()),
            max_tensor_elements: std::env::var("WORKBENCH_MAX_ELEMENTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50_000_000),
            default_random_state: 42,
        }
    }
}

impl WorkbenchConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Builder method to set the data directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Builder method to set the backend
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Builder method to set number of runtime threads
    pub fn with_num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    /// Builder method to set the tensor element budget
    pub fn with_max_tensor_elements(mut self, n: usize) -> Self {
        self.max_tensor_elements = n;
        self
    }

    /// Builder method to pick the tensor runtime backend
    pub fn with_runtime_backend(mut self, backend: impl Into<String>) -> Self {
        self.runtime_backend = backend.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_tensor_elements == 0 {
            return Err(WorkbenchError::InvalidParameter {
                name: "max_tensor_elements".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.num_threads == Some(0) {
            return Err(WorkbenchError::InvalidParameter {
                name: "num_threads".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_pattern() {
        let config = WorkbenchConfig::new()
            .with_data_dir("/tmp/wb")
            .with_backend(BackendKind::Memory)
            .with_num_threads(2)
            .with_max_tensor_elements(1000);

        assert_eq!(config.data_dir, PathBuf::from("/tmp/wb"));
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.num_threads, Some(2));
        assert_eq!(config.max_tensor_elements, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let config = WorkbenchConfig::new().with_max_tensor_elements(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workbench.json");
        let config = WorkbenchConfig::new().with_data_dir(dir.path()).with_num_threads(3);
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        let loaded = WorkbenchConfig::from_file(&path).unwrap();
        assert_eq!(loaded.num_threads, Some(3));
        assert_eq!(loaded.data_dir, dir.path());
    }
}
