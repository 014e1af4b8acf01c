//! Training requests

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkbenchError};
use crate::features::{ImageConfig, LabelSelection};

/// What to train, on which data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub dataset_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    pub model_type: String,
    #[serde(default)]
    pub hyperparameters: serde_json::Value,
    /// Holdout fractions used when the pipeline has no split step
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_validation_size")]
    pub validation_size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_state: Option<u64>,
    #[serde(default)]
    pub label: LabelSelection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Geometry for image datasets
    #[serde(default)]
    pub image: ImageConfig,
}

fn default_test_size() -> f64 {
    0.2
}

fn default_validation_size() -> f64 {
    0.1
}

impl TrainingRequest {
    pub fn new(dataset_id: impl Into<String>, model_type: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            pipeline_id: None,
            model_type: model_type.into(),
            hyperparameters: serde_json::Value::Null,
            test_size: default_test_size(),
            validation_size: default_validation_size(),
            random_state: None,
            label: LabelSelection::default(),
            name: None,
            image: ImageConfig::default(),
        }
    }

    pub fn with_pipeline(mut self, pipeline_id: impl Into<String>) -> Self {
        self.pipeline_id = Some(pipeline_id.into());
        self
    }

    pub fn with_hyperparameters(mut self, params: serde_json::Value) -> Self {
        self.hyperparameters = params;
        self
    }

    pub fn with_split(mut self, test_size: f64, validation_size: f64) -> Self {
        self.test_size = test_size;
        self.validation_size = validation_size;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_label(mut self, label: LabelSelection) -> Self {
        self.label = label;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_image_config(mut self, image: ImageConfig) -> Self {
        self.image = image;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("test_size", self.test_size), ("validation_size", self.validation_size)] {
            if !(0.0..1.0).contains(&value) {
                return Err(WorkbenchError::InvalidParameter {
                    name: name.to_string(),
                    value: value.to_string(),
                    reason: "must be in [0, 1)".to_string(),
                });
            }
        }
        if self.train_fraction() < 1e-9 {
            return Err(WorkbenchError::InvalidParameter {
                name: "test_size + validation_size".to_string(),
                value: (self.test_size + self.validation_size).to_string(),
                reason: "no rows would be left for training".to_string(),
            });
        }
        if self.image.width == 0 || self.image.height == 0 {
            return Err(WorkbenchError::InvalidParameter {
                name: "image".to_string(),
                value: format!("{}x{}", self.image.width, self.image.height),
                reason: "image size must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn train_fraction(&self) -> f64 {
        1.0 - self.test_size - self.validation_size
    }
}
