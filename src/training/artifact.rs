//! Serialized trained model

use chrono::{DateTime, Utc};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkbenchError};
use crate::runtime::{Architecture, Loss, Sequential, TensorRuntime, WeightTensor};

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// What the model was trained on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_name: Option<String>,
    pub model_type: String,
    pub loss: Loss,
    /// Original label values, indexed by class id, for classification losses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<f64>>,
    pub epochs_completed: usize,
    pub random_state: u64,
    pub trained_at: DateTime<Utc>,
}

/// Topology, weights and metadata of a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub architecture: Architecture,
    pub weights: Vec<WeightTensor>,
    pub training_metadata: TrainingMetadata,
}

impl ModelArtifact {
    pub fn new(model: &Sequential, training_metadata: TrainingMetadata) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            architecture: model.architecture(),
            weights: model.weights(),
            training_metadata,
        }
    }

    /// Recorded feature names, or `feature_0..n` from the declared input width
    pub fn feature_names(&self) -> Vec<String> {
        match &self.training_metadata.feature_names {
            Some(names) => names.clone(),
            None => (0..self.architecture.input_width())
                .map(|i| format!("feature_{}", i))
                .collect(),
        }
    }

    pub fn label_name(&self) -> String {
        self.training_metadata
            .label_name
            .clone()
            .unwrap_or_else(|| "label".to_string())
    }

    /// Rebuild the trained network
    pub fn to_model(&self) -> Result<Sequential> {
        if self.format_version > ARTIFACT_FORMAT_VERSION {
            return Err(WorkbenchError::Serialization(format!(
                "artifact format {} is newer than supported {}",
                self.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }
        Sequential::from_architecture(&self.architecture, &self.weights)
    }

    /// Activated outputs for flat row-major samples matching the input shape
    pub fn predict(&self, runtime: &TensorRuntime, samples: &[f64]) -> Result<Vec<Vec<f64>>> {
        let width = self.architecture.input_width().max(1);
        if samples.len() % width != 0 {
            return Err(WorkbenchError::InvalidParameter {
                name: "samples".to_string(),
                value: samples.len().to_string(),
                reason: format!("not a multiple of the input width {}", width),
            });
        }
        let mut shape = vec![samples.len() / width];
        shape.extend(&self.architecture.input_shape);
        let x = ArrayD::from_shape_vec(IxDyn(&shape), samples.to_vec())?;

        let mut model = self.to_model()?;
        let logits = runtime.predict(&mut model, &x, 256)?;
        let outputs = self.training_metadata.loss.activate(&logits);
        Ok(outputs.rows().into_iter().map(|r| r.to_vec()).collect())
    }
}
