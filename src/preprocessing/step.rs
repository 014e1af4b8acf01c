//! Recorded pipeline steps

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkbenchError};

/// Transformation a step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    #[serde(alias = "handle-missing")]
    HandleMissing,
    Normalize,
    Scale,
    #[serde(alias = "encode-categorical")]
    EncodeCategorical,
    Split,
    #[serde(alias = "clip-outliers")]
    ClipOutliers,
    #[serde(alias = "drop-columns")]
    DropColumns,
    #[serde(alias = "reorder-columns")]
    ReorderColumns,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::HandleMissing => "handle_missing",
            StepType::Normalize => "normalize",
            StepType::Scale => "scale",
            StepType::EncodeCategorical => "encode_categorical",
            StepType::Split => "split",
            StepType::ClipOutliers => "clip_outliers",
            StepType::DropColumns => "drop_columns",
            StepType::ReorderColumns => "reorder_columns",
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable entry of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
}

impl Step {
    /// New step with a fresh id, ordered after existing steps by the caller
    pub fn new(step_type: StepType, parameters: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            step_type,
            parameters,
            order: 0,
            applied_at: None,
        }
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    /// Decode the parameter object into a typed parameter struct
    pub(crate) fn params<P: DeserializeOwned>(&self) -> Result<P> {
        let value = match &self.parameters {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|e| {
            WorkbenchError::pipeline_step(self.step_type.as_str(), None, format!("invalid parameters: {}", e))
        })
    }

    /// Copy of this step carrying resolved parameters
    pub(crate) fn resolved<P: Serialize>(&self, params: &P, applied_at: DateTime<Utc>) -> Result<Step> {
        Ok(Step {
            id: self.id.clone(),
            step_type: self.step_type,
            parameters: serde_json::to_value(params)?,
            order: self.order,
            applied_at: Some(self.applied_at.unwrap_or(applied_at)),
        })
    }
}
