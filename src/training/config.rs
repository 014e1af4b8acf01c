//! Model families and training configuration

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkbenchError};
use crate::runtime::{Activation, Loss, OptimizerKind};

/// Families the workbench can declare but this engine does not train
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredFamily {
    RandomForest,
    GradientBoosting,
    DecisionTree,
    Svm,
    Knn,
    NaiveBayes,
    Xgboost,
    Kmeans,
}

impl DeclaredFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RandomForest => "random_forest",
            Self::GradientBoosting => "gradient_boosting",
            Self::DecisionTree => "decision_tree",
            Self::Svm => "svm",
            Self::Knn => "knn",
            Self::NaiveBayes => "naive_bayes",
            Self::Xgboost => "xgboost",
            Self::Kmeans => "kmeans",
        }
    }
}

/// Multi-layer perceptron hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuralNetworkParams {
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    pub dropout: f64,
    pub optimizer: OptimizerKind,
    pub loss: Loss,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
}

impl Default for NeuralNetworkParams {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64, 32],
            activation: Activation::Relu,
            dropout: 0.0,
            optimizer: OptimizerKind::default(),
            loss: Loss::MeanSquaredError,
            learning_rate: 0.001,
            epochs: 50,
            batch_size: 32,
        }
    }
}

/// Small CNN: conv/pool blocks, one dense layer, output layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvolutionalParams {
    pub filters: Vec<usize>,
    pub kernel_size: usize,
    pub pool_size: usize,
    pub dense_units: usize,
    pub activation: Activation,
    pub dropout: f64,
    pub optimizer: OptimizerKind,
    pub loss: Loss,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
}

impl Default for ConvolutionalParams {
    fn default() -> Self {
        Self {
            filters: vec![8, 16],
            kernel_size: 3,
            pool_size: 2,
            dense_units: 32,
            activation: Activation::Relu,
            dropout: 0.0,
            optimizer: OptimizerKind::default(),
            loss: Loss::CategoricalCrossentropy,
            learning_rate: 0.001,
            epochs: 10,
            batch_size: 32,
        }
    }
}

/// Linear and logistic regression, fitted by gradient descent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearParams {
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub optimizer: OptimizerKind,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            epochs: 100,
            batch_size: 32,
            optimizer: OptimizerKind::default(),
        }
    }
}

/// What to train
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ModelFamily {
    NeuralNetwork(NeuralNetworkParams),
    Convolutional(ConvolutionalParams),
    LinearRegression(LinearParams),
    LogisticRegression(LinearParams),
    Unsupported { declared: DeclaredFamily },
}

/// Loop settings shared by every trainable family
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub optimizer: OptimizerKind,
}

impl ModelFamily {
    /// Build a family from the workbench's `model_type` string and hyperparameter object
    pub fn from_model_type(model_type: &str, hyperparameters: &serde_json::Value) -> Result<Self> {
        let params = match hyperparameters {
            serde_json::Value::Null => serde_json::json!({}),
            other => other.clone(),
        };
        let invalid = |e: serde_json::Error| WorkbenchError::InvalidParameter {
            name: "hyperparameters".to_string(),
            value: params.to_string(),
            reason: e.to_string(),
        };
        let normalized = model_type.trim().to_ascii_lowercase().replace('-', "_");
        let family = match normalized.as_str() {
            "neural_network" | "mlp" | "dense" => {
                ModelFamily::NeuralNetwork(serde_json::from_value(params.clone()).map_err(invalid)?)
            }
            "convolutional" | "cnn" => {
                ModelFamily::Convolutional(serde_json::from_value(params.clone()).map_err(invalid)?)
            }
            "linear_regression" => {
                ModelFamily::LinearRegression(serde_json::from_value(params.clone()).map_err(invalid)?)
            }
            "logistic_regression" => {
                ModelFamily::LogisticRegression(serde_json::from_value(params.clone()).map_err(invalid)?)
            }
            other => match serde_json::from_value::<DeclaredFamily>(serde_json::json!(other)) {
                Ok(declared) => ModelFamily::Unsupported { declared },
                Err(_) => {
                    return Err(WorkbenchError::InvalidParameter {
                        name: "model_type".to_string(),
                        value: model_type.to_string(),
                        reason: "unknown model family".to_string(),
                    })
                }
            },
        };
        Ok(family)
    }

    pub fn model_type(&self) -> &'static str {
        match self {
            Self::NeuralNetwork(_) => "neural_network",
            Self::Convolutional(_) => "convolutional",
            Self::LinearRegression(_) => "linear_regression",
            Self::LogisticRegression(_) => "logistic_regression",
            Self::Unsupported { declared } => declared.as_str(),
        }
    }

    /// Hyperparameters as a JSON object, without the family tag
    pub fn parameters(&self) -> serde_json::Value {
        let value = match self {
            Self::NeuralNetwork(p) => serde_json::to_value(p),
            Self::Convolutional(p) => serde_json::to_value(p),
            Self::LinearRegression(p) | Self::LogisticRegression(p) => serde_json::to_value(p),
            Self::Unsupported { .. } => Ok(serde_json::json!({})),
        };
        value.unwrap_or_else(|_| serde_json::json!({}))
    }

    pub fn is_image_model(&self) -> bool {
        matches!(self, Self::Convolutional(_))
    }

    pub fn schedule(&self) -> Option<Schedule> {
        match self {
            Self::NeuralNetwork(p) => Some(Schedule {
                learning_rate: p.learning_rate,
                epochs: p.epochs,
                batch_size: p.batch_size,
                optimizer: p.optimizer,
            }),
            Self::Convolutional(p) => Some(Schedule {
                learning_rate: p.learning_rate,
                epochs: p.epochs,
                batch_size: p.batch_size,
                optimizer: p.optimizer,
            }),
            Self::LinearRegression(p) | Self::LogisticRegression(p) => Some(Schedule {
                learning_rate: p.learning_rate,
                epochs: p.epochs,
                batch_size: p.batch_size,
                optimizer: p.optimizer,
            }),
            Self::Unsupported { .. } => None,
        }
    }

    /// Loss requested by the family; logistic regression picks by class count
    pub fn loss(&self, n_classes: usize) -> Loss {
        match self {
            Self::NeuralNetwork(p) => p.loss,
            Self::Convolutional(p) => p.loss,
            Self::LinearRegression(_) => Loss::MeanSquaredError,
            Self::LogisticRegression(_) if n_classes > 2 => Loss::CategoricalCrossentropy,
            Self::LogisticRegression(_) => Loss::BinaryCrossentropy,
            Self::Unsupported { .. } => Loss::MeanSquaredError,
        }
    }
}

/// Driver-level limits and defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Refuse to build feature tensors larger than this many elements
    pub max_tensor_elements: usize,
    /// Seed for weight init and batch shuffling
    pub random_state: u64,
    /// Batch size for evaluation passes
    pub eval_batch_size: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            max_tensor_elements: 50_000_000,
            random_state: 42,
            eval_batch_size: 256,
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tensor_elements(mut self, n: usize) -> Self {
        self.max_tensor_elements = n;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_eval_batch_size(mut self, n: usize) -> Self {
        self.eval_batch_size = n;
        self
    }
}
