//! Per-epoch history and final training metrics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of training history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub loss: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Summary of a finished (or cancelled) run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub final_loss: f64,
    pub final_accuracy: Option<f64>,
    pub validation_loss: Option<f64>,
    pub validation_accuracy: Option<f64>,
    /// Wall-clock seconds
    pub training_time: f64,
    pub epochs: usize,
}

impl TrainingMetrics {
    /// Metrics taken from the last recorded epoch
    pub fn from_history(history: &[EpochRecord], training_time: f64) -> Self {
        match history.last() {
            Some(last) => Self {
                final_loss: last.loss,
                final_accuracy: last.accuracy,
                validation_loss: last.validation_loss,
                validation_accuracy: last.validation_accuracy,
                training_time,
                epochs: history.len(),
            },
            None => Self {
                final_loss: f64::NAN,
                final_accuracy: None,
                validation_loss: None,
                validation_accuracy: None,
                training_time,
                epochs: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_history_uses_last_epoch() {
        let history = vec![
            EpochRecord {
                epoch: 1,
                loss: 0.9,
                accuracy: Some(0.5),
                validation_loss: None,
                validation_accuracy: None,
                timestamp: Utc::now(),
            },
            EpochRecord {
                epoch: 2,
                loss: 0.4,
                accuracy: Some(0.8),
                validation_loss: Some(0.5),
                validation_accuracy: Some(0.75),
                timestamp: Utc::now(),
            },
        ];
        let m = TrainingMetrics::from_history(&history, 1.5);
        assert_eq!(m.final_loss, 0.4);
        assert_eq!(m.validation_accuracy, Some(0.75));
        assert_eq!(m.epochs, 2);
    }

    #[test]
    fn test_empty_history() {
        let m = TrainingMetrics::from_history(&[], 0.0);
        assert_eq!(m.epochs, 0);
        assert!(m.final_loss.is_nan());
    }
}
