//! Gradient-based parameter updates

use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

use super::layers::Param;

/// Update rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Plain stochastic gradient descent
    Sgd,
    /// SGD with momentum
    Momentum { momentum: f64 },
    /// Adam
    Adam { beta1: f64, beta2: f64, epsilon: f64 },
}

impl Default for OptimizerKind {
    fn default() -> Self {
        Self::Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

/// Stateful optimizer; slot state is allocated lazily on the first step
#[derive(Debug, Clone)]
pub struct Optimizer {
    kind: OptimizerKind,
    learning_rate: f64,
    step: u64,
    slots: Vec<(ArrayD<f64>, ArrayD<f64>)>,
}

impl Optimizer {
    pub fn new(kind: OptimizerKind, learning_rate: f64) -> Self {
        Self {
            kind,
            learning_rate,
            step: 0,
            slots: Vec::new(),
        }
    }

    pub fn steps(&self) -> u64 {
        self.step
    }

    /// Apply one update to every parameter, in model order
    pub fn apply(&mut self, params: Vec<Param<'_>>) {
        self.step += 1;
        if self.slots.len() != params.len() {
            self.slots = params
                .iter()
                .map(|p| (ArrayD::zeros(p.value.raw_dim()), ArrayD::zeros(p.value.raw_dim())))
                .collect();
        }

        let lr = self.learning_rate;
        let kind = self.kind;
        let t = self.step as f64;

        for (Param { mut value, grad }, (m, v)) in params.into_iter().zip(self.slots.iter_mut()) {
            match kind {
                OptimizerKind::Sgd => {
                    Zip::from(&mut value).and(&grad).for_each(|p, &g| *p -= lr * g);
                }
                OptimizerKind::Momentum { momentum } => {
                    Zip::from(&mut value)
                        .and(&grad)
                        .and(m)
                        .for_each(|p, &g, vel| {
                            *vel = momentum * *vel - lr * g;
                            *p += *vel;
                        });
                }
                OptimizerKind::Adam {
                    beta1,
                    beta2,
                    epsilon,
                } => {
                    let bc1 = 1.0 - beta1.powf(t);
                    let bc2 = 1.0 - beta2.powf(t);
                    Zip::from(&mut value)
                        .and(&grad)
                        .and(m)
                        .and(v)
                        .for_each(|p, &g, m, v| {
                            *m = beta1 * *m + (1.0 - beta1) * g;
                            *v = beta2 * *v + (1.0 - beta2) * g * g;
                            let m_hat = *m / bc1;
                            let v_hat = *v / bc2;
                            *p -= lr * m_hat / (v_hat.sqrt() + epsilon);
                        });
                }
            }
        }
    }
}
