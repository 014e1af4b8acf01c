//! Layer composition

use ndarray::ArrayD;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::layers::{layer_from_spec, ForwardCtx, Layer, LayerSpec, Param, WeightTensor};
use crate::error::{Result, TrainingFailure, WorkbenchError};

/// Serializable topology of a [`Sequential`] model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    /// Per-sample input shape, e.g. `[features]` or `[H, W, C]`
    pub input_shape: Vec<usize>,
    pub layers: Vec<LayerSpec>,
}

impl Architecture {
    /// Number of scalar inputs per sample
    pub fn input_width(&self) -> usize {
        self.input_shape.iter().product()
    }
}

/// Ordered stack of layers
#[derive(Debug)]
pub struct Sequential {
    input_shape: Vec<usize>,
    layers: Vec<Box<dyn Layer>>,
}

impl Sequential {
    pub fn new(input_shape: Vec<usize>) -> Self {
        Self {
            input_shape,
            layers: Vec::new(),
        }
    }

    /// Append a layer
    pub fn push(&mut self, layer: impl Layer + 'static) -> &mut Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    /// Per-sample shape produced by the current top of the stack
    pub fn output_shape(&self) -> Vec<usize> {
        self.layers
            .iter()
            .fold(self.input_shape.clone(), |shape, layer| layer.output_shape(&shape))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn forward(&mut self, x: ArrayD<f64>, ctx: &mut ForwardCtx<'_>) -> Result<ArrayD<f64>> {
        self.layers
            .iter_mut()
            .try_fold(x, |acc, layer| layer.forward(acc, ctx))
    }

    pub fn backward(&mut self, grad: ArrayD<f64>) -> Result<ArrayD<f64>> {
        self.layers
            .iter_mut()
            .rev()
            .try_fold(grad, |acc, layer| layer.backward(acc))
    }

    /// Inference-mode forward pass
    pub fn predict(&mut self, x: ArrayD<f64>) -> Result<ArrayD<f64>> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let mut ctx = ForwardCtx {
            training: false,
            rng: &mut rng,
        };
        self.forward(x, &mut ctx)
    }

    pub fn params(&mut self) -> Vec<Param<'_>> {
        self.layers.iter_mut().flat_map(|l| l.params()).collect()
    }

    pub fn param_count(&mut self) -> usize {
        self.params().iter().map(|p| p.value.len()).sum()
    }

    pub fn architecture(&self) -> Architecture {
        Architecture {
            input_shape: self.input_shape.clone(),
            layers: self.layers.iter().map(|l| l.spec()).collect(),
        }
    }

    /// All weights, names prefixed with the layer index
    pub fn weights(&self) -> Vec<WeightTensor> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| {
                layer.weights().into_iter().map(move |mut w| {
                    w.name = format!("layer_{}/{}", i, w.name);
                    w
                })
            })
            .collect()
    }

    /// Rebuild a model from its topology and weights
    pub fn from_architecture(arch: &Architecture, weights: &[WeightTensor]) -> Result<Self> {
        let mut model = Self::new(arch.input_shape.clone());
        for (i, spec) in arch.layers.iter().enumerate() {
            let mut layer = layer_from_spec(spec);
            let prefix = format!("layer_{}/", i);
            let stripped: Vec<WeightTensor> = weights
                .iter()
                .filter_map(|w| {
                    w.name.strip_prefix(&prefix).map(|name| WeightTensor {
                        name: name.to_string(),
                        shape: w.shape.clone(),
                        values: w.values.clone(),
                    })
                })
                .collect();
            let refs: Vec<&WeightTensor> = stripped.iter().collect();
            layer.load_weights(&refs).map_err(|e| {
                WorkbenchError::training(
                    TrainingFailure::Unknown,
                    format!("layer {} ({:?}): {}", i, spec, e),
                )
            })?;
            model.layers.push(layer);
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::layers::{Activation, ActivationLayer, Dense};
    use ndarray::array;

    fn small_model() -> Sequential {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let mut model = Sequential::new(vec![2]);
        model
            .push(Dense::new(2, 4, &mut rng))
            .push(ActivationLayer::new(Activation::Tanh))
            .push(Dense::new(4, 1, &mut rng));
        model
    }

    #[test]
    fn test_output_shape() {
        let model = small_model();
        assert_eq!(model.output_shape(), vec![1]);
        assert_eq!(model.len(), 3);
    }

    #[test]
    fn test_architecture_round_trip_predicts_identically() {
        let mut model = small_model();
        let x = array![[0.1, 0.2], [1.0, -1.0]].into_dyn();
        let before = model.predict(x.clone()).unwrap();

        let arch = model.architecture();
        let json = serde_json::to_string(&arch).unwrap();
        let arch: Architecture = serde_json::from_str(&json).unwrap();
        assert_eq!(arch.input_width(), 2);

        let mut rebuilt = Sequential::from_architecture(&arch, &model.weights()).unwrap();
        let after = rebuilt.predict(x).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_missing_weights_fail() {
        let model = small_model();
        let err = Sequential::from_architecture(&model.architecture(), &[]);
        assert!(err.is_err());
    }
}
