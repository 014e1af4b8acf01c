//! Trainable layers for the tensor runtime
//!
//! Tensors are `ArrayD<f64>` with the batch on axis 0. Dense layers expect
//! `[N, features]`, convolutional layers expect NHWC `[N, H, W, C]`.

use ndarray::{Array1, Array2, Array4, ArrayD, ArrayViewD, ArrayViewMutD, Axis, Ix2, Ix4, IxDyn, Zip};
use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainingFailure, WorkbenchError};

/// Activation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Rectified Linear Unit
    Relu,
    /// Sigmoid
    Sigmoid,
    /// Hyperbolic tangent
    Tanh,
    /// Linear (identity)
    Linear,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Relu
    }
}

impl Activation {
    fn apply(&self, z: &ArrayD<f64>) -> ArrayD<f64> {
        match self {
            Activation::Relu => z.mapv(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => z.mapv(|v| v.tanh()),
            Activation::Linear => z.clone(),
        }
    }

    /// Derivative expressed in terms of the activation output `a`
    fn derivative(&self, a: &ArrayD<f64>) -> ArrayD<f64> {
        match self {
            Activation::Relu => a.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Sigmoid => a.mapv(|s| s * (1.0 - s)),
            Activation::Tanh => a.mapv(|t| 1.0 - t * t),
            Activation::Linear => ArrayD::ones(a.raw_dim()),
        }
    }
}

/// Serializable description of one layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Dense { input_dim: usize, units: usize },
    Activation { function: Activation },
    Dropout { rate: f64 },
    Conv2d { in_channels: usize, filters: usize, kernel_size: usize },
    MaxPool2d { pool_size: usize },
    Flatten,
}

/// Named weight values of a layer, row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl WeightTensor {
    fn from_array<D: ndarray::Dimension>(name: &str, array: &ndarray::Array<f64, D>) -> Self {
        Self {
            name: name.to_string(),
            shape: array.shape().to_vec(),
            values: array.iter().copied().collect(),
        }
    }
}

/// A parameter and its most recent gradient
pub struct Param<'a> {
    pub value: ArrayViewMutD<'a, f64>,
    pub grad: ArrayViewD<'a, f64>,
}

/// Per-call forward state
pub struct ForwardCtx<'a> {
    pub training: bool,
    pub rng: &'a mut Xoshiro256PlusPlus,
}

/// Layer contract used by [`super::Sequential`]
pub trait Layer: Send + Sync + std::fmt::Debug {
    /// Forward pass; caches what backward needs when `ctx.training` is set
    fn forward(&mut self, x: ArrayD<f64>, ctx: &mut ForwardCtx<'_>) -> Result<ArrayD<f64>>;

    /// Backward pass; stores parameter gradients and returns the input gradient
    fn backward(&mut self, grad: ArrayD<f64>) -> Result<ArrayD<f64>>;

    fn spec(&self) -> LayerSpec;

    /// Per-sample output shape for a per-sample input shape
    fn output_shape(&self, input: &[usize]) -> Vec<usize>;

    fn params(&mut self) -> Vec<Param<'_>> {
        Vec::new()
    }

    fn weights(&self) -> Vec<WeightTensor> {
        Vec::new()
    }

    fn load_weights(&mut self, _weights: &[&WeightTensor]) -> Result<()> {
        Ok(())
    }
}

fn layer_error(detail: String) -> WorkbenchError {
    WorkbenchError::training(TrainingFailure::Unknown, detail)
}

fn missing_forward(layer: &str) -> WorkbenchError {
    layer_error(format!("{} backward called without a training forward pass", layer))
}

fn find_weight<'a>(weights: &[&'a WeightTensor], name: &str, shape: &[usize]) -> Result<&'a WeightTensor> {
    let tensor = weights
        .iter()
        .copied()
        .find(|w| w.name == name)
        .ok_or_else(|| layer_error(format!("missing weight tensor '{}'", name)))?;
    if tensor.shape != shape {
        return Err(layer_error(format!(
            "weight '{}' has shape {:?}, expected {:?}",
            name, tensor.shape, shape
        )));
    }
    Ok(tensor)
}

fn glorot(rng: &mut Xoshiro256PlusPlus, fan_in: usize, fan_out: usize) -> impl FnMut() -> f64 + '_ {
    let scale = (6.0 / (fan_in + fan_out).max(1) as f64).sqrt();
    move || rng.gen::<f64>() * 2.0 * scale - scale
}

/// Fully connected layer
#[derive(Debug, Clone)]
pub struct Dense {
    weights: Array2<f64>,
    bias: Array1<f64>,
    grad_w: Array2<f64>,
    grad_b: Array1<f64>,
    input: Option<Array2<f64>>,
}

impl Dense {
    pub fn new(input_dim: usize, units: usize, rng: &mut Xoshiro256PlusPlus) -> Self {
        let mut init = glorot(rng, input_dim, units);
        let weights = Array2::from_shape_simple_fn((input_dim, units), &mut init);
        Self {
            weights,
            bias: Array1::zeros(units),
            grad_w: Array2::zeros((input_dim, units)),
            grad_b: Array1::zeros(units),
            input: None,
        }
    }

    fn zeroed(input_dim: usize, units: usize) -> Self {
        Self {
            weights: Array2::zeros((input_dim, units)),
            bias: Array1::zeros(units),
            grad_w: Array2::zeros((input_dim, units)),
            grad_b: Array1::zeros(units),
            input: None,
        }
    }
}

impl Layer for Dense {
    fn forward(&mut self, x: ArrayD<f64>, ctx: &mut ForwardCtx<'_>) -> Result<ArrayD<f64>> {
        let x = x.into_dimensionality::<Ix2>()?;
        if x.ncols() != self.weights.nrows() {
            return Err(layer_error(format!(
                "dense layer expects {} inputs, got {}",
                self.weights.nrows(),
                x.ncols()
            )));
        }
        let z = x.dot(&self.weights) + &self.bias;
        if ctx.training {
            self.input = Some(x);
        }
        Ok(z.into_dyn())
    }

    fn backward(&mut self, grad: ArrayD<f64>) -> Result<ArrayD<f64>> {
        let grad = grad.into_dimensionality::<Ix2>()?;
        let input = self.input.as_ref().ok_or_else(|| missing_forward("dense"))?;
        self.grad_w = input.t().dot(&grad);
        self.grad_b = grad.sum_axis(Axis(0));
        Ok(grad.dot(&self.weights.t()).into_dyn())
    }

    fn spec(&self) -> LayerSpec {
        LayerSpec::Dense {
            input_dim: self.weights.nrows(),
            units: self.weights.ncols(),
        }
    }

    fn output_shape(&self, _input: &[usize]) -> Vec<usize> {
        vec![self.weights.ncols()]
    }

    fn params(&mut self) -> Vec<Param<'_>> {
        vec![
            Param {
                value: self.weights.view_mut().into_dyn(),
                grad: self.grad_w.view().into_dyn(),
            },
            Param {
                value: self.bias.view_mut().into_dyn(),
                grad: self.grad_b.view().into_dyn(),
            },
        ]
    }

    fn weights(&self) -> Vec<WeightTensor> {
        vec![
            WeightTensor::from_array("kernel", &self.weights),
            WeightTensor::from_array("bias", &self.bias),
        ]
    }

    fn load_weights(&mut self, weights: &[&WeightTensor]) -> Result<()> {
        let (rows, cols) = self.weights.dim();
        let kernel = find_weight(weights, "kernel", &[rows, cols])?;
        let bias = find_weight(weights, "bias", &[cols])?;
        self.weights = Array2::from_shape_vec((rows, cols), kernel.values.clone())?;
        self.bias = Array1::from(bias.values.clone());
        Ok(())
    }
}

/// Element-wise activation
#[derive(Debug, Clone)]
pub struct ActivationLayer {
    function: Activation,
    output: Option<ArrayD<f64>>,
}

impl ActivationLayer {
    pub fn new(function: Activation) -> Self {
        Self {
            function,
            output: None,
        }
    }
}

impl Layer for ActivationLayer {
    fn forward(&mut self, x: ArrayD<f64>, ctx: &mut ForwardCtx<'_>) -> Result<ArrayD<f64>> {
        let a = self.function.apply(&x);
        if ctx.training {
            self.output = Some(a.clone());
        }
        Ok(a)
    }

    fn backward(&mut self, grad: ArrayD<f64>) -> Result<ArrayD<f64>> {
        let a = self.output.as_ref().ok_or_else(|| missing_forward("activation"))?;
        Ok(grad * self.function.derivative(a))
    }

    fn spec(&self) -> LayerSpec {
        LayerSpec::Activation {
            function: self.function,
        }
    }

    fn output_shape(&self, input: &[usize]) -> Vec<usize> {
        input.to_vec()
    }
}

/// Inverted dropout; identity at inference
#[derive(Debug, Clone)]
pub struct Dropout {
    rate: f64,
    mask: Option<ArrayD<f64>>,
}

impl Dropout {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: rate.clamp(0.0, 0.95),
            mask: None,
        }
    }
}

impl Layer for Dropout {
    fn forward(&mut self, x: ArrayD<f64>, ctx: &mut ForwardCtx<'_>) -> Result<ArrayD<f64>> {
        if !ctx.training || self.rate == 0.0 {
            self.mask = None;
            return Ok(x);
        }
        let keep = 1.0 - self.rate;
        let rng = &mut *ctx.rng;
        let mask = ArrayD::from_shape_simple_fn(x.raw_dim(), || {
            if rng.gen::<f64>() < keep {
                1.0 / keep
            } else {
                0.0
            }
        });
        let out = &x * &mask;
        self.mask = Some(mask);
        Ok(out)
    }

    fn backward(&mut self, grad: ArrayD<f64>) -> Result<ArrayD<f64>> {
        match &self.mask {
            Some(mask) => Ok(grad * mask),
            None => Ok(grad),
        }
    }

    fn spec(&self) -> LayerSpec {
        LayerSpec::Dropout { rate: self.rate }
    }

    fn output_shape(&self, input: &[usize]) -> Vec<usize> {
        input.to_vec()
    }
}

/// Collapses every non-batch axis into one
#[derive(Debug, Clone, Default)]
pub struct Flatten {
    input_shape: Option<Vec<usize>>,
}

impl Flatten {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for Flatten {
    fn forward(&mut self, x: ArrayD<f64>, ctx: &mut ForwardCtx<'_>) -> Result<ArrayD<f64>> {
        let n = x.shape().first().copied().unwrap_or(0);
        let rest: usize = x.shape().iter().skip(1).product();
        if ctx.training {
            self.input_shape = Some(x.shape().to_vec());
        }
        let flat = Array2::from_shape_vec((n, rest), x.iter().copied().collect())?;
        Ok(flat.into_dyn())
    }

    fn backward(&mut self, grad: ArrayD<f64>) -> Result<ArrayD<f64>> {
        let shape = self.input_shape.as_ref().ok_or_else(|| missing_forward("flatten"))?;
        Ok(ArrayD::from_shape_vec(IxDyn(shape), grad.iter().copied().collect())?)
    }

    fn spec(&self) -> LayerSpec {
        LayerSpec::Flatten
    }

    fn output_shape(&self, input: &[usize]) -> Vec<usize> {
        vec![input.iter().product()]
    }
}

/// 2-D convolution over NHWC input, stride 1, valid padding
#[derive(Debug, Clone)]
pub struct Conv2d {
    kernel_size: usize,
    weights: Array4<f64>,
    bias: Array1<f64>,
    grad_w: Array4<f64>,
    grad_b: Array1<f64>,
    input: Option<Array4<f64>>,
}

impl Conv2d {
    pub fn new(in_channels: usize, filters: usize, kernel_size: usize, rng: &mut Xoshiro256PlusPlus) -> Self {
        let fan_in = kernel_size * kernel_size * in_channels;
        let fan_out = kernel_size * kernel_size * filters;
        let mut init = glorot(rng, fan_in, fan_out);
        let shape = (kernel_size, kernel_size, in_channels, filters);
        Self {
            kernel_size,
            weights: Array4::from_shape_simple_fn(shape, &mut init),
            bias: Array1::zeros(filters),
            grad_w: Array4::zeros(shape),
            grad_b: Array1::zeros(filters),
            input: None,
        }
    }

    fn zeroed(in_channels: usize, filters: usize, kernel_size: usize) -> Self {
        let shape = (kernel_size, kernel_size, in_channels, filters);
        Self {
            kernel_size,
            weights: Array4::zeros(shape),
            bias: Array1::zeros(filters),
            grad_w: Array4::zeros(shape),
            grad_b: Array1::zeros(filters),
            input: None,
        }
    }

    fn dims(&self) -> (usize, usize) {
        let (_, _, c, f) = self.weights.dim();
        (c, f)
    }
}

impl Layer for Conv2d {
    fn forward(&mut self, x: ArrayD<f64>, ctx: &mut ForwardCtx<'_>) -> Result<ArrayD<f64>> {
        let x = x.into_dimensionality::<Ix4>()?;
        let (n, h, w, c) = x.dim();
        let (in_channels, filters) = self.dims();
        let k = self.kernel_size;
        if c != in_channels || h < k || w < k {
            return Err(layer_error(format!(
                "conv2d expects [N, >={k}, >={k}, {in_channels}], got [{n}, {h}, {w}, {c}]"
            )));
        }
        let (oh, ow) = (h - k + 1, w - k + 1);
        let mut out = Array4::<f64>::zeros((n, oh, ow, filters));
        let weights = &self.weights;
        let bias = &self.bias;

        Zip::from(out.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut o, xi| {
                for i in 0..oh {
                    for j in 0..ow {
                        for f in 0..filters {
                            let mut acc = bias[f];
                            for di in 0..k {
                                for dj in 0..k {
                                    for ci in 0..c {
                                        acc += xi[[i + di, j + dj, ci]] * weights[[di, dj, ci, f]];
                                    }
                                }
                            }
                            o[[i, j, f]] = acc;
                        }
                    }
                }
            });

        if ctx.training {
            self.input = Some(x);
        }
        Ok(out.into_dyn())
    }

    fn backward(&mut self, grad: ArrayD<f64>) -> Result<ArrayD<f64>> {
        let grad = grad.into_dimensionality::<Ix4>()?;
        let x = self.input.as_ref().ok_or_else(|| missing_forward("conv2d"))?;
        let (n, h, w, c) = x.dim();
        let (_, oh, ow, filters) = grad.dim();
        let k = self.kernel_size;

        let mut grad_w = Array4::<f64>::zeros(self.weights.raw_dim());
        let mut grad_b = Array1::<f64>::zeros(filters);
        let mut grad_x = Array4::<f64>::zeros((n, h, w, c));

        for s in 0..n {
            for i in 0..oh {
                for j in 0..ow {
                    for f in 0..filters {
                        let g = grad[[s, i, j, f]];
                        if g == 0.0 {
                            continue;
                        }
                        grad_b[f] += g;
                        for di in 0..k {
                            for dj in 0..k {
                                for ci in 0..c {
                                    grad_w[[di, dj, ci, f]] += x[[s, i + di, j + dj, ci]] * g;
                                    grad_x[[s, i + di, j + dj, ci]] += self.weights[[di, dj, ci, f]] * g;
                                }
                            }
                        }
                    }
                }
            }
        }

        self.grad_w = grad_w;
        self.grad_b = grad_b;
        Ok(grad_x.into_dyn())
    }

    fn spec(&self) -> LayerSpec {
        let (in_channels, filters) = self.dims();
        LayerSpec::Conv2d {
            in_channels,
            filters,
            kernel_size: self.kernel_size,
        }
    }

    fn output_shape(&self, input: &[usize]) -> Vec<usize> {
        let k = self.kernel_size;
        let (_, filters) = self.dims();
        vec![
            input[0].saturating_sub(k) + 1,
            input[1].saturating_sub(k) + 1,
            filters,
        ]
    }

    fn params(&mut self) -> Vec<Param<'_>> {
        vec![
            Param {
                value: self.weights.view_mut().into_dyn(),
                grad: self.grad_w.view().into_dyn(),
            },
            Param {
                value: self.bias.view_mut().into_dyn(),
                grad: self.grad_b.view().into_dyn(),
            },
        ]
    }

    fn weights(&self) -> Vec<WeightTensor> {
        vec![
            WeightTensor::from_array("kernel", &self.weights),
            WeightTensor::from_array("bias", &self.bias),
        ]
    }

    fn load_weights(&mut self, weights: &[&WeightTensor]) -> Result<()> {
        let shape = self.weights.dim();
        let kernel = find_weight(weights, "kernel", &[shape.0, shape.1, shape.2, shape.3])?;
        let bias = find_weight(weights, "bias", &[shape.3])?;
        self.weights = Array4::from_shape_vec(shape, kernel.values.clone())?;
        self.bias = Array1::from(bias.values.clone());
        Ok(())
    }
}

/// Non-overlapping max pooling over NHWC input
#[derive(Debug, Clone)]
pub struct MaxPool2d {
    pool_size: usize,
    input_shape: Option<(usize, usize, usize, usize)>,
    switches: Option<Array4<(usize, usize)>>,
}

impl MaxPool2d {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size: pool_size.max(1),
            input_shape: None,
            switches: None,
        }
    }
}

impl Layer for MaxPool2d {
    fn forward(&mut self, x: ArrayD<f64>, ctx: &mut ForwardCtx<'_>) -> Result<ArrayD<f64>> {
        let x = x.into_dimensionality::<Ix4>()?;
        let (n, h, w, c) = x.dim();
        let p = self.pool_size;
        let (oh, ow) = (h / p, w / p);
        if oh == 0 || ow == 0 {
            return Err(layer_error(format!(
                "max pool of size {} does not fit a {}x{} input",
                p, h, w
            )));
        }

        let mut out = Array4::<f64>::zeros((n, oh, ow, c));
        let mut switches = Array4::from_elem((n, oh, ow, c), (0usize, 0usize));
        for s in 0..n {
            for i in 0..oh {
                for j in 0..ow {
                    for ch in 0..c {
                        let mut best = f64::NEG_INFINITY;
                        let mut at = (i * p, j * p);
                        for di in 0..p {
                            for dj in 0..p {
                                let v = x[[s, i * p + di, j * p + dj, ch]];
                                if v > best {
                                    best = v;
                                    at = (i * p + di, j * p + dj);
                                }
                            }
                        }
                        out[[s, i, j, ch]] = best;
                        switches[[s, i, j, ch]] = at;
                    }
                }
            }
        }

        if ctx.training {
            self.input_shape = Some((n, h, w, c));
            self.switches = Some(switches);
        }
        Ok(out.into_dyn())
    }

    fn backward(&mut self, grad: ArrayD<f64>) -> Result<ArrayD<f64>> {
        let grad = grad.into_dimensionality::<Ix4>()?;
        let shape = self.input_shape.ok_or_else(|| missing_forward("max_pool2d"))?;
        let switches = self.switches.as_ref().ok_or_else(|| missing_forward("max_pool2d"))?;
        let mut grad_x = Array4::<f64>::zeros(shape);
        for ((s, i, j, ch), g) in grad.indexed_iter() {
            let (hi, wi) = switches[[s, i, j, ch]];
            grad_x[[s, hi, wi, ch]] += *g;
        }
        Ok(grad_x.into_dyn())
    }

    fn spec(&self) -> LayerSpec {
        LayerSpec::MaxPool2d {
            pool_size: self.pool_size,
        }
    }

    fn output_shape(&self, input: &[usize]) -> Vec<usize> {
        vec![input[0] / self.pool_size, input[1] / self.pool_size, input[2]]
    }
}

/// Instantiate a layer from its spec with zeroed parameters
pub(crate) fn layer_from_spec(spec: &LayerSpec) -> Box<dyn Layer> {
    match spec {
        LayerSpec::Dense { input_dim, units } => Box::new(Dense::zeroed(*input_dim, *units)),
        LayerSpec::Activation { function } => Box::new(ActivationLayer::new(*function)),
        LayerSpec::Dropout { rate } => Box::new(Dropout::new(*rate)),
        LayerSpec::Conv2d {
            in_channels,
            filters,
            kernel_size,
        } => Box::new(Conv2d::zeroed(*in_channels, *filters, *kernel_size)),
        LayerSpec::MaxPool2d { pool_size } => Box::new(MaxPool2d::new(*pool_size)),
        LayerSpec::Flatten => Box::new(Flatten::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn ctx(rng: &mut Xoshiro256PlusPlus) -> ForwardCtx<'_> {
        ForwardCtx { training: true, rng }
    }

    #[test]
    fn test_activation_functions() {
        let z = array![[-1.0, 0.0, 1.0]].into_dyn();
        let relu = Activation::Relu.apply(&z);
        assert_eq!(relu[[0, 0]], 0.0);
        assert_eq!(relu[[0, 2]], 1.0);

        let sigmoid = Activation::Sigmoid.apply(&z);
        assert!((sigmoid[[0, 1]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_dense_gradient_matches_finite_difference() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let mut dense = Dense::new(2, 1, &mut rng);
        let x = array![[0.5, -1.0], [2.0, 0.25]].into_dyn();

        let out = dense.forward(x.clone(), &mut ctx(&mut rng)).unwrap();
        // d(sum(out))/d(out) = 1
        dense.backward(ArrayD::ones(out.raw_dim())).unwrap();
        let analytic = dense.grad_w[[0, 0]];

        let eps = 1e-6;
        dense.weights[[0, 0]] += eps;
        let bumped: f64 = dense.forward(x, &mut ctx(&mut rng)).unwrap().sum();
        let numeric = (bumped - out.sum()) / eps;
        assert!((analytic - numeric).abs() < 1e-4);
    }

    #[test]
    fn test_conv_and_pool_shapes() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut conv = Conv2d::new(1, 3, 3, &mut rng);
        let mut pool = MaxPool2d::new(2);
        let x = ArrayD::from_elem(IxDyn(&[2, 6, 6, 1]), 0.5);

        let y = conv.forward(x, &mut ctx(&mut rng)).unwrap();
        assert_eq!(y.shape(), &[2, 4, 4, 3]);
        assert_eq!(conv.output_shape(&[6, 6, 1]), vec![4, 4, 3]);

        let z = pool.forward(y, &mut ctx(&mut rng)).unwrap();
        assert_eq!(z.shape(), &[2, 2, 2, 3]);

        let back = pool.backward(ArrayD::ones(z.raw_dim())).unwrap();
        assert_eq!(back.shape(), &[2, 4, 4, 3]);
        let back = conv.backward(back).unwrap();
        assert_eq!(back.shape(), &[2, 6, 6, 1]);
    }

    #[test]
    fn test_dropout_is_identity_at_inference() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let mut dropout = Dropout::new(0.5);
        let x = ArrayD::from_elem(IxDyn(&[4, 4]), 1.0);
        let mut ctx = ForwardCtx { training: false, rng: &mut rng };
        let y = dropout.forward(x.clone(), &mut ctx).unwrap();
        assert_eq!(y, x);
    }

    #[test]
    fn test_weights_round_trip_through_spec() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
        let dense = Dense::new(3, 2, &mut rng);
        let weights = dense.weights();
        let refs: Vec<&WeightTensor> = weights.iter().collect();

        let mut rebuilt = layer_from_spec(&dense.spec());
        rebuilt.load_weights(&refs).unwrap();
        assert_eq!(rebuilt.weights(), weights);
    }
}
