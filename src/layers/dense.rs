use super::Layer;
use crate::activation::ActivationKind;
use crate::config::LayerConfig;
use crate::error::{RecurrentError, Result};
use crate::weights::params::{IntoModuleMapper, IntoModuleVisitor};
use crate::weights::{initializer, BoundRegularizer, ParamMapper, ParamVisitor, Regularizer};
use crate::SymbolicShape;
use burn::module::{Ignored, Module};
use burn::nn::{Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

fn default_initializer() -> String {
    "glorot_uniform".to_string()
}

fn default_activation() -> ActivationKind {
    ActivationKind::Identity
}

fn default_use_bias() -> bool {
    true
}

/// Settings of a [`Dense`] layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseConfig {
    pub name: String,
    pub input_dim: usize,
    pub units: usize,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default = "default_activation")]
    pub activation: ActivationKind,
    #[serde(default = "default_use_bias")]
    pub use_bias: bool,
    #[serde(default = "default_initializer")]
    pub kernel_initializer: String,
    #[serde(default)]
    pub kernel_regularizer: Option<Regularizer>,
}

impl DenseConfig {
    pub fn new(input_dim: usize, units: usize) -> Self {
        Self {
            name: "dense".to_string(),
            input_dim,
            units,
            batch_size: None,
            activation: default_activation(),
            use_bias: true,
            kernel_initializer: default_initializer(),
            kernel_regularizer: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_activation(mut self, activation: ActivationKind) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    pub fn with_kernel_initializer(mut self, name: impl Into<String>) -> Self {
        self.kernel_initializer = name.into();
        self
    }

    pub fn with_kernel_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.kernel_regularizer = Some(regularizer);
        self
    }

    /// Materialize the layer; fails on an unknown initializer name
    pub fn init<B: Backend>(self, device: &B::Device) -> Result<Dense<B>> {
        if self.input_dim == 0 || self.units == 0 {
            return Err(RecurrentError::invalid_config(
                Dense::<B>::CLASS_NAME,
                "input_dim and units must be positive",
            ));
        }
        let kernel_init = initializer::get(&self.kernel_initializer)?;
        let mut linear = LinearConfig::new(self.input_dim, self.units)
            .with_bias(self.use_bias)
            .with_initializer(kernel_init)
            .init(device);
        // Biases start at zero regardless of the kernel initializer
        linear.bias = linear.bias.map(|bias| bias.map(|value| value.zeros_like()));

        Ok(Dense {
            linear,
            config: Ignored(self),
        })
    }
}

/// Fully-connected layer, `act(x @ W + b)`, over a Burn [`Linear`].
///
/// The bias is reported as a `[1, units]` row, like cell biases.
#[derive(Module, Debug)]
pub struct Dense<B: Backend> {
    linear: Linear<B>,
    config: Ignored<DenseConfig>,
}

impl<B: Backend> Dense<B> {
    pub const CLASS_NAME: &'static str = "Dense";

    /// Identity-activated layer with a bias and a glorot-uniform kernel
    pub fn new(input_dim: usize, units: usize, device: &B::Device) -> Result<Self> {
        DenseConfig::new(input_dim, units).init(device)
    }

    pub fn from_config(config: &LayerConfig, device: &B::Device) -> Result<Self> {
        config.parse::<DenseConfig>()?.init(device)
    }

    pub fn config(&self) -> &DenseConfig {
        &self.config.0
    }

    pub fn units(&self) -> usize {
        self.config.units
    }

    fn kernel(&self) -> Tensor<B, 2> {
        self.linear.weight.val()
    }
}

impl<B: Backend> Layer<B> for Dense<B> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn input_shape(&self) -> Option<SymbolicShape> {
        Some(vec![self.config.batch_size, Some(self.config.input_dim)])
    }

    fn build(&mut self, input_shape: &[Option<usize>]) -> Result<()> {
        match input_shape.last() {
            Some(Some(width)) if *width != self.config.input_dim => Err(
                RecurrentError::shape_mismatch(&self.config.name, self.config.input_dim, width),
            ),
            Some(_) => Ok(()),
            None => Err(RecurrentError::shape_mismatch(
                &self.config.name,
                self.config.input_dim,
                input_shape,
            )),
        }
    }

    fn output_shape_for(&self, input_shape: &[Option<usize>]) -> SymbolicShape {
        let mut shape = input_shape.to_vec();
        if let Some(last) = shape.last_mut() {
            *last = Some(self.config.units);
        }
        shape
    }

    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.config.activation.apply(self.linear.forward(input))
    }

    fn get_config(&self) -> Result<LayerConfig> {
        LayerConfig::new(Self::CLASS_NAME, self.config())
    }

    fn visit_params(&self, visitor: &mut dyn ParamVisitor<B>) {
        self.linear.visit(&mut IntoModuleVisitor(visitor));
    }

    fn map_params(&mut self, mapper: &mut dyn ParamMapper<B>) {
        self.linear = self.linear.clone().map(&mut IntoModuleMapper(mapper));
    }

    fn regularizers(&self) -> Vec<BoundRegularizer<B>> {
        self.config
            .kernel_regularizer
            .map(|regularizer| regularizer.bind(self.kernel()))
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::backend::Backend as BurnBackend;

    type TestBackend = NdArray<f32>;
    type TestDevice = <TestBackend as BurnBackend>::Device;

    fn get_test_device() -> TestDevice {
        Default::default()
    }

    #[test]
    fn test_dense_shapes() {
        let device = get_test_device();
        let mut layer = Dense::<TestBackend>::new(4, 6, &device).unwrap();

        assert_eq!(layer.input_shape(), Some(vec![None, Some(4)]));
        assert_eq!(layer.output_shape_for(&[Some(2), Some(4)]), vec![Some(2), Some(6)]);
        assert!(layer.build(&[None, Some(4)]).is_ok());
        assert!(matches!(
            layer.build(&[None, Some(5)]),
            Err(RecurrentError::ShapeMismatch { .. })
        ));

        let out = layer.forward(Tensor::zeros([3, 4], &device));
        assert_eq!(out.dims(), [3, 6]);
    }

    #[test]
    fn test_dense_weights() {
        let device = get_test_device();
        let mut layer = Dense::<TestBackend>::new(2, 3, &device).unwrap();

        let dims: Vec<[usize; 2]> = layer.weights().iter().map(|w| w.dims()).collect();
        assert_eq!(dims, vec![[2, 3], [1, 3]]);
        assert_eq!(layer.weights()[1].clone().abs().sum().into_scalar(), 0.0);

        layer
            .set_weights(vec![
                Tensor::ones([2, 3], &device),
                Tensor::full([1, 3], 0.5, &device),
            ])
            .unwrap();
        let out = layer.forward(Tensor::ones([1, 2], &device));
        assert_eq!(layer.linear.bias.as_ref().map(|b| b.dims()), Some([3]));
        // 1 + 1 + 0.5 per unit
        assert!((out.sum().into_scalar() - 7.5).abs() < 1e-5);

        assert!(matches!(
            layer.set_weights(vec![Tensor::ones([2, 3], &device)]),
            Err(RecurrentError::WeightCount { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            layer.set_weights(vec![Tensor::ones([3, 3], &device), Tensor::ones([1, 3], &device)]),
            Err(RecurrentError::WeightShape { index: 0, .. })
        ));
    }

    #[test]
    fn test_dense_is_a_module() {
        let device = get_test_device();
        let mut layer = Dense::<TestBackend>::new(2, 3, &device).unwrap();
        let kernel_id = layer.linear.weight.id;
        assert_eq!(layer.num_params(), 2 * 3 + 3);

        layer
            .set_weights(vec![Tensor::ones([2, 3], &device), Tensor::ones([1, 3], &device)])
            .unwrap();
        assert_eq!(layer.linear.weight.id, kernel_id);

        let copy = layer.clone();
        assert_eq!(copy.config(), layer.config());
        assert_eq!(copy.kernel().sum().into_scalar(), 6.0);
    }

    #[test]
    fn test_dense_without_bias() {
        let device = get_test_device();
        let layer = DenseConfig::new(2, 3)
            .with_bias(false)
            .init::<TestBackend>(&device)
            .unwrap();

        assert_eq!(layer.weights().len(), 1);
    }

    #[test]
    fn test_dense_regularizer() {
        let device = get_test_device();
        let layer = DenseConfig::new(2, 2)
            .with_kernel_initializer("ones")
            .with_kernel_regularizer(Regularizer::l1(0.5))
            .init::<TestBackend>(&device)
            .unwrap();

        let regularizers = layer.regularizers();
        assert_eq!(regularizers.len(), 1);
        assert!((regularizers[0].penalty().into_scalar() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_dense_config_round_trip() {
        let device = get_test_device();
        let layer = DenseConfig::new(3, 4)
            .with_name("proj")
            .with_activation(ActivationKind::Relu)
            .init::<TestBackend>(&device)
            .unwrap();

        let config = layer.get_config().unwrap();
        assert_eq!(config.class_name, "Dense");

        let rebuilt = Dense::<TestBackend>::from_config(&config, &device).unwrap();
        assert_eq!(rebuilt.config(), layer.config());
    }

    #[test]
    fn test_dense_rejects_bad_config() {
        let device = get_test_device();
        assert!(matches!(
            DenseConfig::new(2, 2)
                .with_kernel_initializer("mystery")
                .init::<TestBackend>(&device),
            Err(RecurrentError::UnknownInitializer(_))
        ));
        assert!(matches!(
            DenseConfig::new(0, 2).init::<TestBackend>(&device),
            Err(RecurrentError::InvalidConfig { .. })
        ));
    }
}
