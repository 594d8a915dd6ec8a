use super::Layer;
use crate::activation::ActivationKind;
use crate::config::LayerConfig;
use crate::error::{RecurrentError, Result};
use crate::SymbolicShape;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationConfig {
    pub name: String,
    pub activation: ActivationKind,
    #[serde(default)]
    pub input_dim: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

/// Applies an [`ActivationKind`] element-wise; shapes pass through unchanged.
#[derive(Debug, Clone)]
pub struct Activation {
    name: String,
    kind: ActivationKind,
    input_dim: Option<usize>,
    batch_size: Option<usize>,
}

impl Activation {
    pub const CLASS_NAME: &'static str = "Activation";

    pub fn new(kind: ActivationKind) -> Self {
        Self {
            name: "activation".to_string(),
            kind,
            input_dim: None,
            batch_size: None,
        }
    }

    /// Look the activation up by name
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(Self::new(ActivationKind::from_name(name)?))
    }

    pub fn from_config(config: &LayerConfig) -> Result<Self> {
        let settings: ActivationConfig = config.parse()?;
        Ok(Self {
            name: settings.name,
            kind: settings.activation,
            input_dim: settings.input_dim,
            batch_size: settings.batch_size,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Declare the feature width, needed when this layer opens a pipeline
    pub fn with_input_dim(mut self, input_dim: usize) -> Self {
        self.input_dim = Some(input_dim);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn kind(&self) -> ActivationKind {
        self.kind
    }
}

impl<B: Backend> Layer<B> for Activation {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_shape(&self) -> Option<SymbolicShape> {
        self.input_dim
            .map(|input_dim| vec![self.batch_size, Some(input_dim)])
    }

    fn build(&mut self, input_shape: &[Option<usize>]) -> Result<()> {
        match (self.input_dim, input_shape.last()) {
            (Some(declared), Some(Some(actual))) if declared != *actual => Err(
                RecurrentError::shape_mismatch(&self.name, declared, actual),
            ),
            _ => Ok(()),
        }
    }

    fn output_shape_for(&self, input_shape: &[Option<usize>]) -> SymbolicShape {
        input_shape.to_vec()
    }

    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.kind.apply(input)
    }

    fn get_config(&self) -> Result<LayerConfig> {
        LayerConfig::new(
            Self::CLASS_NAME,
            &ActivationConfig {
                name: self.name.clone(),
                activation: self.kind,
                input_dim: self.input_dim,
                batch_size: self.batch_size,
            },
        )
    }
}
