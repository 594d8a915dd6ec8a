//! Element-wise activations shared by the stock cells and the `Activation` layer.

use crate::error::{RecurrentError, Result};
use burn::tensor::activation;
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

/// LeCun's tanh activation function.
///
/// `f(x) = 1.7159 * tanh(0.666 * x)`
///
/// # Example
///
/// ```rust
/// use burn::backend::NdArray;
/// use burn::tensor::Tensor;
/// use cellweave::activation::LeCun;
///
/// type Backend = NdArray<f32>;
/// let device = Default::default();
///
/// let x = Tensor::<Backend, 1>::from_floats([0.0, 1.0, -1.0], &device);
/// let y = LeCun::forward(x);
/// ```
pub struct LeCun;

impl LeCun {
    pub fn forward<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
        let scaled = x * 0.666f32;
        scaled.tanh() * 1.7159f32
    }
}

/// Activation selectable by name in layer and cell configs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationKind {
    /// Pass-through
    Identity,
    #[default]
    Tanh,
    Sigmoid,
    Relu,
    LecunTanh,
}

impl ActivationKind {
    /// Look an activation up by name. `linear` is accepted as an alias of `identity`.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "identity" | "linear" => Ok(Self::Identity),
            "tanh" => Ok(Self::Tanh),
            "sigmoid" => Ok(Self::Sigmoid),
            "relu" => Ok(Self::Relu),
            "lecun_tanh" => Ok(Self::LecunTanh),
            other => Err(RecurrentError::UnknownActivation(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Tanh => "tanh",
            Self::Sigmoid => "sigmoid",
            Self::Relu => "relu",
            Self::LecunTanh => "lecun_tanh",
        }
    }

    pub fn apply<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Identity => x,
            Self::Tanh => x.tanh(),
            Self::Sigmoid => activation::sigmoid(x),
            Self::Relu => activation::relu(x),
            Self::LecunTanh => LeCun::forward(x),
        }
    }
}
