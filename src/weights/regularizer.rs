use crate::error::{RecurrentError, Result};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

const DEFAULT_FACTOR: f64 = 0.01;

/// L1/L2 weight penalty
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Regularizer {
    pub l1: f64,
    pub l2: f64,
}

impl Regularizer {
    pub fn l1(factor: f64) -> Self {
        Self { l1: factor, l2: 0.0 }
    }

    pub fn l2(factor: f64) -> Self {
        Self { l1: 0.0, l2: factor }
    }

    pub fn l1l2(l1: f64, l2: f64) -> Self {
        Self { l1, l2 }
    }

    /// Look a regularizer up by name (`l1`, `l2`, `l1l2`) with the default factor
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "l1" => Ok(Self::l1(DEFAULT_FACTOR)),
            "l2" => Ok(Self::l2(DEFAULT_FACTOR)),
            "l1l2" => Ok(Self::l1l2(DEFAULT_FACTOR, DEFAULT_FACTOR)),
            other => Err(RecurrentError::UnknownRegularizer(other.to_string())),
        }
    }

    /// Attach the penalty to a tensor
    pub fn bind<B: Backend>(self, tensor: Tensor<B, 2>) -> BoundRegularizer<B> {
        BoundRegularizer {
            regularizer: self,
            tensor,
        }
    }
}

/// A regularizer bound to the tensor it penalizes
#[derive(Debug, Clone)]
pub struct BoundRegularizer<B: Backend> {
    regularizer: Regularizer,
    tensor: Tensor<B, 2>,
}

impl<B: Backend> BoundRegularizer<B> {
    pub fn regularizer(&self) -> Regularizer {
        self.regularizer
    }

    pub fn tensor(&self) -> &Tensor<B, 2> {
        &self.tensor
    }

    /// `l1 * sum(|w|) + l2 * sum(w^2)`, shape `[1]`
    pub fn penalty(&self) -> Tensor<B, 1> {
        let l1 = self.tensor.clone().abs().sum() * (self.regularizer.l1 as f32);
        let l2 = (self.tensor.clone() * self.tensor.clone()).sum() * (self.regularizer.l2 as f32);
        l1 + l2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_lookup() {
        assert_eq!(Regularizer::from_name("l1").unwrap(), Regularizer::l1(0.01));
        assert_eq!(
            Regularizer::from_name("l1l2").unwrap(),
            Regularizer::l1l2(0.01, 0.01)
        );
        assert!(matches!(
            Regularizer::from_name("dropout"),
            Err(RecurrentError::UnknownRegularizer(_))
        ));
    }

    #[test]
    fn test_penalty() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 1>::from_floats([1.0, -2.0, 3.0, -4.0], &device)
            .reshape([2, 2]);

        let l1 = Regularizer::l1(0.5).bind(tensor.clone()).penalty().into_scalar();
        assert!((l1 - 5.0).abs() < 1e-5);

        let l2 = Regularizer::l2(0.1).bind(tensor).penalty().into_scalar();
        assert!((l2 - 3.0).abs() < 1e-5);
    }
}
