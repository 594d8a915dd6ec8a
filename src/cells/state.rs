//! Declared per-step state of a cell and how it becomes a tensor.

use crate::engine::{Engine, Variable};
use crate::error::{RecurrentError, Result};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One dimension of a state shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateDim {
    Fixed(usize),
    /// Resolved to the batch size
    BatchSize,
    /// Resolved to the number of timesteps
    InputLength,
}

impl StateDim {
    /// Signed form where `-1` stands for the batch size
    pub fn from_signed(value: i64) -> Result<Self> {
        match value {
            -1 => Ok(Self::BatchSize),
            v if v >= 0 => Ok(Self::Fixed(v as usize)),
            v => Err(RecurrentError::invalid_config(
                "StateDim",
                format!("negative dimension {v}"),
            )),
        }
    }
}

impl From<usize> for StateDim {
    fn from(value: usize) -> Self {
        Self::Fixed(value)
    }
}

/// Builds an initial state from the first timestep's input
pub type StateFn<B> = Arc<dyn Fn(&Tensor<B, 2>) -> Tensor<B, 2>>;

/// How a cell declares one of its states
pub enum StateSpec<B: Backend> {
    /// Zero-filled tensor of this shape
    Shape(Vec<StateDim>),
    /// Literal starting value
    Literal(Array2<f32>),
    /// Computed from the first timestep's input
    Derived(StateFn<B>),
    /// Already-built tensor
    Tensor(Tensor<B, 2>),
}

impl<B: Backend> StateSpec<B> {
    pub fn shape<D: Into<StateDim>>(dims: impl IntoIterator<Item = D>) -> Self {
        Self::Shape(dims.into_iter().map(Into::into).collect())
    }

    /// `[batch_size, units]`, the usual hidden-state shape
    pub fn batch_by(units: usize) -> Self {
        Self::Shape(vec![StateDim::BatchSize, StateDim::Fixed(units)])
    }

    pub fn derived(f: impl Fn(&Tensor<B, 2>) -> Tensor<B, 2> + 'static) -> Self {
        Self::Derived(Arc::new(f))
    }

    /// Whether the state can be built before any input is seen
    pub fn is_static(&self) -> bool {
        matches!(self, Self::Shape(_) | Self::Literal(_))
    }

    /// Initial value for one forward pass.
    ///
    /// `input` is the running first-timestep input that reaches the owning
    /// cell; `batch_size` and `input_length` are already resolved.
    pub fn initial_value(
        &self,
        engine: &Engine<B>,
        input: &Tensor<B, 2>,
        batch_size: usize,
        input_length: usize,
    ) -> Result<Tensor<B, 2>> {
        match self {
            Self::Derived(f) => Ok(f(input)),
            Self::Shape(dims) => {
                let dims = resolve_dims(dims, Some(batch_size), Some(input_length))?;
                Ok(engine.zeros(dims))
            }
            Self::Literal(array) => Ok(engine.tensor_from_array(array)),
            Self::Tensor(tensor) => Ok(tensor.clone()),
        }
    }

    /// Buffer for stateful mode; only static specs qualify
    pub fn persistent_value(
        &self,
        engine: &Engine<B>,
        batch_size: Option<usize>,
        input_length: Option<usize>,
    ) -> Result<Variable<B>> {
        match self {
            Self::Literal(array) => Ok(engine.variable(array)),
            Self::Shape(dims) => {
                let dims = resolve_dims(dims, batch_size, input_length)?;
                Ok(Variable::new(engine.zeros(dims)))
            }
            Self::Derived(_) => Err(RecurrentError::StatefulShape(
                "state derived from the input cannot be persisted".to_string(),
            )),
            Self::Tensor(_) => Err(RecurrentError::StatefulShape(
                "a prebuilt state tensor cannot be persisted".to_string(),
            )),
        }
    }
}

/// Substitute the sentinels and check the result is rank 2
pub fn resolve_dims(
    dims: &[StateDim],
    batch_size: Option<usize>,
    input_length: Option<usize>,
) -> Result<[usize; 2]> {
    let resolved = dims
        .iter()
        .map(|dim| match dim {
            StateDim::Fixed(n) => Ok(*n),
            StateDim::BatchSize => batch_size.ok_or_else(|| {
                RecurrentError::StatefulShape("batch size is not declared".to_string())
            }),
            StateDim::InputLength => input_length.ok_or_else(|| {
                RecurrentError::StatefulShape("input length is not declared".to_string())
            }),
        })
        .collect::<Result<Vec<usize>>>()?;

    if let [rows, cols] = resolved[..] {
        return Ok([rows, cols]);
    }
    Err(RecurrentError::StateRank(resolved))
}

impl<B: Backend> Clone for StateSpec<B> {
    fn clone(&self) -> Self {
        match self {
            Self::Shape(dims) => Self::Shape(dims.clone()),
            Self::Literal(array) => Self::Literal(array.clone()),
            Self::Derived(f) => Self::Derived(Arc::clone(f)),
            Self::Tensor(tensor) => Self::Tensor(tensor.clone()),
        }
    }
}

impl<B: Backend> fmt::Debug for StateSpec<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape(dims) => f.debug_tuple("Shape").field(dims).finish(),
            Self::Literal(array) => f.debug_tuple("Literal").field(&array.shape()).finish(),
            Self::Derived(_) => f.write_str("Derived(..)"),
            Self::Tensor(tensor) => f.debug_tuple("Tensor").field(&tensor.dims()).finish(),
        }
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
    fn test_sentinels_resolve() {
        let dims = [StateDim::BatchSize, StateDim::InputLength];
        assert_eq!(resolve_dims(&dims, Some(5), Some(7)).unwrap(), [5, 7]);

        let signed: Vec<StateDim> = [-1i64, 3]
            .iter()
            .map(|&v| StateDim::from_signed(v).unwrap())
            .collect();
        assert_eq!(resolve_dims(&signed, Some(2), None).unwrap(), [2, 3]);
        assert!(StateDim::from_signed(-2).is_err());
    }

    #[test]
    fn test_shape_spec_yields_zeros() {
        let device = get_test_device();
        let engine = Engine::<TestBackend>::new(&device);
        let input = Tensor::<TestBackend, 2>::ones([5, 3], &device);
        let spec =
            StateSpec::<TestBackend>::shape([StateDim::BatchSize, StateDim::InputLength]);

        let state = spec.initial_value(&engine, &input, 5, 7).unwrap();

        assert_eq!(state.dims(), [5, 7]);
        assert_eq!(state.abs().sum().into_scalar(), 0.0);
    }

    #[test]
    fn test_rank_is_checked() {
        let device = get_test_device();
        let engine = Engine::<TestBackend>::new(&device);
        let input = Tensor::<TestBackend, 2>::ones([2, 3], &device);
        let spec = StateSpec::<TestBackend>::shape([
            StateDim::BatchSize,
            StateDim::Fixed(3),
            StateDim::Fixed(4),
        ]);

        let err = spec.initial_value(&engine, &input, 2, 1).unwrap_err();
        assert!(matches!(err, RecurrentError::StateRank(dims) if dims == vec![2, 3, 4]));
    }

    #[test]
    fn test_derived_and_literal_specs() {
        let device = get_test_device();
        let engine = Engine::<TestBackend>::new(&device);
        let input = Tensor::<TestBackend, 2>::ones([2, 3], &device);

        let derived = StateSpec::<TestBackend>::derived(|x| x.clone() * 2.0);
        let state = derived.initial_value(&engine, &input, 2, 1).unwrap();
        assert_eq!(state.sum().into_scalar(), 12.0);

        let literal = StateSpec::<TestBackend>::Literal(Array2::from_elem((1, 4), 0.5));
        let state = literal.initial_value(&engine, &input, 2, 1).unwrap();
        assert_eq!(state.dims(), [1, 4]);
        assert_eq!(state.sum().into_scalar(), 2.0);
    }

    #[test]
    fn test_persistent_requires_static_state() {
        let device = get_test_device();
        let engine = Engine::<TestBackend>::new(&device);

        let derived = StateSpec::<TestBackend>::derived(|x| x.clone());
        assert!(!derived.is_static());
        assert!(matches!(
            derived.persistent_value(&engine, Some(2), Some(3)),
            Err(RecurrentError::StatefulShape(_))
        ));

        let tensor = StateSpec::Tensor(Tensor::<TestBackend, 2>::zeros([2, 2], &device));
        assert!(matches!(
            tensor.persistent_value(&engine, Some(2), Some(3)),
            Err(RecurrentError::StatefulShape(_))
        ));

        let shaped = StateSpec::<TestBackend>::batch_by(4);
        assert!(matches!(
            shaped.persistent_value(&engine, None, Some(3)),
            Err(RecurrentError::StatefulShape(_))
        ));
        let buffer = shaped.persistent_value(&engine, Some(2), None).unwrap();
        assert_eq!(buffer.dims(), [2, 4]);
    }
}
