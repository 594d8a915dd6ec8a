//! # Cell Weights
//!
//! A [`Weight`] is a named rank-2 tensor plus a trainability flag and an
//! optional [`Regularizer`]. Cells keep their weights in a [`WeightSet`], which
//! derives the trainable, non-trainable and regularizer views on demand.
//!
//! Weights come from one of three sources ([`WeightSource`]):
//!
//! | Source | Materialized by |
//! |--------|-----------------|
//! | Shape | a named initializer ([`initializer::get`]) |
//! | Literal array | copying the array onto the device |
//! | Tensor | used as-is |
//!
//! A 1-D shape `[n]` becomes a `[1, n]` row so biases broadcast over the batch.
//!
//! Weight order is trainable weights first, then non-trainable ones, each in
//! declaration order. Steps, traversals and `set_weights` all use it.

pub mod initializer;
pub mod params;
mod regularizer;

pub use params::{FromModuleMapper, FromModuleVisitor, ParamMapper, ParamVisitor};
pub use regularizer::{BoundRegularizer, Regularizer};

use crate::engine::Engine;
use crate::error::{RecurrentError, Result};
use burn::module::{Param, ParamId};
use burn::nn::Initializer;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::Array2;
use std::fmt;

/// Where a weight's initial value comes from
pub enum WeightSource<B: Backend> {
    Shape(Vec<usize>),
    Array(Array2<f32>),
    Tensor(Tensor<B, 2>),
}

/// A cell parameter
#[derive(Clone)]
pub struct Weight<B: Backend> {
    name: Option<String>,
    value: Param<Tensor<B, 2>>,
    regularizer: Option<Regularizer>,
    trainable: bool,
}

impl<B: Backend> Weight<B> {
    /// Build a weight, using `init` when the source is a shape
    pub fn build(source: WeightSource<B>, init: &str, device: &B::Device) -> Result<Self> {
        match source {
            WeightSource::Shape(shape) => Self::from_shape(&shape, init, device),
            WeightSource::Array(array) => Ok(Self::from_array(&array, device)),
            WeightSource::Tensor(tensor) => Ok(Self::from_tensor(tensor)),
        }
    }

    /// Materialize a weight of `shape` (rank 1 or 2) through a named initializer
    pub fn from_shape(shape: &[usize], init: &str, device: &B::Device) -> Result<Self> {
        let resolved = initializer::get(init)?;
        let (dims, promoted) = match *shape {
            [n] => ([1, n], true),
            [rows, cols] => ([rows, cols], false),
            _ => {
                return Err(RecurrentError::invalid_config(
                    "Weight",
                    format!("weights must be rank 1 or 2, got shape {shape:?}"),
                ))
            }
        };
        Ok(Self::from_initializer(&resolved, dims, promoted, device))
    }

    pub(crate) fn from_initializer(
        init: &Initializer,
        dims: [usize; 2],
        promoted: bool,
        device: &B::Device,
    ) -> Self {
        Self::from_tensor(initializer::materialize::<B>(init, dims, promoted, device))
    }

    pub fn from_array(array: &Array2<f32>, device: &B::Device) -> Self {
        Self::from_tensor(Engine::<B>::new(device).tensor_from_array(array))
    }

    pub fn from_tensor(tensor: Tensor<B, 2>) -> Self {
        Self::from_param(Param::from_tensor(tensor))
    }

    /// Wrap an existing parameter, keeping its id
    pub fn from_param(param: Param<Tensor<B, 2>>) -> Self {
        Self {
            name: None,
            value: param,
            regularizer: None,
            trainable: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.regularizer = Some(regularizer);
        self
    }

    /// Look the regularizer up by name
    pub fn with_regularizer_name(self, name: &str) -> Result<Self> {
        Ok(self.with_regularizer(Regularizer::from_name(name)?))
    }

    pub fn with_trainable(mut self, trainable: bool) -> Self {
        self.trainable = trainable;
        self.value = self.value.set_require_grad(trainable);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn id(&self) -> ParamId {
        self.value.id
    }

    pub fn value(&self) -> Tensor<B, 2> {
        self.value.val()
    }

    pub fn dims(&self) -> [usize; 2] {
        self.value.val().dims()
    }

    pub fn is_trainable(&self) -> bool {
        self.trainable
    }

    pub fn regularizer(&self) -> Option<Regularizer> {
        self.regularizer
    }

    fn replace_value(&mut self, tensor: Tensor<B, 2>) {
        self.value = Param::initialized(self.value.id, tensor).set_require_grad(self.trainable);
    }
}

impl<B: Backend> From<Tensor<B, 2>> for Weight<B> {
    fn from(tensor: Tensor<B, 2>) -> Self {
        Self::from_tensor(tensor)
    }
}

impl<B: Backend> fmt::Debug for Weight<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Weight")
            .field("name", &self.name)
            .field("dims", &self.dims())
            .field("trainable", &self.trainable)
            .field("regularizer", &self.regularizer)
            .finish()
    }
}

/// Weights owned by one cell
#[derive(Debug, Clone)]
pub struct WeightSet<B: Backend> {
    weights: Vec<Weight<B>>,
}

impl<B: Backend> WeightSet<B> {
    pub fn new() -> Self {
        Self {
            weights: Vec::new(),
        }
    }

    /// Replace the whole set. Plain tensors become trainable, unregularized weights.
    pub fn assign<W, I>(&mut self, weights: I)
    where
        W: Into<Weight<B>>,
        I: IntoIterator<Item = W>,
    {
        self.weights = weights.into_iter().map(Into::into).collect();
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Weights in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Weight<B>> {
        self.weights.iter()
    }

    /// Positions of the trainable weights, then of the non-trainable ones
    fn order(&self) -> Vec<usize> {
        let (mut order, frozen): (Vec<usize>, Vec<usize>) =
            (0..self.weights.len()).partition(|&index| self.weights[index].trainable);
        order.extend(frozen);
        order
    }

    /// Current values, trainable first
    pub fn values(&self) -> Vec<Tensor<B, 2>> {
        self.order()
            .into_iter()
            .map(|index| self.weights[index].value())
            .collect()
    }

    pub fn visit(&self, visitor: &mut dyn ParamVisitor<B>) {
        for index in self.order() {
            let weight = &self.weights[index];
            visitor.visit(weight.id(), &weight.value());
        }
    }

    pub fn map(&mut self, mapper: &mut dyn ParamMapper<B>) {
        for index in self.order() {
            let weight = &mut self.weights[index];
            let value = mapper.map(weight.id(), weight.value());
            weight.replace_value(value);
        }
    }

    pub fn trainable(&self) -> Vec<Tensor<B, 2>> {
        self.weights
            .iter()
            .filter(|w| w.trainable)
            .map(Weight::value)
            .collect()
    }

    pub fn non_trainable(&self) -> Vec<Tensor<B, 2>> {
        self.weights
            .iter()
            .filter(|w| !w.trainable)
            .map(Weight::value)
            .collect()
    }

    /// Regularizers bound to the current weight values
    pub fn regularizers(&self) -> Vec<BoundRegularizer<B>> {
        self.weights
            .iter()
            .filter_map(|w| w.regularizer.map(|r| r.bind(w.value())))
            .collect()
    }

    /// Overwrite values in [`values`](Self::values) order, keeping ids,
    /// flags and regularizers
    pub fn set_values(&mut self, values: Vec<Tensor<B, 2>>) -> Result<()> {
        params::check_values(&self.values(), &values)?;
        self.map(&mut params::ReplaceValues::new(values));
        Ok(())
    }
}

impl<B: Backend> Default for WeightSet<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend, W: Into<Weight<B>>> FromIterator<W> for WeightSet<B> {
    fn from_iter<I: IntoIterator<Item = W>>(iter: I) -> Self {
        let mut set = Self::new();
        set.assign(iter);
        set
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
    fn test_weight_sources() {
        let device = get_test_device();

        let from_shape =
            Weight::<TestBackend>::build(WeightSource::Shape(vec![3, 4]), "glorot_uniform", &device)
                .unwrap();
        assert_eq!(from_shape.dims(), [3, 4]);

        let bias = Weight::<TestBackend>::from_shape(&[5], "zeros", &device).unwrap();
        assert_eq!(bias.dims(), [1, 5]);

        let array = Array2::from_elem((2, 2), 3.0f32);
        let literal =
            Weight::<TestBackend>::build(WeightSource::Array(array), "zeros", &device).unwrap();
        assert_eq!(literal.value().sum().into_scalar(), 12.0);

        let tensor = Tensor::<TestBackend, 2>::ones([1, 2], &device);
        let wrapped = Weight::build(WeightSource::Tensor(tensor), "zeros", &device).unwrap();
        assert_eq!(wrapped.value().sum().into_scalar(), 2.0);
    }

    #[test]
    fn test_bad_shapes_and_names() {
        let device = get_test_device();

        assert!(matches!(
            Weight::<TestBackend>::from_shape(&[2, 3, 4], "zeros", &device),
            Err(RecurrentError::InvalidConfig { .. })
        ));
        assert!(matches!(
            Weight::<TestBackend>::from_shape(&[2, 3], "nope", &device),
            Err(RecurrentError::UnknownInitializer(_))
        ));
    }

    #[test]
    fn test_assign_partitions() {
        let device = get_test_device();
        let kernel = Weight::<TestBackend>::from_shape(&[2, 3], "ones", &device)
            .unwrap()
            .with_name("kernel")
            .with_regularizer(Regularizer::l2(0.5));
        let frozen = Weight::<TestBackend>::from_shape(&[3], "zeros", &device)
            .unwrap()
            .with_trainable(false);
        let plain = Tensor::<TestBackend, 2>::ones([1, 1], &device);

        let mut set = WeightSet::new();
        set.assign(vec![kernel, frozen, Weight::from(plain)]);

        assert_eq!(set.len(), 3);
        assert_eq!(set.trainable().len(), 2);
        assert_eq!(set.non_trainable().len(), 1);
        assert_eq!(set.regularizers().len(), 1);
        // frozen weight moves behind the trainable ones
        assert_eq!(set.values()[2].dims(), [1, 3]);

        let penalty = set.regularizers()[0].penalty().into_scalar();
        assert!((penalty - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_assign_replaces() {
        let device = get_test_device();
        let mut set: WeightSet<TestBackend> = (0..3)
            .map(|_| Tensor::<TestBackend, 2>::zeros([1, 1], &device))
            .collect();
        assert_eq!(set.len(), 3);

        let replacement = vec![Tensor::<TestBackend, 2>::zeros([2, 2], &device)];
        set.assign(replacement.clone());
        set.assign(replacement);

        assert_eq!(set.len(), 1);
        assert_eq!(set.trainable().len(), 1);
        assert!(set.regularizers().is_empty());
    }

    #[test]
    fn test_set_values_checks() {
        let device = get_test_device();
        let mut set: WeightSet<TestBackend> =
            vec![Tensor::<TestBackend, 2>::zeros([2, 2], &device)]
                .into_iter()
                .collect();

        assert!(matches!(
            set.set_values(vec![]),
            Err(RecurrentError::WeightCount { expected: 1, actual: 0 })
        ));
        assert!(matches!(
            set.set_values(vec![Tensor::zeros([2, 3], &device)]),
            Err(RecurrentError::WeightShape { index: 0, .. })
        ));

        let id = set.iter().next().map(Weight::id).unwrap();
        set.set_values(vec![Tensor::ones([2, 2], &device)]).unwrap();
        assert_eq!(set.values()[0].clone().sum().into_scalar(), 4.0);
        assert_eq!(set.iter().next().map(Weight::id), Some(id));
    }

    #[test]
    fn test_frozen_weight_order() {
        let device = get_test_device();
        let weight = |value: f32, trainable: bool| {
            Weight::<TestBackend>::from_tensor(Tensor::full([1, 1], value, &device))
                .with_trainable(trainable)
        };
        let mut set = WeightSet::new();
        set.assign(vec![weight(1.0, true), weight(2.0, false), weight(3.0, true)]);

        let scalars = |values: Vec<Tensor<TestBackend, 2>>| -> Vec<f32> {
            values.into_iter().map(|v| v.into_scalar()).collect()
        };
        assert_eq!(scalars(set.values()), vec![1.0, 3.0, 2.0]);

        let mut expected = set.trainable();
        expected.extend(set.non_trainable());
        assert_eq!(scalars(set.values()), scalars(expected));

        set.set_values(vec![
            Tensor::full([1, 1], 10.0, &device),
            Tensor::full([1, 1], 30.0, &device),
            Tensor::full([1, 1], 20.0, &device),
        ])
        .unwrap();
        let declared: Vec<f32> = set.iter().map(|w| w.value().into_scalar()).collect();
        assert_eq!(declared, vec![10.0, 20.0, 30.0]);
        assert!(!set.iter().nth(1).unwrap().is_trainable());
    }
}
