//! Parameter traversal across trait objects.
//!
//! Burn's [`ModuleVisitor`] and [`ModuleMapper`] are generic over the tensor
//! rank, so they cannot be called through `dyn Cell` or `dyn Layer`. Sub-units
//! take the rank-2 [`ParamVisitor`] / [`ParamMapper`] instead, and the bridges
//! here convert in both directions. Rank-1 parameters such as a `Linear` bias
//! are seen as `[1, n]` rows and restored to their own rank after mapping.

use crate::error::{RecurrentError, Result};
use burn::module::{ModuleMapper, ModuleVisitor, ParamId};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Reads every parameter of a sub-unit, in weight order
pub trait ParamVisitor<B: Backend> {
    fn visit(&mut self, id: ParamId, value: &Tensor<B, 2>);
}

/// Rewrites every parameter of a sub-unit in place, in weight order.
/// The parameter id is kept.
pub trait ParamMapper<B: Backend> {
    fn map(&mut self, id: ParamId, value: Tensor<B, 2>) -> Tensor<B, 2>;
}

/// Feeds a Burn [`ModuleVisitor`] from a sub-unit traversal
pub struct FromModuleVisitor<'a, V>(pub &'a mut V);

impl<B: Backend, V: ModuleVisitor<B>> ParamVisitor<B> for FromModuleVisitor<'_, V> {
    fn visit(&mut self, id: ParamId, value: &Tensor<B, 2>) {
        self.0.visit_float(id, value);
    }
}

/// Feeds a Burn [`ModuleMapper`] from a sub-unit traversal
pub struct FromModuleMapper<'a, M>(pub &'a mut M);

impl<B: Backend, M: ModuleMapper<B>> ParamMapper<B> for FromModuleMapper<'_, M> {
    fn map(&mut self, id: ParamId, value: Tensor<B, 2>) -> Tensor<B, 2> {
        self.0.map_float(id, value)
    }
}

/// Lets a derived [`Module`](burn::module::Module) drive a [`ParamVisitor`]
pub(crate) struct IntoModuleVisitor<'a, B: Backend>(pub &'a mut dyn ParamVisitor<B>);

impl<B: Backend> ModuleVisitor<B> for IntoModuleVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, tensor: &Tensor<B, D>) {
        self.0.visit(id, &as_rows(tensor.clone()));
    }
}

/// Lets a derived [`Module`](burn::module::Module) drive a [`ParamMapper`]
pub(crate) struct IntoModuleMapper<'a, B: Backend>(pub &'a mut dyn ParamMapper<B>);

impl<B: Backend> ModuleMapper<B> for IntoModuleMapper<'_, B> {
    fn map_float<const D: usize>(&mut self, id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let dims = tensor.dims();
        self.0.map(id, as_rows(tensor)).reshape(dims)
    }
}

/// Fold every leading dimension into rows
fn as_rows<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, 2> {
    let dims = tensor.dims();
    let (cols, rows) = match dims.split_last() {
        Some((cols, rest)) => (*cols, rest.iter().product()),
        None => (1, 1),
    };
    tensor.reshape([rows, cols])
}

/// Collects parameter values in visit order
#[derive(Default)]
pub(crate) struct CollectValues<B: Backend> {
    pub values: Vec<Tensor<B, 2>>,
}

impl<B: Backend> ParamVisitor<B> for CollectValues<B> {
    fn visit(&mut self, _id: ParamId, value: &Tensor<B, 2>) {
        self.values.push(value.clone());
    }
}

/// Swaps in new values in visit order; parameters past the end keep theirs
pub(crate) struct ReplaceValues<B: Backend> {
    values: std::vec::IntoIter<Tensor<B, 2>>,
}

impl<B: Backend> ReplaceValues<B> {
    pub fn new(values: Vec<Tensor<B, 2>>) -> Self {
        Self {
            values: values.into_iter(),
        }
    }
}

impl<B: Backend> ParamMapper<B> for ReplaceValues<B> {
    fn map(&mut self, _id: ParamId, value: Tensor<B, 2>) -> Tensor<B, 2> {
        match self.values.next() {
            Some(next) => next.set_require_grad(value.is_require_grad()),
            None => value,
        }
    }
}

/// Count and per-position shape check of replacement values
pub(crate) fn check_values<B: Backend>(
    current: &[Tensor<B, 2>],
    values: &[Tensor<B, 2>],
) -> Result<()> {
    if values.len() != current.len() {
        return Err(RecurrentError::WeightCount {
            expected: current.len(),
            actual: values.len(),
        });
    }
    for (index, (old, new)) in current.iter().zip(values).enumerate() {
        if old.dims() != new.dims() {
            return Err(RecurrentError::WeightShape {
                index,
                expected: old.dims(),
                actual: new.dims(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::module::{Module, Param};
    use burn::nn::LinearConfig;

    type TestBackend = NdArray<f32>;

    #[derive(Default)]
    struct Shapes(Vec<Vec<usize>>);

    impl<B: Backend> ModuleVisitor<B> for Shapes {
        fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
            self.0.push(tensor.dims().to_vec());
        }
    }

    #[test]
    fn test_linear_bias_seen_as_row() {
        let device = Default::default();
        let linear = LinearConfig::new(2, 3).init::<TestBackend>(&device);

        let mut collected = CollectValues::<TestBackend>::default();
        linear.visit(&mut IntoModuleVisitor(&mut collected));
        let dims: Vec<[usize; 2]> = collected.values.iter().map(|v| v.dims()).collect();
        assert_eq!(dims, vec![[2, 3], [1, 3]]);

        let mut shapes = Shapes::default();
        let mut bridge = FromModuleVisitor(&mut shapes);
        bridge.visit(linear.weight.id, &linear.weight.val());
        assert_eq!(shapes.0, vec![vec![2, 3]]);
    }

    #[test]
    fn test_replace_keeps_ids_and_rank() {
        let device = Default::default();
        let linear = LinearConfig::new(2, 3).init::<TestBackend>(&device);
        let weight_id = linear.weight.id;

        let mut replace = ReplaceValues::<TestBackend>::new(vec![
            Tensor::ones([2, 3], &device),
            Tensor::full([1, 3], 2.0, &device),
        ]);
        let linear = linear.map(&mut IntoModuleMapper(&mut replace));

        assert_eq!(linear.weight.id, weight_id);
        let bias = linear.bias.as_ref().map(Param::val).unwrap();
        assert_eq!(bias.dims(), [3]);
        assert_eq!(bias.sum().into_scalar(), 6.0);
    }

    #[test]
    fn test_check_values() {
        let device = Default::default();
        let current = vec![Tensor::<TestBackend, 2>::zeros([2, 2], &device)];

        assert!(check_values(&current, &[Tensor::ones([2, 2], &device)]).is_ok());
        assert!(matches!(
            check_values(&current, &[]),
            Err(RecurrentError::WeightCount { expected: 1, actual: 0 })
        ));
        assert!(matches!(
            check_values(&current, &[Tensor::ones([1, 2], &device)]),
            Err(RecurrentError::WeightShape { index: 0, .. })
        ));
    }
}
