use crate::cells::Cell;
use crate::config::LayerConfig;
use crate::error::Result;
use crate::layers::Layer;
use crate::weights::{BoundRegularizer, ParamMapper, ParamVisitor};
use crate::SymbolicShape;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// One stage of a container pipeline.
///
/// The variant is fixed when the unit is created, so the container never
/// has to ask at step time whether a unit carries state.
#[derive(Debug)]
pub enum SubUnit<B: Backend> {
    /// Stateful recurrent cell
    Cell(Box<dyn Cell<B>>),
    /// Stateless per-timestep transform
    Plain(Box<dyn Layer<B>>),
}

impl<B: Backend> SubUnit<B> {
    pub fn cell(cell: impl Cell<B> + 'static) -> Self {
        Self::Cell(Box::new(cell))
    }

    pub fn plain(layer: impl Layer<B> + 'static) -> Self {
        Self::Plain(Box::new(layer))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Cell(cell) => cell.name(),
            Self::Plain(layer) => layer.name(),
        }
    }

    pub fn is_cell(&self) -> bool {
        matches!(self, Self::Cell(_))
    }

    /// Number of state tensors this unit owns in the container state vector
    pub fn state_count(&self) -> usize {
        match self {
            Self::Cell(cell) => cell.state_count(),
            Self::Plain(_) => 0,
        }
    }

    /// Declared per-timestep input shape
    pub fn input_shape(&self) -> Option<SymbolicShape> {
        match self {
            Self::Cell(cell) => Some(cell.input_shape()),
            Self::Plain(layer) => layer.input_shape(),
        }
    }

    pub fn build(&mut self, input_shape: &[Option<usize>]) -> Result<()> {
        match self {
            Self::Cell(cell) => cell.build(input_shape),
            Self::Plain(layer) => layer.build(input_shape),
        }
    }

    pub fn output_shape_for(&self, input_shape: &[Option<usize>]) -> SymbolicShape {
        match self {
            Self::Cell(cell) => cell.output_shape_for(input_shape),
            Self::Plain(layer) => layer.output_shape_for(input_shape),
        }
    }

    /// Visit every parameter in [`weights`](Self::weights) order
    pub fn visit_params(&self, visitor: &mut dyn ParamVisitor<B>) {
        match self {
            Self::Cell(cell) => cell.visit_params(visitor),
            Self::Plain(layer) => layer.visit_params(visitor),
        }
    }

    pub fn map_params(&mut self, mapper: &mut dyn ParamMapper<B>) {
        match self {
            Self::Cell(cell) => cell.map_params(mapper),
            Self::Plain(layer) => layer.map_params(mapper),
        }
    }

    /// Weight values in the order `set_weights` expects them, trainable first
    pub fn weights(&self) -> Vec<Tensor<B, 2>> {
        match self {
            Self::Cell(cell) => cell.weights().values(),
            Self::Plain(layer) => layer.weights(),
        }
    }

    pub fn trainable_weights(&self) -> Vec<Tensor<B, 2>> {
        match self {
            Self::Cell(cell) => cell.weights().trainable(),
            Self::Plain(layer) => layer.trainable_weights(),
        }
    }

    pub fn non_trainable_weights(&self) -> Vec<Tensor<B, 2>> {
        match self {
            Self::Cell(cell) => cell.weights().non_trainable(),
            Self::Plain(layer) => layer.non_trainable_weights(),
        }
    }

    pub fn regularizers(&self) -> Vec<BoundRegularizer<B>> {
        match self {
            Self::Cell(cell) => cell.weights().regularizers(),
            Self::Plain(layer) => layer.regularizers(),
        }
    }

    pub fn set_weights(&mut self, values: Vec<Tensor<B, 2>>) -> Result<()> {
        match self {
            Self::Cell(cell) => cell.set_weights(values),
            Self::Plain(layer) => layer.set_weights(values),
        }
    }

    pub fn get_config(&self) -> Result<LayerConfig> {
        match self {
            Self::Cell(cell) => cell.get_config(),
            Self::Plain(layer) => layer.get_config(),
        }
    }
}
