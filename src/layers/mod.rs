//! # Plain Layers
//!
//! Stateless per-timestep transforms that can sit between cells in a
//! [`RecurrentContainer`](crate::rnn::RecurrentContainer). A plain layer maps
//! `[batch, features]` to `[batch, features']` and never sees recurrent state.
//!
//! | Layer | Transform |
//! |-------|-----------|
//! | [`Dense`] | `act(x @ W + b)` over a Burn `Linear` |
//! | [`Activation`] | element-wise activation |

mod activation;
mod dense;

pub use activation::{Activation, ActivationConfig};
pub use dense::{Dense, DenseConfig};

use crate::config::LayerConfig;
use crate::error::Result;
use crate::weights::params::{self, CollectValues, ReplaceValues};
use crate::weights::{BoundRegularizer, ParamMapper, ParamVisitor};
use crate::SymbolicShape;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::fmt;

/// A stateless transform applied to one timestep.
pub trait Layer<B: Backend>: fmt::Debug {
    fn name(&self) -> &str;

    /// Declared per-timestep input shape, if the layer fixes one
    fn input_shape(&self) -> Option<SymbolicShape>;

    /// Validate against the per-timestep shape the layer will receive
    fn build(&mut self, input_shape: &[Option<usize>]) -> Result<()>;

    fn output_shape_for(&self, input_shape: &[Option<usize>]) -> SymbolicShape;

    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2>;

    fn get_config(&self) -> Result<LayerConfig>;

    /// Visit every parameter in [`weights`](Layer::weights) order
    fn visit_params(&self, _visitor: &mut dyn ParamVisitor<B>) {}

    /// Rewrite every parameter in [`weights`](Layer::weights) order, keeping ids
    fn map_params(&mut self, _mapper: &mut dyn ParamMapper<B>) {}

    /// All weight values, trainable first
    fn weights(&self) -> Vec<Tensor<B, 2>> {
        let mut collected = CollectValues::<B>::default();
        self.visit_params(&mut collected);
        collected.values
    }

    fn trainable_weights(&self) -> Vec<Tensor<B, 2>> {
        self.weights()
    }

    fn non_trainable_weights(&self) -> Vec<Tensor<B, 2>> {
        Vec::new()
    }

    fn regularizers(&self) -> Vec<BoundRegularizer<B>> {
        Vec::new()
    }

    fn set_weights(&mut self, values: Vec<Tensor<B, 2>>) -> Result<()> {
        params::check_values(&self.weights(), &values)?;
        self.map_params(&mut ReplaceValues::new(values));
        Ok(())
    }
}
