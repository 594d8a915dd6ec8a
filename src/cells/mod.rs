//! # Recurrent Cells
//!
//! A cell is one timestep of a recurrent transition:
//!
//! ```text
//! step(input, states[, weights][, constants]) -> (output, new_states)
//! ```
//!
//! Cells are added to a [`RecurrentContainer`](crate::rnn::RecurrentContainer),
//! which threads their states through time. A cell declares up front which of
//! the trailing arguments it consumes through its [`StepSignature`]; the
//! dispatcher ([`dispatch_step`]) only gathers what the signature asks for.
//!
//! ## Stock Cells
//!
//! | Cell | States | Transition |
//! |------|--------|------------|
//! | [`SimpleRnnCell`] | `[h]` | `h' = act(xW + hU + b)` |
//! | [`LstmCell`] | `[h, c]` | input/forget/output gates |
//! | [`GruCell`] | `[h]` | update/reset gates |
//! | [`FnCell`] | declared | user closure |
//!
//! ## Tensor Shapes
//!
//! | Tensor | Shape |
//! |--------|-------|
//! | `input` | `[batch, input_dim]` |
//! | each state | rank 2, usually `[batch, units]` |
//! | each weight | rank 2; biases are `[1, units]` rows |
//! | `output` | `[batch, output_dim]` |
//!
//! ## Example: A Running Sum
//!
//! ```rust
//! use burn::backend::NdArray;
//! use cellweave::cells::{FnCell, StateSpec, StepFn};
//!
//! type Backend = NdArray<f32>;
//!
//! let cell = FnCell::<Backend>::new(
//!     "running_sum",
//!     1,
//!     StepFn::input_state(|x, states| {
//!         let total = x + states[0].clone();
//!         (total.clone(), vec![total])
//!     }),
//! )
//! .with_state(StateSpec::batch_by(1));
//! ```

pub mod fn_cell;
pub mod gru_cell;
pub mod lstm_cell;
pub mod simple_rnn_cell;
pub mod state;

pub use fn_cell::{FnCell, StepFn};
pub use gru_cell::GruCell;
pub use lstm_cell::LstmCell;
pub use simple_rnn_cell::SimpleRnnCell;
pub use state::{StateDim, StateFn, StateSpec};

use crate::activation::ActivationKind;
use crate::config::LayerConfig;
use crate::error::{RecurrentError, Result};
use crate::weights::params::{self, IntoModuleMapper, IntoModuleVisitor, ReplaceValues};
use crate::weights::{initializer, ParamMapper, ParamVisitor, Weight, WeightSet};
use crate::SymbolicShape;
use burn::module::{Module, Param};
use burn::nn::Initializer;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `(output, new_states)` returned by a step
pub type StepOutput<B> = (Tensor<B, 2>, Vec<Tensor<B, 2>>);

/// Which arguments a cell's step consumes, always in the order
/// input, states, weights, constants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSignature {
    Input,
    InputState,
    InputStateWeights,
    InputStateWeightsConstants,
}

impl StepSignature {
    pub fn from_arity(arity: usize) -> Result<Self> {
        match arity {
            1 => Ok(Self::Input),
            2 => Ok(Self::InputState),
            3 => Ok(Self::InputStateWeights),
            4 => Ok(Self::InputStateWeightsConstants),
            other => Err(RecurrentError::StepArity(other)),
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Self::Input => 1,
            Self::InputState => 2,
            Self::InputStateWeights => 3,
            Self::InputStateWeightsConstants => 4,
        }
    }

    pub fn consumes_states(&self) -> bool {
        self.arity() >= 2
    }

    pub fn consumes_weights(&self) -> bool {
        self.arity() >= 3
    }

    pub fn consumes_constants(&self) -> bool {
        self.arity() >= 4
    }
}

/// Arguments handed to [`Cell::step`]. Fields the signature does not
/// consume are left empty.
#[derive(Debug, Clone)]
pub struct StepArgs<B: Backend> {
    pub input: Tensor<B, 2>,
    pub states: Vec<Tensor<B, 2>>,
    pub weights: Vec<Tensor<B, 2>>,
    pub constants: Vec<Tensor<B, 2>>,
}

/// Serialized settings of the stock cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrentCellConfig {
    pub name: String,
    pub input_dim: usize,
    pub units: usize,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub activation: ActivationKind,
}

/// Kernel `[input_dim, width]`, recurrent kernel `[units, width]` and bias
/// row `[1, width]`: the parameters of the stock cells.
///
/// This is a Burn [`Module`], so optimizers and recorders can work on it
/// directly; the owning cell exposes it through `gates()`.
#[derive(Module, Debug)]
pub struct GateParams<B: Backend> {
    pub kernel: Param<Tensor<B, 2>>,
    pub recurrent_kernel: Param<Tensor<B, 2>>,
    pub bias: Param<Tensor<B, 2>>,
}

impl<B: Backend> GateParams<B> {
    /// Glorot-uniform kernels and a zero bias
    pub fn new(input_dim: usize, units: usize, width: usize, device: &B::Device) -> Self {
        let glorot = Initializer::XavierUniform { gain: 1.0 };
        Self {
            kernel: Param::from_tensor(initializer::materialize(
                &glorot,
                [input_dim, width],
                false,
                device,
            )),
            recurrent_kernel: Param::from_tensor(initializer::materialize(
                &glorot,
                [units, width],
                false,
                device,
            )),
            bias: Param::from_tensor(initializer::materialize(
                &Initializer::Zeros,
                [1, width],
                true,
                device,
            )),
        }
    }

    /// Named weights sharing the parameter ids
    pub fn weight_set(&self) -> WeightSet<B> {
        vec![
            Weight::from_param(self.kernel.clone()).with_name("kernel"),
            Weight::from_param(self.recurrent_kernel.clone()).with_name("recurrent_kernel"),
            Weight::from_param(self.bias.clone()).with_name("bias"),
        ]
        .into_iter()
        .collect()
    }

    pub(crate) fn visit_params(&self, visitor: &mut dyn ParamVisitor<B>) {
        self.visit(&mut IntoModuleVisitor(visitor));
    }

    pub(crate) fn map_params(&mut self, mapper: &mut dyn ParamMapper<B>) {
        *self = self.clone().map(&mut IntoModuleMapper(mapper));
    }
}

/// Split the weights of a stock cell into kernel, recurrent kernel and bias
pub(crate) fn unpack_gate_weights<B: Backend>(
    weights: &[Tensor<B, 2>],
) -> Result<(Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>)> {
    match weights {
        [kernel, recurrent, bias] => Ok((kernel.clone(), recurrent.clone(), bias.clone())),
        other => Err(RecurrentError::WeightCount {
            expected: 3,
            actual: other.len(),
        }),
    }
}

/// Bookkeeping every cell carries: identity, declared shapes, states,
/// weights and constants.
#[derive(Debug, Clone)]
pub struct CellCore<B: Backend> {
    name: String,
    input_dim: usize,
    batch_size: Option<usize>,
    output_dim: Option<usize>,
    states: Vec<StateSpec<B>>,
    weights: WeightSet<B>,
    constants: Vec<Tensor<B, 2>>,
    input_spec: Option<SymbolicShape>,
}

impl<B: Backend> CellCore<B> {
    pub fn new(name: impl Into<String>, input_dim: usize) -> Self {
        Self {
            name: name.into(),
            input_dim,
            batch_size: None,
            output_dim: None,
            states: Vec::new(),
            weights: WeightSet::new(),
            constants: Vec::new(),
            input_spec: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fix the batch size; required for stateful containers
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_output_dim(mut self, output_dim: usize) -> Self {
        self.output_dim = Some(output_dim);
        self
    }

    pub fn with_states(mut self, states: Vec<StateSpec<B>>) -> Self {
        self.states = states;
        self
    }

    pub fn with_weights<W: Into<Weight<B>>>(mut self, weights: impl IntoIterator<Item = W>) -> Self {
        self.weights.assign(weights);
        self
    }

    pub fn with_constants(mut self, constants: Vec<Tensor<B, 2>>) -> Self {
        self.constants = constants;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    pub fn output_dim(&self) -> Option<usize> {
        self.output_dim
    }

    pub fn states(&self) -> &[StateSpec<B>] {
        &self.states
    }

    pub fn states_mut(&mut self) -> &mut Vec<StateSpec<B>> {
        &mut self.states
    }

    pub fn weights(&self) -> &WeightSet<B> {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut WeightSet<B> {
        &mut self.weights
    }

    pub fn constants(&self) -> &[Tensor<B, 2>] {
        &self.constants
    }

    /// Input spec recorded by the last `build`
    pub fn input_spec(&self) -> Option<&SymbolicShape> {
        self.input_spec.as_ref()
    }

    /// Declared per-timestep input shape, `[batch, input_dim]`
    pub fn input_shape(&self) -> SymbolicShape {
        vec![self.batch_size, Some(self.input_dim)]
    }

    /// Check `input_shape` against the declared shape and record it
    pub fn build(&mut self, input_shape: &[Option<usize>]) -> Result<()> {
        let expected = self.input_shape();
        let compatible = input_shape.len() == expected.len()
            && input_shape
                .iter()
                .zip(&expected)
                .all(|(got, want)| match (got, want) {
                    (Some(got), Some(want)) => got == want,
                    _ => true,
                });
        if !compatible {
            return Err(RecurrentError::shape_mismatch(&self.name, expected, input_shape));
        }

        self.input_spec = Some(vec![input_shape[0].or(self.batch_size), Some(self.input_dim)]);
        Ok(())
    }

    pub fn output_shape_for(&self, input_shape: &[Option<usize>]) -> SymbolicShape {
        let mut shape = input_shape.to_vec();
        if let (Some(output_dim), Some(last)) = (self.output_dim, shape.last_mut()) {
            *last = Some(output_dim);
        }
        shape
    }
}

/// One timestep of a recurrent transition.
///
/// Implementors hand out their [`CellCore`]; shapes, weights and states are
/// derived from it.
pub trait Cell<B: Backend>: fmt::Debug {
    fn core(&self) -> &CellCore<B>;

    fn core_mut(&mut self) -> &mut CellCore<B>;

    /// Arguments `step` consumes
    fn signature(&self) -> StepSignature;

    /// Compute `(output, new_states)` for one timestep
    fn step(&self, args: StepArgs<B>) -> Result<StepOutput<B>>;

    /// Serialized form, used to rebuild the cell through a registry
    fn get_config(&self) -> Result<LayerConfig>;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn states(&self) -> &[StateSpec<B>] {
        self.core().states()
    }

    fn state_count(&self) -> usize {
        self.core().states().len()
    }

    fn input_shape(&self) -> SymbolicShape {
        self.core().input_shape()
    }

    fn build(&mut self, input_shape: &[Option<usize>]) -> Result<()> {
        self.core_mut().build(input_shape)
    }

    fn output_shape_for(&self, input_shape: &[Option<usize>]) -> SymbolicShape {
        self.core().output_shape_for(input_shape)
    }

    /// Weights, trainable first
    fn weights(&self) -> WeightSet<B> {
        self.core().weights().clone()
    }

    /// Visit every parameter in [`weights`](Cell::weights) order
    fn visit_params(&self, visitor: &mut dyn ParamVisitor<B>) {
        self.core().weights().visit(visitor);
    }

    /// Rewrite every parameter in [`weights`](Cell::weights) order, keeping ids
    fn map_params(&mut self, mapper: &mut dyn ParamMapper<B>) {
        self.core_mut().weights_mut().map(mapper);
    }

    /// Overwrite every weight in [`weights`](Cell::weights) order
    fn set_weights(&mut self, values: Vec<Tensor<B, 2>>) -> Result<()> {
        params::check_values(&self.weights().values(), &values)?;
        self.map_params(&mut ReplaceValues::new(values));
        Ok(())
    }

    fn constants(&self) -> &[Tensor<B, 2>] {
        self.core().constants()
    }
}

/// Call `cell.step` with only the arguments its signature consumes.
///
/// Constants are the cell's own followed by `extra_constants`.
pub fn dispatch_step<B: Backend>(
    cell: &dyn Cell<B>,
    input: Tensor<B, 2>,
    states: Vec<Tensor<B, 2>>,
    extra_constants: &[Tensor<B, 2>],
) -> Result<StepOutput<B>> {
    let signature = cell.signature();
    let args = StepArgs {
        input,
        states: if signature.consumes_states() {
            states
        } else {
            Vec::new()
        },
        weights: if signature.consumes_weights() {
            cell.weights().values()
        } else {
            Vec::new()
        },
        constants: if signature.consumes_constants() {
            cell.constants()
                .iter()
                .chain(extra_constants)
                .cloned()
                .collect()
        } else {
            Vec::new()
        },
    };

    let (output, new_states) = cell.step(args)?;
    if new_states.len() != cell.state_count() {
        return Err(RecurrentError::StateCount {
            cell: cell.name().to_string(),
            expected: cell.state_count(),
            actual: new_states.len(),
        });
    }
    Ok((output, new_states))
}
