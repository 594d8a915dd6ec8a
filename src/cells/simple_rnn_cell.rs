use super::{
    unpack_gate_weights, Cell, CellCore, GateParams, RecurrentCellConfig, StateSpec, StepArgs,
    StepOutput, StepSignature,
};
use crate::activation::ActivationKind;
use crate::config::LayerConfig;
use crate::error::{RecurrentError, Result};
use crate::weights::{ParamMapper, ParamVisitor, WeightSet};
use burn::tensor::backend::Backend;

/// Fully-connected recurrent cell
///
/// Implements:
/// - h' = act(x @ W + h @ U + b)
///
/// The output is the new hidden state.
#[derive(Debug, Clone)]
pub struct SimpleRnnCell<B: Backend> {
    core: CellCore<B>,
    gates: GateParams<B>,
    units: usize,
    activation: ActivationKind,
}

impl<B: Backend> SimpleRnnCell<B> {
    pub const CLASS_NAME: &'static str = "SimpleRnnCell";

    /// Create a new cell with a tanh activation
    ///
    /// # Arguments
    /// * `input_dim` - Size of the per-timestep input
    /// * `units` - Size of the hidden state
    /// * `device` - Device the weights live on
    pub fn new(input_dim: usize, units: usize, device: &B::Device) -> Self {
        let core = CellCore::new("simple_rnn_cell", input_dim)
            .with_output_dim(units)
            .with_states(vec![StateSpec::batch_by(units)]);
        Self {
            core,
            gates: GateParams::new(input_dim, units, units, device),
            units,
            activation: ActivationKind::Tanh,
        }
    }

    /// Rebuild from the settings written by `get_config`
    pub fn from_config(config: &LayerConfig, device: &B::Device) -> Result<Self> {
        let settings: RecurrentCellConfig = config.parse()?;
        if settings.units == 0 {
            return Err(RecurrentError::invalid_config(
                Self::CLASS_NAME,
                "units must be positive",
            ));
        }
        let mut cell = Self::new(settings.input_dim, settings.units, device)
            .with_name(settings.name)
            .with_activation(settings.activation);
        if let Some(batch_size) = settings.batch_size {
            cell = cell.with_batch_size(batch_size);
        }
        Ok(cell)
    }

    pub fn with_activation(mut self, activation: ActivationKind) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.core = self.core.with_batch_size(batch_size);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.core = self.core.with_name(name);
        self
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn activation(&self) -> ActivationKind {
        self.activation
    }

    /// Kernel, recurrent kernel and bias as a Burn module
    pub fn gates(&self) -> &GateParams<B> {
        &self.gates
    }
}

impl<B: Backend> Cell<B> for SimpleRnnCell<B> {
    fn core(&self) -> &CellCore<B> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CellCore<B> {
        &mut self.core
    }

    fn weights(&self) -> WeightSet<B> {
        self.gates.weight_set()
    }

    fn visit_params(&self, visitor: &mut dyn ParamVisitor<B>) {
        self.gates.visit_params(visitor);
    }

    fn map_params(&mut self, mapper: &mut dyn ParamMapper<B>) {
        self.gates.map_params(mapper);
    }

    fn signature(&self) -> StepSignature {
        StepSignature::InputStateWeights
    }

    fn step(&self, args: StepArgs<B>) -> Result<StepOutput<B>> {
        let (kernel, recurrent, bias) = unpack_gate_weights(&args.weights)?;
        let hidden = args
            .states
            .into_iter()
            .next()
            .ok_or(RecurrentError::StateCount {
                cell: self.core.name().to_string(),
                expected: 1,
                actual: 0,
            })?;

        let z = args.input.matmul(kernel) + hidden.matmul(recurrent) + bias;
        let new_hidden = self.activation.apply(z);

        Ok((new_hidden.clone(), vec![new_hidden]))
    }

    fn get_config(&self) -> Result<LayerConfig> {
        LayerConfig::new(
            Self::CLASS_NAME,
            &RecurrentCellConfig {
                name: self.core.name().to_string(),
                input_dim: self.core.input_dim(),
                units: self.units,
                batch_size: self.core.batch_size(),
                activation: self.activation,
            },
        )
    }
}
