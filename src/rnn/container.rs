//! Recurrent container: an ordered pipeline of sub-units run as one
//! recurrent layer.

use super::{LayerRegistry, SubUnit};
use crate::cells::dispatch_step;
use crate::config::LayerConfig;
use crate::engine::{rnn_scan, Engine, ScanOptions, StateUpdates, Variable};
use crate::error::{RecurrentError, Result};
use crate::weights::{BoundRegularizer, FromModuleMapper, FromModuleVisitor};
use crate::SymbolicShape;
use burn::module::{ModuleMapper, ModuleVisitor};
use burn::tensor::backend::Backend;
use burn::tensor::{Bool, Tensor};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// What a forward pass returns
#[derive(Debug, Clone)]
pub enum RecurrentOutput<B: Backend> {
    /// Every timestep, `[batch, time, output]`
    Sequence(Tensor<B, 3>),
    /// Last processed timestep, `[batch, output]`
    Last(Tensor<B, 2>),
}

impl<B: Backend> RecurrentOutput<B> {
    pub fn dims(&self) -> Vec<usize> {
        match self {
            Self::Sequence(tensor) => tensor.dims().to_vec(),
            Self::Last(tensor) => tensor.dims().to_vec(),
        }
    }

    pub fn into_sequence(self) -> Option<Tensor<B, 3>> {
        match self {
            Self::Sequence(tensor) => Some(tensor),
            Self::Last(_) => None,
        }
    }

    pub fn into_last(self) -> Option<Tensor<B, 2>> {
        match self {
            Self::Last(tensor) => Some(tensor),
            Self::Sequence(_) => None,
        }
    }
}

/// Result of [`RecurrentContainer::call`]
#[derive(Debug)]
pub struct Forward<B: Backend> {
    pub output: RecurrentOutput<B>,
    /// State vector after the last processed timestep
    pub final_states: Vec<Tensor<B, 2>>,
    /// Writes of the final states into the persistent buffers; empty unless
    /// the container is stateful. Nothing changes until [`StateUpdates::apply`].
    pub updates: StateUpdates<B>,
}

/// Serialized container: flags plus the pipeline, first unit first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub name: String,
    pub return_sequences: bool,
    pub go_backwards: bool,
    pub stateful: bool,
    #[serde(default)]
    pub input_length: Option<usize>,
    pub unroll: bool,
    pub layers: Vec<LayerConfig>,
}

/// A pipeline of cells and plain layers wrapped as a single recurrent layer.
///
/// Each timestep's input flows through the sub-units in the order they were
/// added. Cells own a fixed slice of the container state vector; plain layers
/// never see state.
///
/// # Example
///
/// ```rust
/// use burn::backend::NdArray;
/// use burn::tensor::Tensor;
/// use cellweave::cells::SimpleRnnCell;
/// use cellweave::layers::Dense;
/// use cellweave::rnn::{RecurrentContainer, SubUnit};
///
/// type Backend = NdArray<f32>;
/// let device = Default::default();
///
/// let mut rnn = RecurrentContainer::<Backend>::new(&device).with_return_sequences(true);
/// rnn.add(SubUnit::cell(SimpleRnnCell::new(4, 8, &device))).unwrap();
/// rnn.add(SubUnit::plain(Dense::new(8, 2, &device).unwrap())).unwrap();
///
/// let input = Tensor::<Backend, 3>::zeros([3, 5, 4], &device);
/// let forward = rnn.call(input, None).unwrap();
/// assert_eq!(forward.output.dims(), vec![3, 5, 2]);
/// ```
#[derive(Debug)]
pub struct RecurrentContainer<B: Backend> {
    engine: Engine<B>,
    name: String,
    return_sequences: bool,
    go_backwards: bool,
    stateful: bool,
    input_length: Option<usize>,
    unroll: bool,
    units: Vec<SubUnit<B>>,
    /// `[offset, offset + k)` into the state vector, one range per sub-unit
    state_ranges: Vec<Range<usize>>,
    /// Per-timestep shape declared by the first sub-unit
    step_input_shape: Option<SymbolicShape>,
    states: Vec<Variable<B>>,
    initial_weights: Option<Vec<Array2<f32>>>,
}

impl<B: Backend> RecurrentContainer<B> {
    /// Empty container emitting only the last output
    pub fn new(device: &B::Device) -> Self {
        Self {
            engine: Engine::new(device),
            name: "recurrent_container".to_string(),
            return_sequences: false,
            go_backwards: false,
            stateful: false,
            input_length: None,
            unroll: false,
            units: Vec::new(),
            state_ranges: Vec::new(),
            step_input_shape: None,
            states: Vec::new(),
            initial_weights: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Emit the whole output sequence instead of the last output
    pub fn with_return_sequences(mut self, return_sequences: bool) -> Self {
        self.return_sequences = return_sequences;
        self
    }

    /// Process timesteps from last to first
    pub fn with_go_backwards(mut self, go_backwards: bool) -> Self {
        self.go_backwards = go_backwards;
        self
    }

    /// Carry state across calls. Set this before adding sub-units; the
    /// persistent buffers are built by `add` or [`reset_states`](Self::reset_states).
    pub fn with_stateful(mut self, stateful: bool) -> Self {
        self.stateful = stateful;
        self
    }

    /// Fix the number of timesteps
    pub fn with_input_length(mut self, input_length: usize) -> Self {
        self.input_length = Some(input_length);
        self
    }

    /// Walk a trip count fixed ahead of time; needs an input length
    pub fn with_unroll(mut self, unroll: bool) -> Self {
        self.unroll = unroll;
        self
    }

    /// Weight snapshot applied by [`build`](Self::build)
    pub fn with_initial_weights(mut self, weights: Vec<Array2<f32>>) -> Self {
        self.initial_weights = Some(weights);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> &Engine<B> {
        &self.engine
    }

    pub fn return_sequences(&self) -> bool {
        self.return_sequences
    }

    pub fn go_backwards(&self) -> bool {
        self.go_backwards
    }

    pub fn is_stateful(&self) -> bool {
        self.stateful
    }

    pub fn input_length(&self) -> Option<usize> {
        self.input_length
    }

    pub fn unroll(&self) -> bool {
        self.unroll
    }

    pub fn supports_masking(&self) -> bool {
        true
    }

    pub fn sub_units(&self) -> &[SubUnit<B>] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// State-vector range owned by each sub-unit; empty for plain layers
    pub fn state_ranges(&self) -> &[Range<usize>] {
        &self.state_ranges
    }

    /// Length of the container state vector
    pub fn state_count(&self) -> usize {
        self.state_ranges.last().map_or(0, |range| range.end)
    }

    /// Persistent buffers; empty unless built by `reset_states`
    pub fn states(&self) -> &[Variable<B>] {
        &self.states
    }

    /// `[batch, input_length, features…]`, known once a sub-unit is added
    pub fn input_shape(&self) -> Option<SymbolicShape> {
        self.step_input_shape.as_ref().map(|shape| {
            let mut full = Vec::with_capacity(shape.len() + 1);
            full.push(shape.first().copied().flatten());
            full.push(self.input_length);
            full.extend(shape.iter().skip(1).copied());
            full
        })
    }

    fn batch_size(&self) -> Option<usize> {
        self.step_input_shape
            .as_ref()
            .and_then(|shape| shape.first().copied().flatten())
    }

    /// Per-timestep shape entering the sub-unit at `index`
    fn shape_before(&self, index: usize) -> Option<SymbolicShape> {
        let start = self.step_input_shape.clone()?;
        Some(
            self.units[..index]
                .iter()
                .fold(start, |shape, unit| unit.output_shape_for(&shape)),
        )
    }

    fn recompute_state_ranges(&mut self) {
        let mut offset = 0;
        self.state_ranges = self
            .units
            .iter()
            .map(|unit| {
                let range = offset..offset + unit.state_count();
                offset = range.end;
                range
            })
            .collect();
    }

    /// Append a sub-unit and build it against the running per-timestep shape.
    ///
    /// The first sub-unit fixes the container input shape. In stateful mode
    /// the persistent buffers are rebuilt; if that fails the unit is removed
    /// again and the container is left as it was.
    pub fn add(&mut self, mut unit: SubUnit<B>) -> Result<()> {
        let first = self.units.is_empty();
        let running = if first {
            unit.input_shape()
                .ok_or_else(|| RecurrentError::MissingInputShape(unit.name().to_string()))?
        } else {
            self.shape_before(self.units.len())
                .ok_or(RecurrentError::EmptyContainer)?
        };
        unit.build(&running)?;

        let previous_shape = self.step_input_shape.clone();
        if first {
            self.step_input_shape = Some(running);
        }
        self.units.push(unit);
        self.recompute_state_ranges();

        if self.stateful {
            if let Err(err) = self.reset_states() {
                self.units.pop();
                self.step_input_shape = previous_shape;
                self.recompute_state_ranges();
                return Err(err);
            }
        }

        tracing::debug!(
            container = %self.name,
            sub_units = self.units.len(),
            states = self.state_count(),
            "added sub-unit"
        );
        Ok(())
    }

    /// Remove the last sub-unit
    pub fn pop(&mut self) -> Result<Option<SubUnit<B>>> {
        let Some(unit) = self.units.pop() else {
            return Ok(None);
        };
        if self.units.is_empty() {
            self.step_input_shape = None;
        }
        self.recompute_state_ranges();

        if self.stateful {
            self.reset_states()?;
        }

        tracing::debug!(
            container = %self.name,
            removed = unit.name(),
            sub_units = self.units.len(),
            "popped sub-unit"
        );
        Ok(Some(unit))
    }

    /// Per-timestep output shape of the pipeline, with the time dimension
    /// spliced in when returning sequences
    pub fn output_shape(&self) -> Result<SymbolicShape> {
        let step_shape = self
            .shape_before(self.units.len())
            .ok_or(RecurrentError::EmptyContainer)?;
        Ok(self.with_time_axis(step_shape, self.input_length))
    }

    /// Output shape for a `[batch, time, features…]` input shape
    pub fn compute_output_shape(&self, input_shape: &[Option<usize>]) -> Result<SymbolicShape> {
        if self.units.is_empty() {
            return Err(RecurrentError::EmptyContainer);
        }
        if input_shape.len() < 3 {
            return Err(RecurrentError::shape_mismatch(
                &self.name,
                "[batch, time, features]",
                input_shape,
            ));
        }
        let mut step_shape = vec![input_shape[0]];
        step_shape.extend_from_slice(&input_shape[2..]);
        let step_shape = self
            .units
            .iter()
            .fold(step_shape, |shape, unit| unit.output_shape_for(&shape));
        Ok(self.with_time_axis(step_shape, input_shape[1].or(self.input_length)))
    }

    fn with_time_axis(&self, mut step_shape: SymbolicShape, length: Option<usize>) -> SymbolicShape {
        if self.return_sequences {
            step_shape.insert(1.min(step_shape.len()), length);
        }
        step_shape
    }

    /// One timestep through the whole pipeline.
    ///
    /// Cells read and write only their own range of `states`; plain layers
    /// are applied to the running input.
    pub fn step(
        &self,
        input: Tensor<B, 2>,
        states: Vec<Tensor<B, 2>>,
        constants: &[Tensor<B, 2>],
    ) -> Result<(Tensor<B, 2>, Vec<Tensor<B, 2>>)> {
        if states.len() != self.state_count() {
            return Err(RecurrentError::StateCount {
                cell: self.name.clone(),
                expected: self.state_count(),
                actual: states.len(),
            });
        }

        let mut states = states;
        let mut x = input;
        for (unit, range) in self.units.iter().zip(&self.state_ranges) {
            match unit {
                SubUnit::Cell(cell) => {
                    let own = states[range.clone()].to_vec();
                    let (output, new_states) = dispatch_step(cell.as_ref(), x, own, constants)?;
                    for (slot, value) in states[range.clone()].iter_mut().zip(new_states) {
                        *slot = value;
                    }
                    x = output;
                }
                SubUnit::Plain(layer) => x = layer.forward(x),
            }
        }
        Ok((x, states))
    }

    /// Fresh initial state vector for `inputs`.
    ///
    /// Each cell's states are built from the first timestep as it reaches
    /// that cell, so later cells see the output of one real step of the
    /// earlier ones.
    pub fn get_initial_states(
        &self,
        inputs: &Tensor<B, 3>,
        constants: &[Tensor<B, 2>],
    ) -> Result<Vec<Tensor<B, 2>>> {
        let [runtime_batch, runtime_length, _] = inputs.dims();
        let batch_size = self.batch_size().unwrap_or(runtime_batch);
        let input_length = self.input_length.unwrap_or(runtime_length);

        let mut running = Engine::first_timestep(inputs);
        let mut initial_states = Vec::with_capacity(self.state_count());
        for unit in &self.units {
            match unit {
                SubUnit::Cell(cell) => {
                    let cell_states = cell
                        .states()
                        .iter()
                        .map(|spec| {
                            spec.initial_value(&self.engine, &running, batch_size, input_length)
                        })
                        .collect::<Result<Vec<_>>>()?;
                    let (output, _) =
                        dispatch_step(cell.as_ref(), running, cell_states.clone(), constants)?;
                    initial_states.extend(cell_states);
                    running = output;
                }
                SubUnit::Plain(layer) => running = layer.forward(running),
            }
        }
        Ok(initial_states)
    }

    /// Rebuild the persistent buffers as zeros (or their literal values).
    ///
    /// Every state must be a shape or a literal. A stateful container also
    /// needs a declared batch size and input length. On error the previous
    /// buffers are kept.
    pub fn reset_states(&mut self) -> Result<()> {
        if self.stateful {
            if self.batch_size().is_none() {
                return Err(RecurrentError::StatefulShape(
                    "the first sub-unit must declare a batch size".to_string(),
                ));
            }
            if self.input_length.is_none() {
                return Err(RecurrentError::StatefulShape(
                    "the container must declare an input length".to_string(),
                ));
            }
        } else {
            tracing::warn!(container = %self.name, "resetting states of a non-stateful container");
        }
        let batch_size = self.batch_size();
        let mut buffers = Vec::with_capacity(self.state_count());
        for unit in &self.units {
            if let SubUnit::Cell(cell) = unit {
                for spec in cell.states() {
                    buffers.push(spec.persistent_value(&self.engine, batch_size, self.input_length)?);
                }
            }
        }
        self.states = buffers;

        tracing::debug!(container = %self.name, states = self.states.len(), "reset persistent states");
        Ok(())
    }

    fn check_input(&self, inputs: &Tensor<B, 3>) -> Result<()> {
        let declared = self.input_shape().ok_or(RecurrentError::EmptyContainer)?;
        let actual = inputs.dims();
        if actual[1] == 0 {
            return Err(RecurrentError::EmptySequence);
        }
        let compatible = declared.len() == actual.len()
            && declared
                .iter()
                .zip(actual.iter())
                .all(|(want, got)| want.map_or(true, |want| want == *got));
        if compatible {
            Ok(())
        } else {
            Err(RecurrentError::shape_mismatch(&self.name, declared, actual))
        }
    }

    /// Run the pipeline over `inputs` (`[batch, time, features]`).
    ///
    /// `mask` is `[batch, time]`; masked timesteps carry the previous output
    /// and states forward.
    pub fn call(&self, inputs: Tensor<B, 3>, mask: Option<Tensor<B, 2, Bool>>) -> Result<Forward<B>> {
        self.call_with_constants(inputs, mask, &[])
    }

    /// Like [`call`](Self::call), with extra tensors appended to the
    /// constants of every cell that consumes constants
    pub fn call_with_constants(
        &self,
        inputs: Tensor<B, 3>,
        mask: Option<Tensor<B, 2, Bool>>,
        constants: &[Tensor<B, 2>],
    ) -> Result<Forward<B>> {
        if self.initial_weights.is_some() {
            return Err(RecurrentError::PendingInitialWeights);
        }
        self.check_input(&inputs)?;

        if !constants.is_empty()
            && !self.units.iter().any(|unit| match unit {
                SubUnit::Cell(cell) => cell.signature().consumes_constants(),
                SubUnit::Plain(_) => false,
            })
        {
            tracing::warn!(
                container = %self.name,
                constants = constants.len(),
                "no sub-unit consumes constants"
            );
        }

        let initial_states = if self.stateful {
            if self.states.len() != self.state_count() {
                return Err(RecurrentError::StatefulShape(
                    "persistent states are not built; call reset_states".to_string(),
                ));
            }
            self.states.iter().map(Variable::value).collect()
        } else {
            self.get_initial_states(&inputs, constants)?
        };

        let options = ScanOptions {
            go_backwards: self.go_backwards,
            mask,
            unroll: self.unroll,
            input_length: self.input_length,
        };
        let scanned = rnn_scan(
            |x, states| self.step(x, states, constants),
            inputs,
            initial_states,
            &options,
        )?;

        let mut updates = StateUpdates::new();
        if self.stateful {
            for (buffer, value) in self.states.iter().zip(&scanned.states) {
                updates.push(buffer.clone(), value.clone());
            }
        }

        let output = if self.return_sequences {
            RecurrentOutput::Sequence(scanned.outputs)
        } else {
            RecurrentOutput::Last(scanned.last_output)
        };
        Ok(Forward {
            output,
            final_states: scanned.states,
            updates,
        })
    }

    /// Every weight of the pipeline: all trainable weights, then all
    /// non-trainable ones, each sub-unit by sub-unit
    pub fn weights(&self) -> Vec<Tensor<B, 2>> {
        let mut weights = self.trainable_weights();
        weights.extend(self.non_trainable_weights());
        weights
    }

    /// Run a Burn [`ModuleVisitor`] over every parameter of the pipeline.
    /// Rank-1 parameters are presented as `[1, n]` rows.
    pub fn visit<V: ModuleVisitor<B>>(&self, visitor: &mut V) {
        let mut bridge = FromModuleVisitor(visitor);
        for unit in &self.units {
            unit.visit_params(&mut bridge);
        }
    }

    /// Run a Burn [`ModuleMapper`] over every parameter of the pipeline,
    /// keeping parameter ids
    pub fn map<M: ModuleMapper<B>>(&mut self, mapper: &mut M) {
        let mut bridge = FromModuleMapper(mapper);
        for unit in &mut self.units {
            unit.map_params(&mut bridge);
        }
    }

    pub fn trainable_weights(&self) -> Vec<Tensor<B, 2>> {
        self.units.iter().flat_map(SubUnit::trainable_weights).collect()
    }

    pub fn non_trainable_weights(&self) -> Vec<Tensor<B, 2>> {
        self.units
            .iter()
            .flat_map(SubUnit::non_trainable_weights)
            .collect()
    }

    pub fn regularizers(&self) -> Vec<BoundRegularizer<B>> {
        self.units.iter().flat_map(SubUnit::regularizers).collect()
    }

    /// Sum of all regularizer penalties, shape `[1]`
    pub fn regularization_penalty(&self) -> Tensor<B, 1> {
        self.regularizers()
            .iter()
            .map(|regularizer| regularizer.penalty())
            .fold(Tensor::zeros([1], self.engine.device()), |total, penalty| {
                total + penalty
            })
    }

    /// Copy every weight to host memory, in [`weights`](Self::weights) order
    pub fn get_weights(&self) -> Result<Vec<Array2<f32>>> {
        self.weights()
            .iter()
            .map(Engine::array_from_tensor)
            .collect()
    }

    /// Overwrite every weight, in [`weights`](Self::weights) order.
    ///
    /// Counts and shapes are checked before anything is written.
    pub fn set_weights(&mut self, arrays: &[Array2<f32>]) -> Result<()> {
        let current = self.weights();
        if arrays.len() != current.len() {
            return Err(RecurrentError::WeightCount {
                expected: current.len(),
                actual: arrays.len(),
            });
        }
        for (index, (tensor, array)) in current.iter().zip(arrays).enumerate() {
            let expected = tensor.dims();
            let actual = [array.nrows(), array.ncols()];
            if expected != actual {
                return Err(RecurrentError::WeightShape {
                    index,
                    expected,
                    actual,
                });
            }
        }

        let total_trainable = self.trainable_weights().len();
        let (trainable, frozen) = arrays.split_at(total_trainable);
        let mut trainable = trainable.iter();
        let mut frozen = frozen.iter();
        for unit in &mut self.units {
            let trainable_count = unit.trainable_weights().len();
            let frozen_count = unit.non_trainable_weights().len();
            let chunk: Vec<Tensor<B, 2>> = trainable
                .by_ref()
                .take(trainable_count)
                .chain(frozen.by_ref().take(frozen_count))
                .map(|array| self.engine.tensor_from_array(array))
                .collect();
            unit.set_weights(chunk)?;
        }
        Ok(())
    }

    /// Apply the weight snapshot given to
    /// [`with_initial_weights`](Self::with_initial_weights), once
    pub fn build(&mut self) -> Result<()> {
        if let Some(weights) = self.initial_weights.take() {
            if let Err(err) = self.set_weights(&weights) {
                self.initial_weights = Some(weights);
                return Err(err);
            }
            tracing::debug!(container = %self.name, weights = weights.len(), "applied initial weights");
        }
        Ok(())
    }

    pub fn get_config(&self) -> Result<ContainerConfig> {
        Ok(ContainerConfig {
            name: self.name.clone(),
            return_sequences: self.return_sequences,
            go_backwards: self.go_backwards,
            stateful: self.stateful,
            input_length: self.input_length,
            unroll: self.unroll,
            layers: self
                .units
                .iter()
                .map(SubUnit::get_config)
                .collect::<Result<_>>()?,
        })
    }

    /// Rebuild flags first, then the pipeline through `registry`
    pub fn from_config(
        config: &ContainerConfig,
        registry: &LayerRegistry<B>,
        device: &B::Device,
    ) -> Result<Self> {
        let mut container = Self::new(device)
            .with_name(config.name.clone())
            .with_return_sequences(config.return_sequences)
            .with_go_backwards(config.go_backwards)
            .with_stateful(config.stateful)
            .with_unroll(config.unroll);
        container.input_length = config.input_length;

        for layer in &config.layers {
            container.add(registry.build(layer, device)?)?;
        }
        Ok(container)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.get_config()?)?)
    }

    pub fn from_json(json: &str, registry: &LayerRegistry<B>, device: &B::Device) -> Result<Self> {
        let config: ContainerConfig = serde_json::from_str(json)?;
        Self::from_config(&config, registry, device)
    }
}
