//! Cells whose transition is a user closure.

use super::{Cell, CellCore, StateSpec, StepArgs, StepOutput, StepSignature};
use crate::config::LayerConfig;
use crate::error::Result;
use crate::weights::Weight;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

type InputFn<B> = dyn Fn(Tensor<B, 2>) -> StepOutput<B>;
type InputStateFn<B> = dyn Fn(Tensor<B, 2>, Vec<Tensor<B, 2>>) -> StepOutput<B>;
type InputStateWeightsFn<B> =
    dyn Fn(Tensor<B, 2>, Vec<Tensor<B, 2>>, Vec<Tensor<B, 2>>) -> StepOutput<B>;
type InputStateWeightsConstantsFn<B> = dyn Fn(
    Tensor<B, 2>,
    Vec<Tensor<B, 2>>,
    Vec<Tensor<B, 2>>,
    Vec<Tensor<B, 2>>,
) -> StepOutput<B>;

/// A step closure. The variant fixes how many arguments it takes, so the
/// cell's [`StepSignature`] is known when the cell is constructed.
pub enum StepFn<B: Backend> {
    Input(Box<InputFn<B>>),
    InputState(Box<InputStateFn<B>>),
    InputStateWeights(Box<InputStateWeightsFn<B>>),
    InputStateWeightsConstants(Box<InputStateWeightsConstantsFn<B>>),
}

impl<B: Backend> StepFn<B> {
    pub fn input(f: impl Fn(Tensor<B, 2>) -> StepOutput<B> + 'static) -> Self {
        Self::Input(Box::new(f))
    }

    pub fn input_state(
        f: impl Fn(Tensor<B, 2>, Vec<Tensor<B, 2>>) -> StepOutput<B> + 'static,
    ) -> Self {
        Self::InputState(Box::new(f))
    }

    pub fn input_state_weights(
        f: impl Fn(Tensor<B, 2>, Vec<Tensor<B, 2>>, Vec<Tensor<B, 2>>) -> StepOutput<B> + 'static,
    ) -> Self {
        Self::InputStateWeights(Box::new(f))
    }

    pub fn input_state_weights_constants(
        f: impl Fn(Tensor<B, 2>, Vec<Tensor<B, 2>>, Vec<Tensor<B, 2>>, Vec<Tensor<B, 2>>) -> StepOutput<B>
            + 'static,
    ) -> Self {
        Self::InputStateWeightsConstants(Box::new(f))
    }

    pub fn signature(&self) -> StepSignature {
        match self {
            Self::Input(_) => StepSignature::Input,
            Self::InputState(_) => StepSignature::InputState,
            Self::InputStateWeights(_) => StepSignature::InputStateWeights,
            Self::InputStateWeightsConstants(_) => StepSignature::InputStateWeightsConstants,
        }
    }
}

/// Settings written by [`FnCell::get_config`] when no custom config is attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnCellConfig {
    pub name: String,
    pub input_dim: usize,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub output_dim: Option<usize>,
    pub signature: StepSignature,
}

/// A cell built from a closure plus declared states, weights and constants.
///
/// Closures cannot be serialized, so rebuilding an `FnCell` from a container
/// config needs a factory registered under its class name
/// (see [`LayerRegistry`](crate::rnn::LayerRegistry)).
pub struct FnCell<B: Backend> {
    core: CellCore<B>,
    step: StepFn<B>,
    class_name: String,
    config: Option<Value>,
}

impl<B: Backend> FnCell<B> {
    pub const CLASS_NAME: &'static str = "FnCell";

    pub fn new(name: impl Into<String>, input_dim: usize, step: StepFn<B>) -> Self {
        Self {
            core: CellCore::new(name, input_dim),
            step,
            class_name: Self::CLASS_NAME.to_string(),
            config: None,
        }
    }

    pub fn with_output_dim(mut self, output_dim: usize) -> Self {
        self.core = self.core.with_output_dim(output_dim);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.core = self.core.with_batch_size(batch_size);
        self
    }

    /// Declare one more state
    pub fn with_state(mut self, state: StateSpec<B>) -> Self {
        self.core.states_mut().push(state);
        self
    }

    pub fn with_states(mut self, states: Vec<StateSpec<B>>) -> Self {
        self.core = self.core.with_states(states);
        self
    }

    pub fn with_weights<W: Into<Weight<B>>>(mut self, weights: impl IntoIterator<Item = W>) -> Self {
        self.core = self.core.with_weights(weights);
        self
    }

    pub fn with_constants(mut self, constants: Vec<Tensor<B, 2>>) -> Self {
        self.core = self.core.with_constants(constants);
        self
    }

    /// Class name and settings to emit from `get_config`
    pub fn with_config(mut self, class_name: impl Into<String>, config: Value) -> Self {
        self.class_name = class_name.into();
        self.config = Some(config);
        self
    }

    /// Replace the weight list; prior weights are dropped
    pub fn set_weight_list<W: Into<Weight<B>>>(&mut self, weights: impl IntoIterator<Item = W>) {
        self.core.weights_mut().assign(weights);
    }
}

impl<B: Backend> Cell<B> for FnCell<B> {
    fn core(&self) -> &CellCore<B> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CellCore<B> {
        &mut self.core
    }

    fn signature(&self) -> StepSignature {
        self.step.signature()
    }

    fn step(&self, args: StepArgs<B>) -> Result<StepOutput<B>> {
        let StepArgs {
            input,
            states,
            weights,
            constants,
        } = args;
        let output = match &self.step {
            StepFn::Input(f) => f(input),
            StepFn::InputState(f) => f(input, states),
            StepFn::InputStateWeights(f) => f(input, states, weights),
            StepFn::InputStateWeightsConstants(f) => f(input, states, weights, constants),
        };
        Ok(output)
    }

    fn get_config(&self) -> Result<LayerConfig> {
        match &self.config {
            Some(config) => Ok(LayerConfig {
                class_name: self.class_name.clone(),
                config: config.clone(),
            }),
            None => LayerConfig::new(
                self.class_name.clone(),
                &FnCellConfig {
                    name: self.core.name().to_string(),
                    input_dim: self.core.input_dim(),
                    batch_size: self.core.batch_size(),
                    output_dim: self.core.output_dim(),
                    signature: self.signature(),
                },
            ),
        }
    }
}

impl<B: Backend> fmt::Debug for FnCell<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCell")
            .field("core", &self.core)
            .field("signature", &self.signature())
            .field("class_name", &self.class_name)
            .finish()
    }
}
