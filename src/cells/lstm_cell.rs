use super::{
    unpack_gate_weights, Cell, CellCore, GateParams, RecurrentCellConfig, StateSpec, StepArgs,
    StepOutput, StepSignature,
};
use crate::activation::ActivationKind;
use crate::config::LayerConfig;
use crate::error::{RecurrentError, Result};
use crate::weights::{ParamMapper, ParamVisitor, WeightSet};
use burn::tensor::activation;
use burn::tensor::backend::Backend;

/// Standard LSTM cell
///
/// Implements the standard LSTM equations:
/// - i = act(W_i @ x + U_i @ h + b_i)
/// - g = sigmoid(W_g @ x + U_g @ h + b_g)
/// - f = sigmoid(W_f @ x + U_f @ h + b_f + 1)
/// - o = sigmoid(W_o @ x + U_o @ h + b_o)
/// - c' = f * c + i * g
/// - h' = o * act(c')
///
/// States are `[h, c]`; the output is `h'`.
#[derive(Debug, Clone)]
pub struct LstmCell<B: Backend> {
    core: CellCore<B>,
    gates: GateParams<B>,
    units: usize,
    activation: ActivationKind,
}

impl<B: Backend> LstmCell<B> {
    pub const CLASS_NAME: &'static str = "LstmCell";

    /// Create a new LSTM cell
    ///
    /// # Arguments
    /// * `input_dim` - Size of the input features
    /// * `units` - Size of the hidden and cell states
    /// * `device` - Device to create the weights on
    ///
    /// # Returns
    /// A cell whose kernel maps to `4 * units` gate pre-activations
    pub fn new(input_dim: usize, units: usize, device: &B::Device) -> Self {
        let core = CellCore::new("lstm_cell", input_dim)
            .with_output_dim(units)
            .with_states(vec![StateSpec::batch_by(units), StateSpec::batch_by(units)]);
        Self {
            core,
            gates: GateParams::new(input_dim, units, 4 * units, device),
            units,
            activation: ActivationKind::Tanh,
        }
    }

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

    /// Get the hidden size
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

impl<B: Backend> Cell<B> for LstmCell<B> {
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
        let (hidden_state, cell_state) = match <[_; 2]>::try_from(args.states) {
            Ok([h, c]) => (h, c),
            Err(states) => {
                return Err(RecurrentError::StateCount {
                    cell: self.core.name().to_string(),
                    expected: 2,
                    actual: states.len(),
                })
            }
        };

        // Combined transformation
        let z = args.input.matmul(kernel) + hidden_state.matmul(recurrent) + bias;

        // Split into 4 gates
        let chunks = z.chunk(4, 1);
        let input_activation = self.activation.apply(chunks[0].clone());
        let input_gate = activation::sigmoid(chunks[1].clone());
        let forget_gate = activation::sigmoid(chunks[2].clone() + 1.0);
        let output_gate = activation::sigmoid(chunks[3].clone());

        // c' = f * c + i * g
        let new_cell = cell_state * forget_gate + input_activation * input_gate;
        // h' = o * act(c')
        let new_hidden = self.activation.apply(new_cell.clone()) * output_gate;

        Ok((new_hidden.clone(), vec![new_hidden, new_cell]))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::dispatch_step;
    use burn::backend::NdArray;
    use burn::tensor::backend::Backend as BurnBackend;
    use burn::tensor::Tensor;

    type TestBackend = NdArray<f32>;
    type TestDevice = <TestBackend as BurnBackend>::Device;

    fn get_test_device() -> TestDevice {
        Default::default()
    }

    #[test]
    fn test_lstm_cell_creation() {
        let device = get_test_device();
        let cell = LstmCell::<TestBackend>::new(20, 50, &device);

        assert_eq!(cell.units(), 50);
        assert_eq!(cell.state_count(), 2);
        let dims: Vec<[usize; 2]> = cell.weights().iter().map(|w| w.dims()).collect();
        assert_eq!(dims, vec![[20, 200], [50, 200], [1, 200]]);
    }

    #[test]
    fn test_lstm_forward() {
        let device = get_test_device();
        let cell = LstmCell::<TestBackend>::new(20, 50, &device);

        let batch_size = 4;
        let input = Tensor::<TestBackend, 2>::zeros([batch_size, 20], &device);
        let h = Tensor::<TestBackend, 2>::zeros([batch_size, 50], &device);
        let c = Tensor::<TestBackend, 2>::zeros([batch_size, 50], &device);

        let (output, states) = dispatch_step(&cell, input, vec![h, c], &[]).unwrap();

        assert_eq!(output.dims(), [batch_size, 50]);
        assert_eq!(states[0].dims(), [batch_size, 50]);
        assert_eq!(states[1].dims(), [batch_size, 50]);
    }

    #[test]
    fn test_lstm_state_persistence() {
        let device = get_test_device();
        let cell = LstmCell::<TestBackend>::new(10, 20, &device);

        let mut states = vec![
            Tensor::<TestBackend, 2>::zeros([1, 20], &device),
            Tensor::<TestBackend, 2>::zeros([1, 20], &device),
        ];
        for _ in 0..3 {
            let input = Tensor::<TestBackend, 2>::random(
                [1, 10],
                burn::tensor::Distribution::Uniform(0.0, 1.0),
                &device,
            );
            let (_, next) = dispatch_step(&cell, input, states, &[]).unwrap();
            states = next;
        }

        let h_sum = states[0].clone().abs().sum().into_scalar();
        let c_sum = states[1].clone().abs().sum().into_scalar();
        assert!(
            h_sum != 0.0 || c_sum != 0.0,
            "States should have changed after processing sequence"
        );
    }

    #[test]
    fn test_lstm_forget_gate() {
        let device = get_test_device();
        let cell = LstmCell::<TestBackend>::new(10, 20, &device);

        let h = Tensor::<TestBackend, 2>::zeros([1, 20], &device);
        let c = Tensor::<TestBackend, 2>::ones([1, 20], &device) * 10.0;
        let input = Tensor::<TestBackend, 2>::zeros([1, 10], &device);

        let (_, states) = dispatch_step(&cell, input, vec![h, c], &[]).unwrap();

        // Zero input and bias leave f = sigmoid(1) on every unit
        let expected = 10.0 * 20.0 / (1.0 + (-1.0f32).exp());
        let c_sum_new: f32 = states[1].clone().sum().into_scalar();
        assert!((c_sum_new - expected).abs() < 1e-3);
    }

    #[test]
    fn test_lstm_rejects_missing_state() {
        let device = get_test_device();
        let cell = LstmCell::<TestBackend>::new(2, 3, &device);
        let args = StepArgs {
            input: Tensor::zeros([1, 2], &device),
            states: vec![Tensor::zeros([1, 3], &device)],
            weights: cell.weights().values(),
            constants: vec![],
        };

        assert!(matches!(
            cell.step(args),
            Err(RecurrentError::StateCount { expected: 2, actual: 1, .. })
        ));
    }
}
