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

/// Gated recurrent unit
///
/// - z = sigmoid(x @ W_z + h @ U_z + b_z)
/// - r = sigmoid(x @ W_r + h @ U_r + b_r)
/// - h~ = act(x @ W_h + (r * h) @ U_h + b_h)
/// - h' = z * h + (1 - z) * h~
#[derive(Debug, Clone)]
pub struct GruCell<B: Backend> {
    core: CellCore<B>,
    gates: GateParams<B>,
    units: usize,
    activation: ActivationKind,
}

impl<B: Backend> GruCell<B> {
    pub const CLASS_NAME: &'static str = "GruCell";

    pub fn new(input_dim: usize, units: usize, device: &B::Device) -> Self {
        let core = CellCore::new("gru_cell", input_dim)
            .with_output_dim(units)
            .with_states(vec![StateSpec::batch_by(units)]);
        Self {
            core,
            gates: GateParams::new(input_dim, units, 3 * units, device),
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

impl<B: Backend> Cell<B> for GruCell<B> {
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
        let units = self.units;

        let x_proj = (args.input.matmul(kernel) + bias).chunk(3, 1);
        let h_proj = hidden
            .clone()
            .matmul(recurrent.clone().narrow(1, 0, 2 * units))
            .chunk(2, 1);

        let update = activation::sigmoid(x_proj[0].clone() + h_proj[0].clone());
        let reset = activation::sigmoid(x_proj[1].clone() + h_proj[1].clone());

        let candidate = self.activation.apply(
            x_proj[2].clone() + (reset * hidden.clone()).matmul(recurrent.narrow(1, 2 * units, units)),
        );

        let keep = update.ones_like() - update.clone();
        let new_hidden = update * hidden + keep * candidate;

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
    fn test_gru_weight_layout() {
        let device = get_test_device();
        let cell = GruCell::<TestBackend>::new(6, 4, &device);

        let dims: Vec<[usize; 2]> = cell.weights().iter().map(|w| w.dims()).collect();
        assert_eq!(dims, vec![[6, 12], [4, 12], [1, 12]]);
        assert_eq!(cell.weights().trainable().len(), 3);
    }

    #[test]
    fn test_gru_forward_shapes() {
        let device = get_test_device();
        let cell = GruCell::<TestBackend>::new(6, 4, &device);

        let input = Tensor::<TestBackend, 2>::ones([3, 6], &device);
        let h = Tensor::<TestBackend, 2>::zeros([3, 4], &device);
        let (output, states) = dispatch_step(&cell, input, vec![h], &[]).unwrap();

        assert_eq!(output.dims(), [3, 4]);
        assert_eq!(states[0].dims(), [3, 4]);
    }

    #[test]
    fn test_gru_zero_weights_halve_state() {
        let device = get_test_device();
        let mut cell = GruCell::<TestBackend>::new(2, 3, &device);
        cell.set_weights(vec![
            Tensor::zeros([2, 9], &device),
            Tensor::zeros([3, 9], &device),
            Tensor::zeros([1, 9], &device),
        ])
        .unwrap();

        // z = 0.5 and the candidate is tanh(0) = 0
        let input = Tensor::<TestBackend, 2>::ones([1, 2], &device);
        let h = Tensor::<TestBackend, 2>::full([1, 3], 4.0, &device);
        let (output, _) = dispatch_step(&cell, input, vec![h], &[]).unwrap();

        assert!((output.sum().into_scalar() - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_gru_set_weights_keeps_param_ids() {
        use burn::module::Module;

        let device = get_test_device();
        let mut cell = GruCell::<TestBackend>::new(2, 3, &device);
        let ids = |cell: &GruCell<TestBackend>| {
            let gates = cell.gates();
            [gates.kernel.id, gates.recurrent_kernel.id, gates.bias.id]
        };
        let before = ids(&cell);
        assert_eq!(cell.gates().num_params(), 2 * 9 + 3 * 9 + 9);

        cell.set_weights(vec![
            Tensor::ones([2, 9], &device),
            Tensor::ones([3, 9], &device),
            Tensor::ones([1, 9], &device),
        ])
        .unwrap();

        assert_eq!(ids(&cell), before);
        assert_eq!(cell.gates().kernel.val().sum().into_scalar(), 18.0);
        assert_eq!(cell.weights().iter().next().map(|w| w.id()), Some(before[0]));
    }

    #[test]
    fn test_gru_config_round_trip() {
        let device = get_test_device();
        let cell = GruCell::<TestBackend>::new(2, 3, &device).with_name("decoder");

        let rebuilt =
            GruCell::<TestBackend>::from_config(&cell.get_config().unwrap(), &device).unwrap();
        assert_eq!(rebuilt.name(), "decoder");
        assert_eq!(rebuilt.units(), 3);
        assert_eq!(rebuilt.activation(), ActivationKind::Tanh);
    }
}
