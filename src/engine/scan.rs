//! Scan primitive: apply a step function across the time axis.

use super::Engine;
use crate::error::{RecurrentError, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Bool, Tensor};

/// How [`rnn_scan`] walks the sequence
pub struct ScanOptions<B: Backend> {
    /// Iterate from the last timestep to the first
    pub go_backwards: bool,
    /// `[batch, time]` mask; `false` entries carry the previous output and states
    pub mask: Option<Tensor<B, 2, Bool>>,
    /// Walk a trip count fixed ahead of time instead of the runtime length
    pub unroll: bool,
    /// Declared number of timesteps, if known
    pub input_length: Option<usize>,
}

impl<B: Backend> Default for ScanOptions<B> {
    fn default() -> Self {
        Self {
            go_backwards: false,
            mask: None,
            unroll: false,
            input_length: None,
        }
    }
}

/// Result of a scan
#[derive(Debug)]
pub struct ScanOutput<B: Backend> {
    /// Output of the last processed timestep, `[batch, output]`
    pub last_output: Tensor<B, 2>,
    /// Outputs in processing order, `[batch, time, output]`
    pub outputs: Tensor<B, 3>,
    /// States after the last processed timestep
    pub states: Vec<Tensor<B, 2>>,
}

/// Repeatedly call `step(timestep_input, states) -> (output, new_states)`.
///
/// With `go_backwards` the outputs are stacked in the order they were
/// produced, so the first output belongs to the last input timestep.
pub fn rnn_scan<B, F>(
    mut step: F,
    inputs: Tensor<B, 3>,
    initial_states: Vec<Tensor<B, 2>>,
    options: &ScanOptions<B>,
) -> Result<ScanOutput<B>>
where
    B: Backend,
    F: FnMut(Tensor<B, 2>, Vec<Tensor<B, 2>>) -> Result<(Tensor<B, 2>, Vec<Tensor<B, 2>>)>,
{
    let [batch_size, seq_len, _] = inputs.dims();
    if seq_len == 0 {
        return Err(RecurrentError::EmptySequence);
    }

    let trip_count = match (options.unroll, options.input_length) {
        (true, None) => return Err(RecurrentError::UnrollWithoutLength),
        (_, Some(length)) if length != seq_len => {
            return Err(RecurrentError::shape_mismatch(
                "rnn_scan",
                format!("{length} timesteps"),
                format!("{seq_len} timesteps"),
            ));
        }
        (true, Some(length)) => length,
        (false, _) => seq_len,
    };

    let mask = match &options.mask {
        Some(mask) => {
            let dims = mask.dims();
            if dims != [batch_size, seq_len] {
                return Err(RecurrentError::shape_mismatch(
                    "rnn_scan mask",
                    [batch_size, seq_len],
                    dims,
                ));
            }
            Some(mask.clone().float())
        }
        None => None,
    };

    tracing::trace!(
        timesteps = trip_count,
        go_backwards = options.go_backwards,
        unroll = options.unroll,
        masked = mask.is_some(),
        "scanning sequence"
    );

    let order: Vec<usize> = if options.go_backwards {
        (0..trip_count).rev().collect()
    } else {
        (0..trip_count).collect()
    };

    let mut states = initial_states;
    let mut outputs: Vec<Tensor<B, 2>> = Vec::with_capacity(trip_count);

    for t in order {
        let step_input = Engine::timestep(&inputs, t);
        let (output, new_states) = step(step_input, states.clone())?;

        if new_states.len() != states.len() {
            return Err(RecurrentError::StateCount {
                cell: "rnn_scan step".to_string(),
                expected: states.len(),
                actual: new_states.len(),
            });
        }

        let (output, new_states) = match &mask {
            Some(mask) => {
                // [batch, 1], broadcast over features
                let keep = mask.clone().narrow(1, t, 1);
                let previous = match outputs.last() {
                    Some(previous) => previous.clone(),
                    None => output.zeros_like(),
                };
                let output = blend(&keep, output, previous);
                let new_states = new_states
                    .into_iter()
                    .zip(states)
                    .map(|(new, old)| blend(&keep, new, old))
                    .collect();
                (output, new_states)
            }
            None => (output, new_states),
        };

        states = new_states;
        outputs.push(output);
    }

    let last_output = match outputs.last() {
        Some(last) => last.clone(),
        None => return Err(RecurrentError::EmptySequence),
    };
    let outputs = Tensor::stack(outputs, 1);

    Ok(ScanOutput {
        last_output,
        outputs,
        states,
    })
}

/// `new` where `keep` is 1, `old` where it is 0
fn blend<B: Backend>(keep: &Tensor<B, 2>, new: Tensor<B, 2>, old: Tensor<B, 2>) -> Tensor<B, 2> {
    let skip = keep.clone().neg() + 1.0;
    new * keep.clone() + old * skip
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn running_sum(
        x: Tensor<TestBackend, 2>,
        states: Vec<Tensor<TestBackend, 2>>,
    ) -> Result<(Tensor<TestBackend, 2>, Vec<Tensor<TestBackend, 2>>)> {
        let total = x + states[0].clone();
        Ok((total.clone(), vec![total]))
    }

    fn values(tensor: Tensor<TestBackend, 3>) -> Vec<f32> {
        tensor.into_data().iter::<f32>().collect()
    }

    #[test]
    fn test_scan_accumulates() {
        let device = Default::default();
        let inputs = Tensor::<TestBackend, 3>::ones([2, 3, 1], &device);
        let initial = vec![Tensor::<TestBackend, 2>::zeros([2, 1], &device)];

        let out = rnn_scan(running_sum, inputs, initial, &ScanOptions::default()).unwrap();

        assert_eq!(out.outputs.dims(), [2, 3, 1]);
        assert_eq!(values(out.outputs), vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
        assert_eq!(out.last_output.sum().into_scalar(), 6.0);
        assert_eq!(out.states[0].clone().sum().into_scalar(), 6.0);
    }

    #[test]
    fn test_scan_backwards_order() {
        let device = Default::default();
        let inputs =
            Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0], &device).reshape([1, 3, 1]);
        let initial = vec![Tensor::<TestBackend, 2>::zeros([1, 1], &device)];
        let options = ScanOptions {
            go_backwards: true,
            ..Default::default()
        };

        let out = rnn_scan(running_sum, inputs, initial, &options).unwrap();

        assert_eq!(values(out.outputs), vec![3.0, 5.0, 6.0]);
    }

    #[test]
    fn test_scan_mask_carries_previous() {
        let device = Default::default();
        let inputs = Tensor::<TestBackend, 3>::ones([1, 3, 1], &device);
        let initial = vec![Tensor::<TestBackend, 2>::zeros([1, 1], &device)];
        let mask = Tensor::<TestBackend, 2, Bool>::from_data(
            TensorData::new(vec![true, false, true], [1, 3]),
            &device,
        );
        let options = ScanOptions {
            mask: Some(mask),
            ..Default::default()
        };

        let out = rnn_scan(running_sum, inputs, initial, &options).unwrap();

        // The masked step repeats output 1 and keeps the state at 1
        assert_eq!(values(out.outputs), vec![1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_unroll_requires_length() {
        let device = Default::default();
        let inputs = Tensor::<TestBackend, 3>::ones([1, 3, 1], &device);
        let initial = vec![Tensor::<TestBackend, 2>::zeros([1, 1], &device)];
        let options = ScanOptions {
            unroll: true,
            ..Default::default()
        };

        let err = rnn_scan(running_sum, inputs, initial, &options).unwrap_err();
        assert!(matches!(err, RecurrentError::UnrollWithoutLength));
    }

    #[test]
    fn test_declared_length_must_match() {
        let device = Default::default();
        let inputs = Tensor::<TestBackend, 3>::ones([1, 3, 1], &device);
        let initial = vec![Tensor::<TestBackend, 2>::zeros([1, 1], &device)];
        let options = ScanOptions {
            unroll: true,
            input_length: Some(4),
            ..Default::default()
        };

        let err = rnn_scan(running_sum, inputs, initial, &options).unwrap_err();
        assert!(matches!(err, RecurrentError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_empty_sequence_rejected() {
        let device = Default::default();
        let inputs = Tensor::<TestBackend, 3>::zeros([1, 0, 1], &device);

        let err = rnn_scan(running_sum, inputs, vec![], &ScanOptions::default()).unwrap_err();
        assert!(matches!(err, RecurrentError::EmptySequence));
    }
}
