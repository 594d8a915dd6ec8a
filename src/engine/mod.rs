//! # Tensor Engine Wrapper
//!
//! The pieces of the tensor engine the container consumes, expressed over Burn:
//!
//! | Item | Role |
//! |------|------|
//! | [`Engine`] | Device handle: zero-filled tensors, literal arrays, time slicing |
//! | [`rnn_scan`] | Applies a step function across the time axis |
//! | [`Variable`] | Mutable buffer that outlives a forward pass |
//! | [`StateUpdates`] | Deferred `(variable, new value)` writes |
//!
//! The engine is chosen once, when a container is created, through the backend
//! type parameter and the device handed to [`Engine::new`].

mod scan;
mod variable;

pub use scan::{rnn_scan, ScanOptions, ScanOutput};
pub use variable::{StateUpdates, Variable};

use crate::error::Result;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::Array2;

/// Handle on the tensor engine for one device.
#[derive(Debug, Clone)]
pub struct Engine<B: Backend> {
    device: B::Device,
}

impl<B: Backend> Engine<B> {
    /// Bind the engine to a device
    pub fn new(device: &B::Device) -> Self {
        Self {
            device: device.clone(),
        }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Zero-filled tensor of the given shape
    pub fn zeros(&self, dims: [usize; 2]) -> Tensor<B, 2> {
        Tensor::zeros(dims, &self.device)
    }

    /// Copy a literal array onto the device
    pub fn tensor_from_array(&self, array: &Array2<f32>) -> Tensor<B, 2> {
        let shape = array.shape();
        let data: Vec<f32> = array.iter().copied().collect();
        Tensor::<B, 1>::from_floats(data.as_slice(), &self.device).reshape([shape[0], shape[1]])
    }

    /// Wrap a literal array as an engine variable
    pub fn variable(&self, array: &Array2<f32>) -> Variable<B> {
        Variable::new(self.tensor_from_array(array))
    }

    /// Read a rank-2 tensor back into host memory
    pub fn array_from_tensor(tensor: &Tensor<B, 2>) -> Result<Array2<f32>> {
        let [rows, cols] = tensor.dims();
        let data = tensor.to_data();
        let values: Vec<f32> = data.iter::<f32>().collect();
        Ok(Array2::from_shape_vec((rows, cols), values)?)
    }

    /// Input at timestep `t` of a `[batch, time, features]` tensor
    pub fn timestep(inputs: &Tensor<B, 3>, t: usize) -> Tensor<B, 2> {
        inputs.clone().narrow(1, t, 1).squeeze(1)
    }

    /// Input at the first timestep
    pub fn first_timestep(inputs: &Tensor<B, 3>) -> Tensor<B, 2> {
        Self::timestep(inputs, 0)
    }
}
