//! # cellweave - Composable Recurrent Cells (Rust)
//!
//! Build recurrent layers out of small pieces using the Burn framework.
//!
//! ## Features
//!
//! - **Cells**: per-timestep transitions with declared states, weights and constants
//! - **Stock cells**: SimpleRNN, LSTM, GRU, and closure-backed [`FnCell`](cells::FnCell)
//! - **Plain layers**: Dense and Activation, usable between cells
//! - **Containers**: pipelines of cells and layers run over a sequence, with
//!   masking, reverse iteration, unrolling and persistent state
//! - **Serialization**: container configs round-trip through JSON
//!
//! ## Quick Start
//!
//! ```rust
//! use cellweave::prelude::*;
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//!
//! type Backend = NdArray<f32>;
//! let device = Default::default();
//!
//! // new_state = input + state, output = new_state
//! let running_sum = FnCell::<Backend>::new(
//!     "running_sum",
//!     1,
//!     StepFn::input_state(|x, states| {
//!         let total = x + states[0].clone();
//!         (total.clone(), vec![total])
//!     }),
//! )
//! .with_state(StateSpec::batch_by(1));
//!
//! let mut rnn = RecurrentContainer::<Backend>::new(&device).with_return_sequences(true);
//! rnn.add(SubUnit::cell(running_sum)).unwrap();
//!
//! let input = Tensor::<Backend, 3>::ones([2, 3, 1], &device);
//! let output = rnn.call(input, None).unwrap().output;
//! assert_eq!(output.dims(), vec![2, 3, 1]);
//! ```

pub mod activation;
pub mod cells;
pub mod config;
pub mod engine;
pub mod error;
pub mod layers;
pub mod rnn;
pub mod weights;

/// Shape whose dimensions may be unknown until a tensor arrives
pub type SymbolicShape = Vec<Option<usize>>;

pub use error::{RecurrentError, Result};

pub mod prelude {
    pub use crate::activation::{ActivationKind, LeCun};
    pub use crate::cells::{
        Cell, FnCell, GruCell, LstmCell, SimpleRnnCell, StateDim, StateSpec, StepFn, StepSignature,
    };
    pub use crate::config::LayerConfig;
    pub use crate::error::{RecurrentError, Result};
    pub use crate::layers::{Activation, Dense, DenseConfig, Layer};
    pub use crate::rnn::{LayerRegistry, RecurrentContainer, RecurrentOutput, SubUnit};
    pub use crate::weights::{Regularizer, Weight};
}
