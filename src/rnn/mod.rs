//! # Recurrent Containers
//!
//! A [`RecurrentContainer`] wraps an ordered pipeline of sub-units as one
//! recurrent layer. **This is the primary API most users should use.**
//!
//! ## Sub-units
//!
//! | Variant | Holds | State |
//! |---------|-------|-------|
//! | [`SubUnit::Cell`] | any [`Cell`](crate::cells::Cell) | owns a fixed slice of the state vector |
//! | [`SubUnit::Plain`] | any [`Layer`](crate::layers::Layer) | none |
//!
//! Each timestep's input passes through the sub-units in the order they were
//! added; the output of unit *i* is the input of unit *i + 1*.
//!
//! ## Tensor Shapes
//!
//! | Tensor | Shape |
//! |--------|-------|
//! | input | `[batch, time, features]` |
//! | mask | `[batch, time]`, `Bool` |
//! | output, `return_sequences=true` | `[batch, time, output]` |
//! | output, `return_sequences=false` (default) | `[batch, output]` |
//!
//! ## Common Patterns
//!
//! ### Stacking a cell and a projection
//!
//! ```ignore
//! let mut rnn = RecurrentContainer::<Backend>::new(&device).with_return_sequences(true);
//! rnn.add(SubUnit::cell(LstmCell::new(16, 32, &device)))?;
//! rnn.add(SubUnit::plain(Dense::new(32, 4, &device)?))?;
//!
//! let forward = rnn.call(input, None)?;
//! // forward.output: [batch, seq_len, 4]
//! ```
//!
//! ### Stateful processing (carry state across batches)
//!
//! ```ignore
//! let mut rnn = RecurrentContainer::<Backend>::new(&device)
//!     .with_stateful(true)
//!     .with_input_length(10);
//! rnn.add(SubUnit::cell(GruCell::new(16, 32, &device).with_batch_size(4)))?;
//!
//! let forward = rnn.call(batch1, None)?;
//! forward.updates.apply(); // persistent buffers now hold the final states
//! let forward = rnn.call(batch2, None)?;
//! ```
//!
//! ### Saving and restoring a pipeline
//!
//! ```ignore
//! let json = rnn.to_json()?;
//! let restored = RecurrentContainer::<Backend>::from_json(&json, &LayerRegistry::with_builtins(), &device)?;
//! ```

mod container;
pub mod registry;
mod sub_unit;

pub use container::{ContainerConfig, Forward, RecurrentContainer, RecurrentOutput};
pub use registry::{LayerFactory, LayerRegistry};
pub use sub_unit::SubUnit;
