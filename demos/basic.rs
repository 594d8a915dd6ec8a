//! Basic usage of a recurrent container
//!
//! Builds an LSTM + Dense pipeline, runs it over a batch, carries state
//! across batches, and saves/restores the pipeline as JSON.

use burn::backend::NdArray;
use burn::tensor::Tensor;
use cellweave::prelude::*;

fn main() -> Result<()> {
    println!("=== cellweave Basic Example ===\n");

    type Backend = NdArray<f32>;
    let device = Default::default();

    // Example 1: Cell followed by a projection
    println!("Example 1: LSTM + Dense, full sequence");
    let mut rnn = RecurrentContainer::<Backend>::new(&device).with_return_sequences(true);
    rnn.add(SubUnit::cell(LstmCell::new(20, 32, &device)))?;
    rnn.add(SubUnit::plain(
        DenseConfig::new(32, 4)
            .with_activation(ActivationKind::Sigmoid)
            .init(&device)?,
    ))?;

    // Input shape: [batch=4, seq=10, features=20]
    let input = Tensor::<Backend, 3>::random(
        [4, 10, 20],
        burn::tensor::Distribution::Uniform(-1.0, 1.0),
        &device,
    );
    let forward = rnn.call(input.clone(), None)?;

    println!("  Input shape:  [4, 10, 20]");
    println!("  Output shape: {:?}", forward.output.dims());
    println!("  States:       {}", forward.final_states.len());
    println!();

    // Example 2: Persistent state across batches
    println!("Example 2: Stateful GRU");
    let mut stateful = RecurrentContainer::<Backend>::new(&device)
        .with_stateful(true)
        .with_input_length(10);
    stateful.add(SubUnit::cell(GruCell::new(20, 16, &device).with_batch_size(4)))?;

    for batch in 0..3 {
        let forward = stateful.call(input.clone(), None)?;
        forward.updates.apply();
        let carried = stateful.states()[0].value().abs().mean().into_scalar();
        println!("  After batch {}: mean |h| = {:.4}", batch, carried);
    }
    stateful.reset_states()?;
    println!("  Reset: mean |h| = {:.4}", stateful.states()[0].value().abs().mean().into_scalar());
    println!();

    // Example 3: Save and restore
    println!("Example 3: JSON round trip");
    let json = rnn.to_json()?;
    let restored =
        RecurrentContainer::<Backend>::from_json(&json, &LayerRegistry::with_builtins(), &device)?;
    println!("  Sub-units restored: {}", restored.len());
    println!("  Output shape:       {:?}", restored.output_shape()?);

    Ok(())
}
