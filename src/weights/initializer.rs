use crate::error::{RecurrentError, Result};
use burn::nn::Initializer;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Names accepted by [`get`]
pub const INITIALIZER_NAMES: [&str; 9] = [
    "zeros",
    "ones",
    "uniform",
    "normal",
    "glorot_uniform",
    "glorot_normal",
    "he_uniform",
    "he_normal",
    "lecun_uniform",
];

/// Look an initializer up by name
pub fn get(name: &str) -> Result<Initializer> {
    let initializer = match name {
        "zeros" => Initializer::Zeros,
        "ones" => Initializer::Ones,
        "uniform" => Initializer::Uniform {
            min: -0.05,
            max: 0.05,
        },
        "normal" => Initializer::Normal {
            mean: 0.0,
            std: 0.05,
        },
        "glorot_uniform" => Initializer::XavierUniform { gain: 1.0 },
        "glorot_normal" => Initializer::XavierNormal { gain: 1.0 },
        "he_uniform" => Initializer::KaimingUniform {
            gain: std::f64::consts::SQRT_2,
            fan_out_only: false,
        },
        "he_normal" => Initializer::KaimingNormal {
            gain: std::f64::consts::SQRT_2,
            fan_out_only: false,
        },
        "lecun_uniform" => Initializer::KaimingUniform {
            gain: 1.0,
            fan_out_only: false,
        },
        other => return Err(RecurrentError::UnknownInitializer(other.to_string())),
    };
    Ok(initializer)
}

/// Materialize a `[rows, cols]` tensor.
///
/// `promoted` marks a 1-D shape that was lifted to a single row; its fans are
/// taken from the element count.
pub fn materialize<B: Backend>(
    initializer: &Initializer,
    dims: [usize; 2],
    promoted: bool,
    device: &B::Device,
) -> Tensor<B, 2> {
    let (fan_in, fan_out) = if promoted {
        let fan = ((dims[1] as f64).sqrt() as usize).max(1);
        (fan, fan)
    } else {
        (dims[0].max(1), dims[1].max(1))
    };
    initializer
        .init_with::<B, 2, _>(dims, Some(fan_in), Some(fan_out), device)
        .val()
}
