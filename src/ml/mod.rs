// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// Everything that touches Burn tensors lives here. The other
// layers hand in plain samples and get back plain numbers,
// files and log dicts.
//
//   stft.rs          — differentiable STFT (conv1d against a
//                      windowed DFT basis) and mel filterbank
//   spectral_loss.rs — sum-and-difference multi-resolution
//                      STFT loss
//   autoencoder.rs   — convolutional encoder/decoder with a
//                      none / tanh / VAE bottleneck
//   discriminator.rs — multi-scale complex-STFT discriminator,
//                      hinge + feature matching losses
//   trainer.rs       — alternating generator/discriminator
//                      steps and the step loop
//   demo.rs          — periodic reconstruction demos
//   inferencer.rs    — reconstruct a WAV file from a checkpoint
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

use anyhow::Result;
use burn::prelude::*;

pub mod stft;

pub mod spectral_loss;

pub mod autoencoder;

pub mod discriminator;

pub mod trainer;

pub mod demo;

pub mod inferencer;

// CPU by default, `--features wgpu` for the GPU
#[cfg(not(feature = "wgpu"))]
pub type InnerBackend = burn::backend::NdArray;
#[cfg(feature = "wgpu")]
pub type InnerBackend = burn::backend::Wgpu;

pub type TrainBackend = burn::backend::Autodiff<InnerBackend>;

/// Copy a float tensor to the host in row-major order.
pub fn tensor_to_vec<B: Backend, const D: usize>(t: Tensor<B, D>) -> Result<Vec<f32>> {
    t.into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor data: {e:?}"))
}
