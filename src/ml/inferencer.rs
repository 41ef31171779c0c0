// ============================================================
// Layer 5 - Reconstructor
// ============================================================
// Push a whole audio file through a trained autoencoder.
//
//   clip → resample → match channel count → zero-pad to a
//   multiple of the downsampling ratio → encode → decode →
//   trim back to the original length
use anyhow::{anyhow, Result};
use burn::prelude::*;

use crate::data::{loader::resample_clip, preprocessor::to_channels};
use crate::domain::audio::AudioClip;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{autoencoder::AudioAutoencoder, tensor_to_vec};

pub struct Reconstructor<B: Backend> {
    model:       AudioAutoencoder<B>,
    sample_rate: u32,
    channels:    usize,
    device:      B::Device,
}

impl<B: Backend> Reconstructor<B> {
    pub fn new(model: AudioAutoencoder<B>, sample_rate: u32, channels: usize, device: B::Device) -> Self {
        Self { model, sample_rate, channels, device }
    }

    /// Rebuild the model from train_config.json and load the latest weights.
    pub fn from_checkpoint(ckpt_manager: &CheckpointManager, device: B::Device) -> Result<Self> {
        let cfg  = ckpt_manager.load_config()?;
        let step = ckpt_manager
            .latest_step()?
            .ok_or_else(|| anyhow!("No checkpoint in '{}'. Have you run 'train' first?",
                ckpt_manager.dir().display()))?;

        let model: AudioAutoencoder<B> = cfg.autoencoder_config().init(&device);
        let model = ckpt_manager.load_autoencoder(model, step, &device)?;
        tracing::info!("Autoencoder loaded from step {}", step);

        Ok(Self::new(model, cfg.sample_rate, cfg.audio_channels, device))
    }

    pub fn reconstruct(&self, clip: &AudioClip) -> Result<AudioClip> {
        let clip   = to_channels(&resample_clip(clip.clone(), self.sample_rate)?, self.channels);
        let frames = clip.frames();
        let ratio  = self.model.downsampling_ratio.max(1);
        let padded = frames.div_ceil(ratio).max(1) * ratio;

        let mut input = vec![0.0f32; self.channels * padded];
        for c in 0..self.channels {
            input[c * padded..c * padded + frames].copy_from_slice(clip.channel(c));
        }
        let x = Tensor::<B, 3>::from_data(
            TensorData::new(input, [1, self.channels, padded]),
            &self.device,
        );

        let (latents, _) = self.model.encode(x);
        let [_, _, latent_frames] = latents.dims();
        tracing::debug!("{} frames → {} latent frames", frames, latent_frames);

        let decoded = self.model.decode(latents);
        let decoded = decoded.slice([0..1, 0..self.channels, 0..frames]);

        Ok(AudioClip::new(
            clip.source.clone(),
            self.sample_rate,
            self.channels,
            tensor_to_vec(decoded)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::autoencoder::{AutoencoderConfig, Bottleneck};
    use burn::backend::NdArray;

    #[test]
    fn test_reconstruct_keeps_length_and_layout() {
        let device = Default::default();
        let model: AudioAutoencoder<NdArray> =
            AutoencoderConfig::new(2, 4, vec![2], vec![8], 3, Bottleneck::None).init(&device);
        let rec = Reconstructor::new(model, 16000, 2, device);

        // 100 frames is not a multiple of 8: padded inside, trimmed on the way out
        let mono = AudioClip::new("tone.wav", 16000, 1, vec![0.1; 100]);
        let out = rec.reconstruct(&mono).unwrap();
        assert_eq!(out.channels, 2);
        assert_eq!(out.frames(), 100);
        assert_eq!(out.sample_rate, 16000);
        assert!(out.samples.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().to_string_lossy().to_string()).unwrap();
        assert!(Reconstructor::<NdArray>::from_checkpoint(&ckpt, Default::default()).is_err());
    }
}
