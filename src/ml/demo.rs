// ============================================================
// Layer 5 - Reconstruction Demos
// ============================================================
// Every `demo_every` steps (after steps 1, 1 + demo_every, ...)
// a fixed-size batch of held-out audio is encoded and decoded
// and the results are handed to the experiment tracker:
//
//   recon_{step:08}.wav / reals_{step:08}.wav
//       the batch laid end to end per channel: [b, d, n] → [d, b·n]
//   embeddings_3dpca     latents projected onto 3 principal axes
//   embeddings_spec      latents as a heat map
//   real_melspec_left    mel spectrogram of the left channel
//   recon_melspec_left
//
// The demo never stops training: failures are logged and dropped.

use anyhow::{ensure, Result};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::AutodiffModule,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::{fs, path::Path};

use crate::data::{
    batcher::{AudioBatch, AudioBatcher},
    dataset::AudioDataset,
};
use crate::domain::{
    log_entry::{LogDict, LogValue},
    traits::ExperimentLogger,
};
use crate::infra::{
    audio_io::{to_pcm16, write_wav_i16},
    viz,
};
use crate::ml::{autoencoder::AudioAutoencoder, tensor_to_vec};

#[derive(Debug, Clone)]
pub struct DemoSettings {
    pub demo_every:  usize,
    /// Clips per demo batch
    pub num_demos:   usize,
    pub sample_size: usize,
    pub sample_rate: u32,
}

pub struct AutoencoderDemoCallback<B: Backend> {
    dataset:  AudioDataset,
    settings: DemoSettings,
    batcher:  AudioBatcher<B>,
    /// Index of the next clip to use; wraps around the dataset
    cursor:   usize,
    last_demo_step: Option<usize>,
}

impl<B: Backend> AutoencoderDemoCallback<B> {
    pub fn new(dataset: AudioDataset, settings: DemoSettings, device: B::Device) -> Self {
        Self {
            dataset,
            settings,
            batcher: AudioBatcher::new(device),
            cursor: 0,
            last_demo_step: None,
        }
    }

    /// Fires after steps 1, 1 + demo_every, 1 + 2·demo_every, ...
    /// and at most once per step.
    pub fn should_run(&self, global_step: usize) -> bool {
        let every = self.settings.demo_every.max(1);
        (global_step + every - 1) % every == 0 && self.last_demo_step != Some(global_step)
    }

    /// Hook called after every optimisation step.
    pub fn on_train_batch_end<AB>(
        &mut self,
        global_step: usize,
        autoencoder: &AudioAutoencoder<AB>,
        logger:      &mut dyn ExperimentLogger,
    ) where
        AB: AutodiffBackend<InnerBackend = B>,
    {
        if !self.should_run(global_step) {
            return;
        }
        self.last_demo_step = Some(global_step);

        tracing::info!("Generating demo at step {}", global_step);
        // .valid() drops the autodiff wrapper: no graph is recorded
        if let Err(e) = self.run(global_step, &autoencoder.valid(), logger) {
            tracing::error!("Demo at step {} failed: {:#}", global_step, e);
        }
    }

    fn next_batch(&mut self) -> Result<AudioBatch<B>> {
        let len = self.dataset.len();
        ensure!(len > 0, "demo dataset is empty");

        let items = (0..self.settings.num_demos.max(1))
            .filter_map(|i| self.dataset.get((self.cursor + i) % len))
            .collect();
        self.cursor = (self.cursor + self.settings.num_demos.max(1)) % len;
        Ok(self.batcher.batch(items))
    }

    fn run(
        &mut self,
        step:   usize,
        model:  &AudioAutoencoder<B>,
        logger: &mut dyn ExperimentLogger,
    ) -> Result<()> {
        let reals = self.next_batch()?.reals;
        let [batch, channels, samples] = reals.dims();
        ensure!(
            samples == self.settings.sample_size,
            "demo clips have {} samples, expected {}",
            samples,
            self.settings.sample_size
        );

        let (latents, _) = model.encode(reals.clone());
        let fakes = model.decode(latents.clone());
        let [_, latent_dim, frames] = latents.dims();

        let fakes = tensor_to_vec(lay_end_to_end(fakes))?;
        let reals = tensor_to_vec(lay_end_to_end(reals))?;
        let latents = tensor_to_vec(latents)?;

        let media = logger.media_dir().to_path_buf();
        fs::create_dir_all(&media)?;
        let sr = self.settings.sample_rate;

        let recon_path = media.join(format!("recon_{step:08}.wav"));
        let reals_path = media.join(format!("reals_{step:08}.wav"));
        write_wav_i16(&recon_path, &to_pcm16(&fakes), channels, sr)?;
        write_wav_i16(&reals_path, &to_pcm16(&reals), channels, sr)?;

        let mut log = LogDict::new();
        log.insert(
            "recon".into(),
            LogValue::Audio { path: recon_path, sample_rate: sr, caption: "Reconstructed".into() },
        );
        log.insert(
            "real".into(),
            LogValue::Audio { path: reals_path, sample_rate: sr, caption: "Real".into() },
        );

        let points = viz::pca_point_cloud(&latents, batch, latent_dim, frames);
        let pca_path = media.join(format!("embeddings_3dpca_{step:08}.json"));
        viz::save_point_cloud(&pca_path, &points)?;
        log.insert("embeddings_3dpca".into(), LogValue::PointCloud { path: pca_path, points: points.len() });

        let spec_path = media.join(format!("embeddings_spec_{step:08}.png"));
        viz::save_image(&spec_path, &viz::tokens_spectrogram_image(&latents, batch, latent_dim, frames))?;
        log.insert("embeddings_spec".into(), LogValue::Image { path: spec_path });

        // Row 0 of the [d, b·n] layout is the left channel
        let left_len = reals.len() / channels.max(1);
        for (key, audio) in [("real_melspec_left", &reals), ("recon_melspec_left", &fakes)] {
            let path = media.join(format!("{key}_{step:08}.png"));
            save_melspec(&path, &audio[..left_len], sr)?;
            log.insert(key.into(), LogValue::Image { path });
        }

        logger.log(&log, step)
    }
}

/// [batch, channels, samples] → [channels, batch·samples]
fn lay_end_to_end<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch, channels, samples] = x.dims();
    x.swap_dims(0, 1).reshape([channels, batch * samples])
}

fn save_melspec(path: &Path, mono: &[f32], sample_rate: u32) -> Result<()> {
    viz::save_image(path, &viz::audio_spectrogram_image(mono, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocessor::Preprocessor;
    use crate::domain::audio::AudioClip;
    use crate::infra::experiment::LocalExperiment;
    use crate::ml::autoencoder::{AutoencoderConfig, Bottleneck};
    use burn::backend::{Autodiff, NdArray};

    type TB = Autodiff<NdArray>;

    fn callback(clips: Vec<AudioClip>, demo_every: usize) -> AutoencoderDemoCallback<NdArray> {
        let dataset = AudioDataset::new(clips, Preprocessor::deterministic(256, 2), 0);
        AutoencoderDemoCallback::new(
            dataset,
            DemoSettings { demo_every, num_demos: 2, sample_size: 256, sample_rate: 8000 },
            Default::default(),
        )
    }

    fn clip(name: &str) -> AudioClip {
        let samples = (0..600).map(|n| (n as f32 * 0.05).sin() * 0.5).collect();
        AudioClip::new(name, 8000, 1, samples)
    }

    fn model() -> AudioAutoencoder<TB> {
        AutoencoderConfig::new(2, 4, vec![2], vec![4], 3, Bottleneck::Vae).init(&Default::default())
    }

    #[test]
    fn test_firing_schedule() {
        let mut cb = callback(vec![clip("a.wav")], 2000);
        assert!(cb.should_run(1));
        assert!(!cb.should_run(2));
        assert!(!cb.should_run(2000));
        assert!(cb.should_run(2001));
        cb.last_demo_step = Some(2001);
        assert!(!cb.should_run(2001));
    }

    #[test]
    fn test_lay_end_to_end() {
        let device = Default::default();
        // item 0: L = [1, 2], R = [3, 4]; item 1: L = [5, 6], R = [7, 8]
        let x = Tensor::<NdArray, 3>::from_data(
            TensorData::new(vec![1., 2., 3., 4., 5., 6., 7., 8.], [2, 2, 2]),
            &device,
        );
        let flat = tensor_to_vec(lay_end_to_end(x)).unwrap();
        assert_eq!(flat, vec![1., 2., 5., 6., 3., 4., 7., 8.]);
    }

    #[test]
    fn test_demo_writes_media_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let mut exp = LocalExperiment::new(dir.path()).unwrap();
        let mut cb = callback(vec![clip("a.wav"), clip("b.wav"), clip("c.wav")], 10);

        cb.on_train_batch_end(1, &model(), &mut exp);
        assert_eq!(cb.last_demo_step, Some(1));
        // not a demo step
        cb.on_train_batch_end(2, &model(), &mut exp);

        let media = exp.media_dir();
        assert!(media.join("recon_00000001.wav").exists());
        assert!(media.join("reals_00000001.wav").exists());

        let history = exp.read_history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].step, 1);
        for key in [
            "recon",
            "real",
            "embeddings_3dpca",
            "embeddings_spec",
            "real_melspec_left",
            "recon_melspec_left",
        ] {
            assert!(history[0].values.contains_key(key), "missing {key}");
        }

        let written = crate::data::loader::load_wav(&media.join("reals_00000001.wav")).unwrap();
        assert_eq!(written.channels, 2);
        assert_eq!(written.frames(), 2 * 256);
    }

    #[test]
    fn test_demo_cycles_through_dataset() {
        let mut cb = callback(vec![clip("a.wav"), clip("b.wav"), clip("c.wav")], 1);
        cb.next_batch().unwrap();
        assert_eq!(cb.cursor, 2);
        cb.next_batch().unwrap();
        assert_eq!(cb.cursor, 1);
    }

    #[test]
    fn test_empty_demo_set_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let mut exp = LocalExperiment::new(dir.path()).unwrap();
        let mut cb = callback(Vec::new(), 1);
        cb.on_train_batch_end(1, &model(), &mut exp);
        assert_eq!(cb.last_demo_step, Some(1));
        assert!(exp.read_history().unwrap().is_empty());
    }
}
