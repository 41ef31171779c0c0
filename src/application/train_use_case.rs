// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate the configuration
//   Step 2: Load .wav files              (Layer 4 - data)
//   Step 3: Load demo .wav files         (Layer 4 - data)
//   Step 4: Build datasets               (Layer 4 - data)
//   Step 5: Save config                  (Layer 6 - infra)
//   Step 6: Open metrics + experiment    (Layer 6 - infra)
//   Step 7: Run training loop            (Layer 5 - ml)

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::data::{dataset::AudioDataset, loader::WavLoader, preprocessor::Preprocessor};
use crate::domain::traits::AudioSource;
use crate::infra::{
    checkpoint::CheckpointManager,
    experiment::LocalExperiment,
    metrics::MetricsLogger,
};
use crate::ml::{
    autoencoder::{AutoencoderConfig, Bottleneck},
    discriminator::DiscriminatorConfig,
    spectral_loss::SpectralLossConfig,
    trainer::{run_training, LossWeights},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Every hyperparameter of a run. Saved next to the checkpoints so
// `reconstruct` (and `--resume`) rebuild exactly the same networks.
// Missing fields in a JSON file fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub data_dir:       String,
    /// Held-out audio for demos; the training audio is used when unset
    pub demo_dir:       Option<String>,
    pub checkpoint_dir: String,
    pub experiment_dir: String,

    pub sample_rate:    u32,
    pub sample_size:    usize,
    pub audio_channels: usize,

    pub batch_size:     usize,
    pub num_workers:    usize,
    pub max_steps:      usize,
    pub lr:             f64,
    pub warmup_steps:   usize,
    pub seed:           u64,

    pub demo_every:       usize,
    pub num_demos:        usize,
    pub checkpoint_every: usize,
    pub log_every:        usize,

    // Autoencoder
    pub channels:   usize,
    pub c_mults:    Vec<usize>,
    pub strides:    Vec<usize>,
    pub latent_dim: usize,
    pub bottleneck: Bottleneck,

    // Discriminator
    pub disc_filters: usize,
    /// FFT size of each discriminator scale
    pub disc_scales:  Vec<usize>,

    // Spectral loss
    pub stft_scales: Vec<usize>,
    pub mel_bins:    usize,

    pub loss_weights: LossWeights,

    /// Continue from the latest checkpoint in checkpoint_dir
    pub resume: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:         "data/audio".to_string(),
            demo_dir:         None,
            checkpoint_dir:   "checkpoints".to_string(),
            experiment_dir:   "experiment".to_string(),
            sample_rate:      48000,
            sample_size:      65536,
            audio_channels:   2,
            batch_size:       8,
            num_workers:      1,
            max_steps:        1_000_000,
            lr:               1e-4,
            warmup_steps:     150_000,
            seed:             42,
            demo_every:       2000,
            num_demos:        4,
            checkpoint_every: 10_000,
            log_every:        100,
            channels:         32,
            c_mults:          vec![2, 4, 8, 16],
            strides:          vec![2, 4, 4, 8],
            latent_dim:       32,
            bottleneck:       Bottleneck::Vae,
            disc_filters:     64,
            disc_scales:      vec![2048, 1024, 512, 256, 128],
            stft_scales:      vec![2048, 1024, 512],
            mel_bins:         64,
            loss_weights:     LossWeights::default(),
            resume:           false,
        }
    }
}

impl TrainConfig {
    pub fn downsampling_ratio(&self) -> usize {
        self.strides.iter().product()
    }

    /// Reject configurations that would fail deep inside the training loop.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.audio_channels > 0, "audio_channels must be at least 1");
        ensure!(self.batch_size > 0, "batch_size must be at least 1");
        ensure!(self.sample_rate > 0, "sample_rate must be positive");
        ensure!(
            self.strides.len() == self.c_mults.len(),
            "strides ({}) and c_mults ({}) must have the same length",
            self.strides.len(),
            self.c_mults.len()
        );
        ensure!(
            self.strides.iter().all(|&s| s >= 2),
            "every stride must be at least 2, got {:?}",
            self.strides
        );
        ensure!(
            self.sample_size > 0 && self.sample_size % self.downsampling_ratio() == 0,
            "sample_size {} must be a positive multiple of the downsampling ratio {}",
            self.sample_size,
            self.downsampling_ratio()
        );
        ensure!(!self.stft_scales.is_empty(), "stft_scales must not be empty");
        ensure!(!self.disc_scales.is_empty(), "disc_scales must not be empty");
        let longest_fft = self
            .stft_scales
            .iter()
            .copied()
            .max()
            .unwrap_or(0)
            .max(self.discriminator_config().min_samples());
        ensure!(
            self.sample_size >= longest_fft,
            "sample_size {} is shorter than the largest STFT size {}",
            self.sample_size,
            longest_fft
        );
        ensure!(
            self.demo_every > 0 && self.checkpoint_every > 0 && self.log_every > 0,
            "demo_every, checkpoint_every and log_every must be positive"
        );
        ensure!(self.lr > 0.0, "lr must be positive");
        Ok(())
    }

    pub fn autoencoder_config(&self) -> AutoencoderConfig {
        AutoencoderConfig::new(
            self.audio_channels,
            self.channels,
            self.c_mults.clone(),
            self.strides.clone(),
            self.latent_dim,
            self.bottleneck,
        )
    }

    pub fn discriminator_config(&self) -> DiscriminatorConfig {
        DiscriminatorConfig::from_fft_sizes(self.disc_scales.clone(), self.audio_channels)
            .with_filters(self.disc_filters)
    }

    pub fn spectral_loss_config(&self) -> SpectralLossConfig {
        let n_mels = (self.mel_bins > 0).then_some(self.mel_bins);
        SpectralLossConfig::new(self.stft_scales.clone(), self.sample_rate, n_mels)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2: Load training audio ───────────────────────────────────────
        tracing::info!("Loading .wav files from '{}'", cfg.data_dir);
        let clips = WavLoader::new(&cfg.data_dir, cfg.sample_rate).load_all()?;
        ensure!(!clips.is_empty(), "No usable .wav files found in '{}'", cfg.data_dir);
        let hours: f64 = clips.iter().map(|c| c.duration_secs()).sum::<f64>() / 3600.0;
        tracing::info!("Loaded {} clips ({:.2} h)", clips.len(), hours);

        // ── Step 3: Demo audio ────────────────────────────────────────────────
        let demo_clips = match &cfg.demo_dir {
            Some(dir) => {
                tracing::info!("Loading demo .wav files from '{}'", dir);
                WavLoader::new(dir, cfg.sample_rate).load_all()?
            }
            None => clips.clone(),
        };
        if demo_clips.is_empty() {
            tracing::warn!("No demo audio found, demos will be skipped");
        }

        // ── Step 4: Datasets ──────────────────────────────────────────────────
        // Training crops are random; demo crops always start at 0
        let train_dataset = AudioDataset::new(
            clips,
            Preprocessor::new(cfg.sample_size, cfg.audio_channels),
            cfg.seed,
        );
        let demo_dataset = AudioDataset::new(
            demo_clips,
            Preprocessor::deterministic(cfg.sample_size, cfg.audio_channels),
            cfg.seed,
        );

        // ── Step 5: Save config for reconstruct / resume ──────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt_manager.save_config(cfg)?;

        // ── Step 6: Metrics CSV + experiment history ──────────────────────────
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;
        let mut experiment = LocalExperiment::new(&cfg.experiment_dir)?;
        if cfg.resume {
            let path = experiment.history_path().display().to_string();
            match experiment.read_history() {
                Ok(records) => tracing::info!("Appending to '{}' ({} records so far)", path, records.len()),
                Err(e) => tracing::warn!("Cannot read '{}', appending anyway: {:#}", path, e),
            }
        }

        // ── Step 7: Run training loop (Layer 5) ───────────────────────────────
        run_training(cfg, train_dataset, demo_dataset, ckpt_manager, metrics, &mut experiment)
    }
}
