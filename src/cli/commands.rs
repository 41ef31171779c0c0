// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `reconstruct`
// and all their configurable flags.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;
use crate::ml::autoencoder::Bottleneck;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the autoencoder and discriminator on a folder of .wav files
    Train(TrainArgs),

    /// Encode and decode one .wav file with the latest checkpoint
    Reconstruct(ReconstructArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON file with a full or partial TrainConfig; replaces the flags below
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory searched recursively for .wav files
    #[arg(long, default_value = "data/audio")]
    pub data_dir: String,

    /// Held-out .wav files for demos (defaults to the training audio)
    #[arg(long)]
    pub demo_dir: Option<String>,

    /// Where checkpoints, train_config.json and metrics.csv are written
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Where history.jsonl and demo media are written
    #[arg(long, default_value = "experiment")]
    pub experiment_dir: String,

    #[arg(long, default_value_t = 48000)]
    pub sample_rate: u32,

    /// Frames per training example; must be a multiple of the downsampling ratio
    #[arg(long, default_value_t = 65536)]
    pub sample_size: usize,

    #[arg(long, default_value_t = 2)]
    pub audio_channels: usize,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    /// Total optimizer steps (generator and discriminator steps both count)
    #[arg(long, default_value_t = 1_000_000)]
    pub max_steps: usize,

    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Steps of pure reconstruction training before the discriminator joins
    #[arg(long, default_value_t = 150_000)]
    pub warmup_steps: usize,

    #[arg(long, default_value_t = 2000)]
    pub demo_every: usize,

    #[arg(long, default_value_t = 4)]
    pub num_demos: usize,

    #[arg(long, default_value_t = 10_000)]
    pub checkpoint_every: usize,

    #[arg(long, default_value_t = 100)]
    pub log_every: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Latent channels
    #[arg(long, default_value_t = 32)]
    pub latent_dim: usize,

    /// none, tanh or vae
    #[arg(long, default_value = "vae")]
    pub bottleneck: Bottleneck,

    /// Continue from the latest checkpoint in --checkpoint-dir
    #[arg(long)]
    pub resume: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// Architecture details not exposed as flags keep their defaults.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:         a.data_dir,
            demo_dir:         a.demo_dir,
            checkpoint_dir:   a.checkpoint_dir,
            experiment_dir:   a.experiment_dir,
            sample_rate:      a.sample_rate,
            sample_size:      a.sample_size,
            audio_channels:   a.audio_channels,
            batch_size:       a.batch_size,
            num_workers:      a.num_workers,
            max_steps:        a.max_steps,
            lr:               a.lr,
            warmup_steps:     a.warmup_steps,
            demo_every:       a.demo_every,
            num_demos:        a.num_demos,
            checkpoint_every: a.checkpoint_every,
            log_every:        a.log_every,
            seed:             a.seed,
            latent_dim:       a.latent_dim,
            bottleneck:       a.bottleneck,
            resume:           a.resume,
            ..TrainConfig::default()
        }
    }
}

/// All arguments for the `reconstruct` command
#[derive(Args, Debug)]
pub struct ReconstructArgs {
    /// .wav file to encode and decode
    #[arg(long)]
    pub input: PathBuf,

    /// Where to write the reconstruction (16-bit PCM)
    #[arg(long)]
    pub output: PathBuf,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,
}
