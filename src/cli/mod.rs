// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Parses command line arguments with clap and hands off to
// Layer 2 (application). Two commands are supported:
//
//   1. `train`       — trains on a folder of .wav files
//   2. `reconstruct` — round-trips one file through a checkpoint
//
// Reference: Rust Book §12 (CLI programs)

pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, ReconstructArgs, TrainArgs};

use crate::application::train_use_case::TrainConfig;

#[derive(Parser, Debug)]
#[command(
    name = "audio-autoencoder-trainer",
    version,
    about = "Train an audio autoencoder with spectral, KL and adversarial losses."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)       => run_train(args),
            Commands::Reconstruct(args) => run_reconstruct(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config: TrainConfig = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read config '{}'", path.display()))?;
            tracing::info!("Using config file '{}'", path.display());
            serde_json::from_str(&json)
                .with_context(|| format!("Malformed config '{}'", path.display()))?
        }
        None => args.into(),
    };

    tracing::info!("Starting training on audio in: {}", config.data_dir);
    TrainUseCase::new(config).execute()?;

    println!("Training complete. Checkpoints saved.");
    Ok(())
}

fn run_reconstruct(args: ReconstructArgs) -> Result<()> {
    use crate::application::reconstruct_use_case::ReconstructUseCase;

    let use_case = ReconstructUseCase::new(args.checkpoint_dir)?;
    let frames = use_case.execute(&args.input, &args.output)?;

    println!("Wrote {} frames to {}", frames, args.output.display());
    Ok(())
}
