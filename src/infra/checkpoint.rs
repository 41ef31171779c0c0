// ============================================================
// Layer 6 - Checkpoint Manager
// ============================================================
// Saves and restores both networks using Burn's CompactRecorder.
//
// What gets saved per checkpoint:
//   1. Autoencoder weights   (.mpk file)
//   2. Discriminator weights (.mpk file)
//   3. latest_step.json      which step was last saved
//
// and once per run:
//   4. train_config.json     architecture + hyperparameters, so
//                            `reconstruct` can rebuild the model
//                            before loading weights into it
//
// File naming convention:
//   checkpoints/
//     autoencoder_step_10000.mpk     (half precision)
//     discriminator_step_10000.mpk
//     ...
//     latest_step.json
//     train_config.json
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::{autoencoder::AudioAutoencoder, discriminator::EncodecDiscriminator};

const LATEST_FILE: &str = "latest_step.json";
const CONFIG_FILE: &str = "train_config.json";

/// Manages saving and loading of model checkpoints.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save both networks for `step` and move the latest-step pointer.
    pub fn save_models<B: Backend>(
        &self,
        autoencoder:   &AudioAutoencoder<B>,
        discriminator: &EncodecDiscriminator<B>,
        step:          usize,
    ) -> Result<()> {
        // The recorder adds the file extension
        let ae_path = self.dir.join(format!("autoencoder_step_{step}"));
        CompactRecorder::new()
            .record(autoencoder.clone().into_record(), ae_path.clone())
            .with_context(|| format!("Failed to save autoencoder to '{}'", ae_path.display()))?;

        let disc_path = self.dir.join(format!("discriminator_step_{step}"));
        CompactRecorder::new()
            .record(discriminator.clone().into_record(), disc_path.clone())
            .with_context(|| format!("Failed to save discriminator to '{}'", disc_path.display()))?;

        // Written last: a crash mid-save leaves the pointer on the previous step
        fs::write(self.dir.join(LATEST_FILE), serde_json::to_string(&step)?)
            .with_context(|| format!("Failed to write {LATEST_FILE}"))?;

        tracing::debug!("Saved checkpoint: step {}", step);
        Ok(())
    }

    /// Load autoencoder weights saved at `step` into a model of the same architecture.
    pub fn load_autoencoder<B: Backend>(
        &self,
        model:  AudioAutoencoder<B>,
        step:   usize,
        device: &B::Device,
    ) -> Result<AudioAutoencoder<B>> {
        let path = self.dir.join(format!("autoencoder_step_{step}"));
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load autoencoder '{}'. Have you trained the model first?",
                    path.display())
            })?;
        Ok(model.load_record(record))
    }

    pub fn load_discriminator<B: Backend>(
        &self,
        model:  EncodecDiscriminator<B>,
        step:   usize,
        device: &B::Device,
    ) -> Result<EncodecDiscriminator<B>> {
        let path = self.dir.join(format!("discriminator_step_{step}"));
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load discriminator '{}'", path.display()))?;
        Ok(model.load_record(record))
    }

    /// Save the training configuration as pretty JSON.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read config from '{}'. \
                     Make sure you have run 'train' before 'reconstruct'.",
                    path.display()
                )
            })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config '{}'", path.display()))
    }

    /// Last saved step, or None when nothing has been saved yet.
    pub fn latest_step(&self) -> Result<Option<usize>> {
        let path = self.dir.join(LATEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        Ok(Some(serde_json::from_str::<usize>(s.trim())?))
    }
}
