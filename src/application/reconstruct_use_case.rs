// ============================================================
// Layer 2 - Reconstruct Use Case
// ============================================================
// Round-trips one audio file through the latest checkpoint so a
// trained model can be auditioned outside of the demo loop.

use anyhow::Result;
use burn::prelude::*;
use std::path::Path;

use crate::data::loader::load_wav;
use crate::infra::{
    audio_io::{to_pcm16, write_wav_i16},
    checkpoint::CheckpointManager,
};
use crate::ml::{inferencer::Reconstructor, InnerBackend};

pub struct ReconstructUseCase {
    reconstructor: Reconstructor<InnerBackend>,
}

impl ReconstructUseCase {
    pub fn new(checkpoint_dir: String) -> Result<Self> {
        let ckpt   = CheckpointManager::new(checkpoint_dir)?;
        let device = <InnerBackend as Backend>::Device::default();
        let reconstructor = Reconstructor::from_checkpoint(&ckpt, device)?;
        Ok(Self { reconstructor })
    }

    /// Returns the number of frames written.
    pub fn execute(&self, input: &Path, output: &Path) -> Result<usize> {
        let clip = load_wav(input)?;
        tracing::info!(
            "Reconstructing '{}' ({} ch, {} Hz, {:.2}s)",
            input.display(), clip.channels, clip.sample_rate, clip.duration_secs()
        );

        let out = self.reconstructor.reconstruct(&clip)?;
        write_wav_i16(output, &to_pcm16(&out.samples), out.channels, out.sample_rate)?;

        tracing::info!("Wrote '{}'", output.display());
        Ok(out.frames())
    }
}
