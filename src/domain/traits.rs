// ============================================================
// Layer 3 - Core Traits (Abstractions)
// ============================================================
// The application layer programs against these traits so the
// WAV loader or the local experiment tracker can be swapped
// (e.g. for FLAC files or a hosted tracking service) without
// touching the training loop.

use anyhow::Result;
use std::path::Path;

use crate::domain::audio::AudioClip;
use crate::domain::log_entry::LogDict;

// ─── AudioSource ──────────────────────────────────────────────────────────────
/// Any component that can provide decoded audio clips.
pub trait AudioSource {
    /// Load every available clip.
    fn load_all(&self) -> Result<Vec<AudioClip>>;
}

// ─── ExperimentLogger ─────────────────────────────────────────────────────────
/// Sink for step-indexed scalars and media.
///
/// Implementations:
///   - LocalExperiment → JSON lines on disk
pub trait ExperimentLogger {
    fn log(&mut self, values: &LogDict, step: usize) -> Result<()>;

    /// Where media referenced by logged values should be written
    fn media_dir(&self) -> &Path;
}
