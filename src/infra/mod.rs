// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Files on disk that more than one layer needs:
//
//   checkpoint.rs — CompactRecorder weights for both networks,
//                   latest_step.json and train_config.json
//   metrics.rs    — one CSV row per training step
//   experiment.rs — history.jsonl tracker (ExperimentLogger)
//   audio_io.rs   — 16-bit PCM WAV output
//   viz.rs        — PCA point clouds and spectrogram PNGs
//
// Reference: Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Local experiment tracker
pub mod experiment;

pub mod audio_io;

/// Demo images and point clouds
pub mod viz;
