// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// Everything between .wav files on disk and [batch, channels,
// frames] tensors:
//
//   .wav files
//       │
//       ▼
//   WavLoader         → decodes and resamples every file
//       │
//       ▼
//   AudioDataset      → implements Burn's Dataset trait
//       │                (Preprocessor crops a window per get)
//       ▼
//   AudioBatcher      → stacks samples into tensor batches
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Decodes .wav files with hound and resamples with rubato
pub mod loader;

/// Channel conversion, pad/crop and phase flip
pub mod preprocessor;

/// Implements Burn's Dataset trait for audio examples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
