// ============================================================
// Layer 3 - AudioClip Domain Type
// ============================================================
// A decoded audio file held in memory as planar f32 samples.
//
// Samples are stored channel-major ("planar"):
//   [ch0_s0, ch0_s1, ..., ch0_sN, ch1_s0, ..., ch1_sN]
// which maps directly onto a [channels, samples] tensor.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioClip {
    /// File name the clip was decoded from
    pub source: String,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels
    pub channels: usize,

    /// Planar samples in [-1, 1], length = channels * frames
    pub samples: Vec<f32>,
}

impl AudioClip {
    pub fn new(
        source:      impl Into<String>,
        sample_rate: u32,
        channels:    usize,
        samples:     Vec<f32>,
    ) -> Self {
        Self { source: source.into(), sample_rate, channels, samples }
    }

    /// Build a planar clip from interleaved samples (the WAV layout)
    pub fn from_interleaved(
        source:      impl Into<String>,
        sample_rate: u32,
        channels:    usize,
        interleaved: &[f32],
    ) -> Self {
        let channels = channels.max(1);
        let frames   = interleaved.len() / channels;
        let mut samples = vec![0.0f32; channels * frames];
        for (f, frame) in interleaved.chunks_exact(channels).enumerate() {
            for (c, &s) in frame.iter().enumerate() {
                samples[c * frames + f] = s;
            }
        }
        Self::new(source, sample_rate, channels, samples)
    }

    /// Number of samples per channel
    pub fn frames(&self) -> usize {
        if self.channels == 0 { 0 } else { self.samples.len() / self.channels }
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        let n = self.frames();
        &self.samples[index * n..(index + 1) * n]
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }
}
