// ============================================================
// Layer 4 - Audio Preprocessor
// ============================================================
// Turns a decoded clip of arbitrary length and channel count
// into one fixed-size training example.
//
// Steps (applied in order):
//   1. Channel conversion
//        mono   → duplicated to every output channel
//        N > C  → first C channels (or a mono downmix when C = 1)
//   2. Pad / crop to `sample_size` frames
//        longer clips  → window starting at a random offset
//        shorter clips → zero padded at the end
//   3. Optional phase flip (multiply by -1 with p = 0.5)
//
// Output is planar: [channels * sample_size]

use rand::Rng;

use crate::domain::audio::AudioClip;

#[derive(Debug, Clone)]
pub struct Preprocessor {
    /// Frames per training example
    pub sample_size: usize,
    /// Channels per training example
    pub channels: usize,
    /// Pick a random crop window (otherwise always start at 0)
    pub random_crop: bool,
    /// Randomly invert polarity
    pub phase_flip: bool,
}

impl Preprocessor {
    pub fn new(sample_size: usize, channels: usize) -> Self {
        Self { sample_size, channels, random_crop: true, phase_flip: true }
    }

    /// Deterministic variant used for demos and reconstruction
    pub fn deterministic(sample_size: usize, channels: usize) -> Self {
        Self { sample_size, channels, random_crop: false, phase_flip: false }
    }

    pub fn process<R: Rng + ?Sized>(&self, clip: &AudioClip, rng: &mut R) -> Vec<f32> {
        let clip   = to_channels(clip, self.channels);
        let frames = clip.frames();

        let start = if self.random_crop && frames > self.sample_size {
            rng.gen_range(0..=frames - self.sample_size)
        } else {
            0
        };

        let mut out = pad_crop(&clip, start, self.sample_size);

        if self.phase_flip && rng.gen_bool(0.5) {
            out.iter_mut().for_each(|s| *s = -*s);
        }
        out
    }
}

/// Convert a clip to exactly `channels` channels.
pub fn to_channels(clip: &AudioClip, channels: usize) -> AudioClip {
    if clip.channels == channels {
        return clip.clone();
    }
    let frames = clip.frames();

    let samples: Vec<f32> = if clip.channels == 1 {
        (0..channels).flat_map(|_| clip.channel(0).iter().copied()).collect()
    } else if channels == 1 {
        let mut mono = vec![0.0f32; frames];
        for c in 0..clip.channels {
            for (m, &s) in mono.iter_mut().zip(clip.channel(c)) {
                *m += s / clip.channels as f32;
            }
        }
        mono
    } else {
        // More channels than requested: keep the first ones.
        // Fewer (but not mono): repeat the last channel.
        (0..channels)
            .flat_map(|c| clip.channel(c.min(clip.channels - 1)).iter().copied())
            .collect()
    };

    AudioClip::new(clip.source.clone(), clip.sample_rate, channels, samples)
}

/// Copy `len` frames starting at `start` from every channel,
/// zero padding past the end of the clip.
pub fn pad_crop(clip: &AudioClip, start: usize, len: usize) -> Vec<f32> {
    let frames  = clip.frames();
    let mut out = vec![0.0f32; clip.channels * len];
    let avail   = frames.saturating_sub(start).min(len);

    for c in 0..clip.channels {
        let src = &clip.channel(c)[start.min(frames)..start.min(frames) + avail];
        out[c * len..c * len + avail].copy_from_slice(src);
    }
    out
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn ramp(channels: usize, frames: usize) -> AudioClip {
        let samples = (0..channels * frames).map(|i| i as f32).collect();
        AudioClip::new("ramp.wav", 48000, channels, samples)
    }

    #[test]
    fn test_mono_is_duplicated_to_stereo() {
        let clip = AudioClip::new("m.wav", 48000, 1, vec![0.1, 0.2, 0.3]);
        let st   = to_channels(&clip, 2);
        assert_eq!(st.channels, 2);
        assert_eq!(st.channel(0), st.channel(1));
    }

    #[test]
    fn test_stereo_downmix_to_mono() {
        let clip = AudioClip::new("s.wav", 48000, 2, vec![1.0, 1.0, -1.0, 0.0]);
        let mono = to_channels(&clip, 1);
        assert_eq!(mono.samples, vec![0.0, 0.5]);
    }

    #[test]
    fn test_short_clip_is_zero_padded() {
        let clip = ramp(2, 3);
        let out  = pad_crop(&clip, 0, 5);
        assert_eq!(out, vec![0.0, 1.0, 2.0, 0.0, 0.0, 3.0, 4.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_crop_window_stays_inside_clip() {
        let clip = ramp(1, 100);
        let pre  = Preprocessor { phase_flip: false, ..Preprocessor::new(10, 1) };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let out = pre.process(&clip, &mut rng);
            assert_eq!(out.len(), 10);
            // Contiguous window of the ramp
            assert!(out.windows(2).all(|w| w[1] - w[0] == 1.0));
        }
    }

    #[test]
    fn test_deterministic_starts_at_zero() {
        let clip = ramp(2, 50);
        let pre  = Preprocessor::deterministic(8, 2);
        let out  = pre.process(&clip, &mut StdRng::seed_from_u64(1));
        assert_eq!(out[0], 0.0);
        assert_eq!(out[8], 50.0);
    }
}
