use std::sync::Mutex;

use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::preprocessor::Preprocessor;
use crate::domain::audio::AudioClip;

/// One fixed-size, planar training example: [channels * frames].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSample {
    pub channels: usize,
    pub frames:   usize,
    pub samples:  Vec<f32>,
}

/// Whole decoded clips; a fresh random crop is taken on every `get`.
pub struct AudioDataset {
    clips:        Vec<AudioClip>,
    preprocessor: Preprocessor,
    rng:          Mutex<StdRng>,
}

impl AudioDataset {
    pub fn new(clips: Vec<AudioClip>, preprocessor: Preprocessor, seed: u64) -> Self {
        Self { clips, preprocessor, rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl Dataset<AudioSample> for AudioDataset {
    fn get(&self, index: usize) -> Option<AudioSample> {
        let clip = self.clips.get(index)?;
        let samples = match self.rng.lock() {
            Ok(mut rng) => self.preprocessor.process(clip, &mut *rng),
            Err(poisoned) => self.preprocessor.process(clip, &mut *poisoned.into_inner()),
        };
        Some(AudioSample {
            channels: self.preprocessor.channels,
            frames:   self.preprocessor.sample_size,
            samples,
        })
    }

    fn len(&self) -> usize {
        self.clips.len()
    }
}
