// ============================================================
// Layer 4 - Audio Batcher
// ============================================================
// Implements Burn's Batcher trait: stacks N AudioSamples into a
// single [N, channels, frames] float tensor.
//
// Every sample was already padded/cropped to the same length by
// the Preprocessor, so batching is a flat concatenation followed
// by a reshape.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::AudioSample;

/// A batch of real audio ready for the autoencoder.
#[derive(Debug, Clone)]
pub struct AudioBatch<B: Backend> {
    /// shape: [batch_size, channels, frames]
    pub reals: Tensor<B, 3>,
}

#[derive(Clone, Debug)]
pub struct AudioBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> AudioBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<AudioSample, AudioBatch<B>> for AudioBatcher<B> {
    fn batch(&self, items: Vec<AudioSample>) -> AudioBatch<B> {
        let batch_size = items.len();
        let channels   = items.first().map(|s| s.channels).unwrap_or(1);
        let frames     = items.first().map(|s| s.frames).unwrap_or(0);

        let flat: Vec<f32> = items
            .into_iter()
            .flat_map(|s| s.samples)
            .collect();

        let reals = Tensor::<B, 3>::from_data(
            TensorData::new(flat, [batch_size, channels, frames]),
            &self.device,
        );

        AudioBatch { reals }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_batch_shape_and_layout() {
        let device  = Default::default();
        let batcher = AudioBatcher::<NdArray>::new(device);
        let items = vec![
            AudioSample { channels: 2, frames: 3, samples: vec![1., 2., 3., 4., 5., 6.] },
            AudioSample { channels: 2, frames: 3, samples: vec![7., 8., 9., 10., 11., 12.] },
        ];
        let batch = batcher.batch(items);
        assert_eq!(batch.reals.dims(), [2, 2, 3]);

        let right_of_second = batch.reals
            .slice([1..2, 1..2, 0..3])
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(right_of_second, vec![10., 11., 12.]);
    }
}
