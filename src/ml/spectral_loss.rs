// ============================================================
// Layer 5 - Sum-and-Difference Multi-Resolution STFT Loss
// ============================================================
// Reconstruction loss for stereo audio. Instead of comparing
// left and right independently, the loss compares the mid
// (L + R) and side (L - R) signals, which penalises errors in
// stereo image as well as in timbre.
//
// Per resolution (FFT size s, hop s * (1 - overlap)):
//
//   X, Y  = |STFT(input)|, |STFT(target)|, optionally mel-scaled
//   sc    = ||Y - X||_F / ||Y||_F                (spectral convergence)
//   logm  = mean |log Y - log X|                 (log magnitude)
//   l(s)  = sc + logm
//
// The multi-resolution loss averages l(s) over resolutions and
// the sum-and-difference loss averages the mid and side losses.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ml::stft::{mel_filterbank, Stft, MAG_EPS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralLossConfig {
    pub fft_sizes: Vec<usize>,
    /// Fraction of each window shared with the next one
    pub overlap: f64,
    pub sample_rate: u32,
    /// None keeps a linear-frequency spectrogram
    pub n_mels: Option<usize>,
}

impl SpectralLossConfig {
    pub fn new(fft_sizes: Vec<usize>, sample_rate: u32, n_mels: Option<usize>) -> Self {
        Self { fft_sizes, overlap: 0.75, sample_rate, n_mels }
    }

    pub fn hop_sizes(&self) -> Vec<usize> {
        self.fft_sizes
            .iter()
            .map(|&s| ((s as f64 * (1.0 - self.overlap)) as usize).max(1))
            .collect()
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> SumAndDifferenceStftLoss<B> {
        let resolutions = self
            .fft_sizes
            .iter()
            .zip(self.hop_sizes())
            .map(|(&n_fft, hop)| {
                let stft = Stft::new(n_fft, hop, n_fft, device);
                // Stored transposed, [n_freqs, n_mels], ready for a right matmul
                let mel = self.n_mels.map(|n_mels| {
                    let n_freqs = n_fft / 2 + 1;
                    Tensor::<B, 2>::from_data(
                        TensorData::new(
                            mel_filterbank(self.sample_rate, n_fft, n_mels),
                            [n_mels, n_freqs],
                        ),
                        device,
                    )
                    .transpose()
                });
                Resolution { stft, mel }
            })
            .collect();

        SumAndDifferenceStftLoss {
            mrstft: MultiResolutionStftLoss { resolutions },
        }
    }
}

#[derive(Debug, Clone)]
struct Resolution<B: Backend> {
    stft: Stft<B>,
    mel:  Option<Tensor<B, 2>>,
}

impl<B: Backend> Resolution<B> {
    fn spectrogram(&self, x: Tensor<B, 2>) -> Tensor<B, 3> {
        let mag = self.stft.magnitude(x);
        match &self.mel {
            None => mag,
            Some(fb) => {
                let [batch, n_freqs, frames] = mag.dims();
                let [_, n_mels] = fb.dims();
                mag.swap_dims(1, 2)
                    .reshape([batch * frames, n_freqs])
                    .matmul(fb.clone())
                    .reshape([batch, frames, n_mels])
                    .swap_dims(1, 2)
                    // Narrow low-frequency filters can miss every FFT bin
                    .clamp_min(MAG_EPS)
            }
        }
    }

    fn loss(&self, input: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
        let x = self.spectrogram(input);
        let y = self.spectrogram(target);

        let sc = (y.clone() - x.clone()).powf_scalar(2.0).sum().sqrt()
            / y.clone().powf_scalar(2.0).sum().sqrt().clamp_min(MAG_EPS);
        let log_mag = (y.log() - x.log()).abs().mean();

        sc + log_mag
    }
}

#[derive(Debug, Clone)]
pub struct MultiResolutionStftLoss<B: Backend> {
    resolutions: Vec<Resolution<B>>,
}

impl<B: Backend> MultiResolutionStftLoss<B> {
    /// input, target: [batch, samples]
    pub fn forward(&self, input: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
        let n = self.resolutions.len().max(1) as f64;
        let mut total: Option<Tensor<B, 1>> = None;
        for res in &self.resolutions {
            let l = res.loss(input.clone(), target.clone());
            total = Some(match total {
                Some(t) => t + l,
                None => l,
            });
        }
        total
            .map(|t| t.div_scalar(n))
            .unwrap_or_else(|| Tensor::zeros([1], &input.device()))
    }
}

#[derive(Debug, Clone)]
pub struct SumAndDifferenceStftLoss<B: Backend> {
    mrstft: MultiResolutionStftLoss<B>,
}

impl<B: Backend> SumAndDifferenceStftLoss<B> {
    /// input, target: [batch, channels, samples].
    ///
    /// Stereo input uses mid/side signals; any other channel count
    /// falls back to the per-channel average of the plain loss.
    pub fn forward(&self, input: Tensor<B, 3>, target: Tensor<B, 3>) -> Tensor<B, 1> {
        let [batch, channels, samples] = input.dims();

        if channels == 2 {
            let (in_sum, in_diff)   = sum_and_difference(input);
            let (tgt_sum, tgt_diff) = sum_and_difference(target);
            let sum_loss  = self.mrstft.forward(in_sum, tgt_sum);
            let diff_loss = self.mrstft.forward(in_diff, tgt_diff);
            return (sum_loss + diff_loss).div_scalar(2.0);
        }

        let per_channel = |t: Tensor<B, 3>, c: usize| {
            t.slice([0..batch, c..c + 1, 0..samples]).reshape([batch, samples])
        };
        let mut total = Tensor::<B, 1>::zeros([1], &input.device());
        for c in 0..channels {
            total = total
                + self.mrstft.forward(per_channel(input.clone(), c), per_channel(target.clone(), c));
        }
        total.div_scalar(channels.max(1) as f64)
    }
}

/// [batch, 2, samples] → (L + R, L - R), each [batch, samples]
fn sum_and_difference<B: Backend>(x: Tensor<B, 3>) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let [batch, _, samples] = x.dims();
    let left  = x.clone().slice([0..batch, 0..1, 0..samples]).reshape([batch, samples]);
    let right = x.slice([0..batch, 1..2, 0..samples]).reshape([batch, samples]);
    (left.clone() + right.clone(), left - right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TB = NdArray;

    fn small_loss(device: &<TB as Backend>::Device) -> SumAndDifferenceStftLoss<TB> {
        SpectralLossConfig::new(vec![128, 64], 16000, Some(16)).init(device)
    }

    fn scalar(t: Tensor<TB, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    #[test]
    fn test_hop_sizes_follow_overlap() {
        let cfg = SpectralLossConfig::new(vec![2048, 1024, 512], 48000, Some(64));
        assert_eq!(cfg.hop_sizes(), vec![512, 256, 128]);
    }

    #[test]
    fn test_identical_signals_give_near_zero_loss() {
        let device = Default::default();
        let x = Tensor::<TB, 3>::random([2, 2, 512], Distribution::Normal(0.0, 0.3), &device);
        let loss = scalar(small_loss(&device).forward(x.clone(), x));
        assert!(loss.abs() < 1e-4, "loss = {loss}");
    }

    #[test]
    fn test_different_signals_give_positive_loss() {
        let device = Default::default();
        let x = Tensor::<TB, 3>::random([2, 2, 512], Distribution::Normal(0.0, 0.3), &device);
        let y = x.clone().mul_scalar(0.25);
        let loss = scalar(small_loss(&device).forward(x, y));
        assert!(loss > 0.1, "loss = {loss}");
    }

    #[test]
    fn test_mono_fallback() {
        let device = Default::default();
        let x = Tensor::<TB, 3>::random([1, 1, 512], Distribution::Normal(0.0, 0.3), &device);
        let y = Tensor::<TB, 3>::random([1, 1, 512], Distribution::Normal(0.0, 0.3), &device);
        let loss = scalar(small_loss(&device).forward(x, y));
        assert!(loss.is_finite() && loss > 0.0);
    }
}
