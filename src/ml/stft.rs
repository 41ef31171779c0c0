// ============================================================
// Layer 5 - Differentiable STFT and Mel Filterbank
// ============================================================
// Burn has no FFT op, so the short-time Fourier transform is a
// strided 1-D convolution against a fixed, windowed DFT basis:
//
//   basis[k]     =  w[n] * cos(2π k n / N)     k = 0..N/2
//   basis[F + k] = -w[n] * sin(2π k n / N)
//
//   x [batch, 1, samples] ──conv1d(stride = hop)──▶ [batch, 2F, frames]
//
// The basis is a constant tensor inside a Module, built once when
// the owner is initialised. Gradients flow to the input only.
//
// Frames are centred: the signal is reflect padded by N/2 on both
// sides, giving samples / hop + 1 frames.
//
// The mel filterbank uses the Slaney mel scale with area
// normalisation (the librosa defaults).
//
// Reference: Burn Book §3 (Tensor module ops)

use burn::prelude::*;
use burn::tensor::{module::conv1d, ops::ConvOptions};
use std::f32::consts::PI;

/// Floor applied to power/magnitude before any log.
pub const MAG_EPS: f64 = 1e-8;

/// Periodic Hann window of `size` samples.
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / size as f32).cos())
        .collect()
}

const MEL_F_SP:        f32 = 200.0 / 3.0;
const MEL_MIN_LOG_HZ:  f32 = 1000.0;
const MEL_MIN_LOG_MEL: f32 = MEL_MIN_LOG_HZ / MEL_F_SP;

fn mel_log_step() -> f32 {
    6.4f32.ln() / 27.0
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above.
pub fn hz_to_mel(freq: f32) -> f32 {
    if freq < MEL_MIN_LOG_HZ {
        freq / MEL_F_SP
    } else {
        MEL_MIN_LOG_MEL + (freq / MEL_MIN_LOG_HZ).ln() / mel_log_step()
    }
}

pub fn mel_to_hz(mel: f32) -> f32 {
    if mel < MEL_MIN_LOG_MEL {
        mel * MEL_F_SP
    } else {
        MEL_MIN_LOG_HZ * (mel_log_step() * (mel - MEL_MIN_LOG_MEL)).exp()
    }
}

/// Triangular, area-normalised mel filterbank, row-major [n_mels, n_fft/2 + 1].
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<f32> {
    let n_freqs = n_fft / 2 + 1;
    let fmax    = sample_rate as f32 / 2.0;

    let mel_max  = hz_to_mel(fmax);
    let n_points = n_mels + 2;
    let hz_points: Vec<f32> = (0..n_points)
        .map(|i| mel_to_hz(mel_max * i as f32 / (n_points - 1) as f32))
        .collect();

    let fft_freqs: Vec<f32> = (0..n_freqs)
        .map(|k| k as f32 * sample_rate as f32 / n_fft as f32)
        .collect();

    let mut fb = vec![0.0f32; n_mels * n_freqs];
    for m in 0..n_mels {
        let (lo, centre, hi) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
        let enorm = 2.0 / (hi - lo);
        for (k, &freq) in fft_freqs.iter().enumerate() {
            let lower = (freq - lo) / (centre - lo);
            let upper = (hi - freq) / (hi - centre);
            fb[m * n_freqs + k] = enorm * lower.min(upper).max(0.0);
        }
    }
    fb
}

/// Index map for reflect padding by `pad` on both sides of `len` samples.
fn reflect_indices(len: usize, pad: usize) -> Vec<i64> {
    let n = len as i64;
    let period = 2 * (n - 1);
    (0..len + 2 * pad)
        .map(|i| {
            if n == 1 {
                return 0;
            }
            let m = (i as i64 - pad as i64).rem_euclid(period);
            if m >= n { period - m } else { m }
        })
        .collect()
}

/// Windowed DFT basis, row-major [2 * (n_fft/2 + 1), n_fft].
fn dft_basis(n_fft: usize, win_length: usize) -> Vec<f32> {
    let n_freqs = n_fft / 2 + 1;
    let win_length = win_length.min(n_fft);

    // Shorter windows are centred inside the FFT frame
    let mut window = vec![0.0f32; n_fft];
    let offset = (n_fft - win_length) / 2;
    window[offset..offset + win_length].copy_from_slice(&hann_window(win_length));

    let mut basis = vec![0.0f32; 2 * n_freqs * n_fft];
    for k in 0..n_freqs {
        for n in 0..n_fft {
            let angle = 2.0 * PI * ((k * n) % n_fft) as f32 / n_fft as f32;
            basis[k * n_fft + n]             =  window[n] * angle.cos();
            basis[(n_freqs + k) * n_fft + n] = -window[n] * angle.sin();
        }
    }
    basis
}

#[derive(Module, Debug)]
pub struct Stft<B: Backend> {
    pub n_fft:      usize,
    pub hop_length: usize,
    /// [2F, 1, n_fft]
    basis: Tensor<B, 3>,
}

impl<B: Backend> Stft<B> {
    pub fn new(n_fft: usize, hop_length: usize, win_length: usize, device: &B::Device) -> Self {
        let n_freqs = n_fft / 2 + 1;
        let basis = Tensor::<B, 3>::from_data(
            TensorData::new(dft_basis(n_fft, win_length), [2 * n_freqs, 1, n_fft]),
            device,
        );
        Self { n_fft, hop_length, basis }
    }

    pub fn n_freqs(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// x: [batch, samples] → (real, imag), each [batch, n_freqs, frames]
    pub fn forward(&self, x: Tensor<B, 2>) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let [batch, samples] = x.dims();
        let pad = self.n_fft / 2;
        let indices = Tensor::<B, 1, Int>::from_data(
            TensorData::new(reflect_indices(samples, pad), [samples + 2 * pad]),
            &x.device(),
        );
        let padded = x.select(1, indices);

        let spec = conv1d(
            padded.reshape([batch, 1, samples + 2 * pad]),
            self.basis.clone(),
            None,
            ConvOptions::new([self.hop_length], [0], [1], 1),
        );

        let [_, _, frames] = spec.dims();
        let f = self.n_freqs();
        let real = spec.clone().slice([0..batch, 0..f, 0..frames]);
        let imag = spec.slice([0..batch, f..2 * f, 0..frames]);
        (real, imag)
    }

    /// |STFT|, floored at sqrt(MAG_EPS): [batch, n_freqs, frames]
    pub fn magnitude(&self, x: Tensor<B, 2>) -> Tensor<B, 3> {
        let (re, im) = self.forward(x);
        (re.powf_scalar(2.0) + im.powf_scalar(2.0))
            .clamp_min(MAG_EPS)
            .sqrt()
    }
}
