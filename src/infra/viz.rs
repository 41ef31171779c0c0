// ============================================================
// Layer 6 - Demo Visualisations
// ============================================================
// Pictures of what the autoencoder is doing, written next to
// the demo audio:
//
//   pca_point_cloud          latents → 3-D point cloud, coloured
//                            by position in time
//   tokens_spectrogram_image latents drawn as a [channels × time]
//                            heat map
//   audio_spectrogram_image  mel spectrogram of a waveform (dB,
//                            80 dB dynamic range)
//
// All functions take plain slices; the ML layer converts tensors
// before calling in.

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use rustfft::{num_complex::Complex, FftPlanner};
use serde_json::json;
use std::{fs, path::Path};

use crate::ml::stft::{hann_window, mel_filterbank};

/// [x, y, z, r, g, b]
pub type CloudPoint = [f32; 6];

const POWER_ITERATIONS: usize = 100;

// ─── PCA Point Cloud ──────────────────────────────────────────────────────────

/// Project latents [batch, channels, frames] (row-major) onto their
/// first three principal components; one point per (item, frame).
pub fn pca_point_cloud(latents: &[f32], batch: usize, channels: usize, frames: usize) -> Vec<CloudPoint> {
    let n = batch * frames;
    if n == 0 || channels == 0 {
        return Vec::new();
    }

    // Rows are time steps, columns are latent channels
    let mut rows = vec![vec![0.0f64; channels]; n];
    for b in 0..batch {
        for c in 0..channels {
            for t in 0..frames {
                rows[b * frames + t][c] = latents[(b * channels + c) * frames + t] as f64;
            }
        }
    }

    let mean: Vec<f64> = (0..channels)
        .map(|c| rows.iter().map(|r| r[c]).sum::<f64>() / n as f64)
        .collect();
    for row in rows.iter_mut() {
        for (v, m) in row.iter_mut().zip(&mean) {
            *v -= m;
        }
    }

    let mut cov = vec![vec![0.0f64; channels]; channels];
    for row in &rows {
        for i in 0..channels {
            for j in 0..channels {
                cov[i][j] += row[i] * row[j];
            }
        }
    }
    let denom = (n.max(2) - 1) as f64;
    for v in cov.iter_mut().flatten() {
        *v /= denom;
    }

    let components = top_eigenvectors(cov, 3);

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let mut p = [0.0f32; 6];
            for (k, comp) in components.iter().enumerate() {
                p[k] = row.iter().zip(comp).map(|(a, b)| a * b).sum::<f64>() as f32;
            }
            let [r, g, b] = rainbow((i % frames) as f32 / frames.max(2).saturating_sub(1) as f32);
            p[3] = r as f32;
            p[4] = g as f32;
            p[5] = b as f32;
            p
        })
        .collect()
}

/// Power iteration with deflation; missing components are zero vectors.
fn top_eigenvectors(mut m: Vec<Vec<f64>>, k: usize) -> Vec<Vec<f64>> {
    let dim = m.len();
    let mut out = Vec::with_capacity(k);

    for _ in 0..k {
        let mut v: Vec<f64> = (0..dim).map(|i| 1.0 + i as f64 * 0.01).collect();
        let mut lambda = 0.0;

        for _ in 0..POWER_ITERATIONS {
            let mut w: Vec<f64> = m
                .iter()
                .map(|row| row.iter().zip(&v).map(|(a, b)| a * b).sum())
                .collect();
            let norm = w.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm < 1e-12 {
                lambda = 0.0;
                v = vec![0.0; dim];
                break;
            }
            w.iter_mut().for_each(|x| *x /= norm);
            lambda = norm;
            v = w;
        }

        for i in 0..dim {
            for j in 0..dim {
                m[i][j] -= lambda * v[i] * v[j];
            }
        }
        out.push(v);
    }
    out
}

/// Write points in the `lidar/beta` object-3D layout.
pub fn save_point_cloud(path: &Path, points: &[CloudPoint]) -> Result<()> {
    let doc = json!({ "type": "lidar/beta", "points": points });
    fs::write(path, serde_json::to_string(&doc)?)
        .with_context(|| format!("Cannot write point cloud '{}'", path.display()))
}

// ─── Heat Maps ────────────────────────────────────────────────────────────────

/// Latents [batch, channels, frames] as one image, items side by side.
pub fn tokens_spectrogram_image(latents: &[f32], batch: usize, channels: usize, frames: usize) -> RgbImage {
    let width  = (batch * frames).max(1) as u32;
    let height = channels.max(1) as u32;

    let (lo, hi) = min_max(latents);
    let range = (hi - lo).max(1e-8);

    let mut img = RgbImage::new(width, height);
    for b in 0..batch {
        for c in 0..channels {
            for t in 0..frames {
                let v = (latents[(b * channels + c) * frames + t] - lo) / range;
                // channel 0 on top
                img.put_pixel((b * frames + t) as u32, c as u32, Rgb(viridis(v)));
            }
        }
    }
    img
}

/// Mel spectrogram (1024-point FFT, hop 256, 80 mel bins) of a mono waveform.
pub fn audio_spectrogram_image(samples: &[f32], sample_rate: u32) -> RgbImage {
    const N_FFT:  usize = 1024;
    const HOP:    usize = 256;
    const N_MELS: usize = 80;
    const TOP_DB: f32   = 80.0;

    let n_freqs = N_FFT / 2 + 1;
    let window  = hann_window(N_FFT);
    let fb      = mel_filterbank(sample_rate, N_FFT, N_MELS);
    let fft     = FftPlanner::<f32>::new().plan_fft_forward(N_FFT);

    let padded: Vec<f32> = if samples.len() < N_FFT {
        let mut p = samples.to_vec();
        p.resize(N_FFT, 0.0);
        p
    } else {
        samples.to_vec()
    };
    let n_frames = 1 + (padded.len() - N_FFT) / HOP;

    let mut db = vec![0.0f32; N_MELS * n_frames];
    let mut buf = vec![Complex::new(0.0f32, 0.0); N_FFT];
    for f in 0..n_frames {
        let start = f * HOP;
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = Complex::new(padded[start + i] * window[i], 0.0);
        }
        fft.process(&mut buf);

        for m in 0..N_MELS {
            let power: f32 = (0..n_freqs)
                .map(|k| fb[m * n_freqs + k] * buf[k].norm_sqr())
                .sum();
            db[m * n_frames + f] = 10.0 * power.max(1e-10).log10();
        }
    }

    let (_, peak) = min_max(&db);
    let floor = peak - TOP_DB;

    let mut img = RgbImage::new(n_frames as u32, N_MELS as u32);
    for m in 0..N_MELS {
        for f in 0..n_frames {
            let v = (db[m * n_frames + f].max(floor) - floor) / TOP_DB;
            // low frequencies at the bottom
            img.put_pixel(f as u32, (N_MELS - 1 - m) as u32, Rgb(viridis(v)));
        }
    }
    img
}

pub fn save_image(path: &Path, img: &RgbImage) -> Result<()> {
    img.save(path)
        .with_context(|| format!("Cannot write image '{}'", path.display()))
}

// ─── Colour Helpers ───────────────────────────────────────────────────────────

fn min_max(values: &[f32]) -> (f32, f32) {
    values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Piecewise-linear viridis, v in [0, 1].
fn viridis(v: f32) -> [u8; 3] {
    const STOPS: [[f32; 3]; 5] = [
        [68.0, 1.0, 84.0],
        [59.0, 82.0, 139.0],
        [33.0, 145.0, 140.0],
        [94.0, 201.0, 98.0],
        [253.0, 231.0, 37.0],
    ];
    let v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
    let pos = v * (STOPS.len() - 1) as f32;
    let i = (pos.floor() as usize).min(STOPS.len() - 2);
    let t = pos - i as f32;
    let mut out = [0u8; 3];
    for c in 0..3 {
        out[c] = (STOPS[i][c] + t * (STOPS[i + 1][c] - STOPS[i][c])).round() as u8;
    }
    out
}

/// Hue sweep red → violet, v in [0, 1].
fn rainbow(v: f32) -> [u8; 3] {
    let h = v.clamp(0.0, 1.0) * 300.0 / 60.0;
    let x = 1.0 - ((h % 2.0) - 1.0).abs();
    let (r, g, b) = match h as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        _ => (x, 0.0, 1.0),
    };
    [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_pca_finds_dominant_direction() {
        // Two latent channels moving together, a third nearly constant
        let (batch, channels, frames) = (1, 3, 50);
        let mut latents = vec![0.0f32; batch * channels * frames];
        for t in 0..frames {
            let x = t as f32 / 10.0;
            latents[t] = x;
            latents[frames + t] = x;
            latents[2 * frames + t] = 0.001 * (t % 2) as f32;
        }

        let points = pca_point_cloud(&latents, batch, channels, frames);
        assert_eq!(points.len(), 50);

        let spread = |k: usize| {
            let (lo, hi) = min_max(&points.iter().map(|p| p[k]).collect::<Vec<_>>());
            hi - lo
        };
        assert!(spread(0) > 5.0);
        assert!(spread(1) < 0.01);
        assert!(points.iter().all(|p| p[3..].iter().all(|&c| (0.0..=255.0).contains(&c))));
    }

    #[test]
    fn test_pca_handles_fewer_than_three_channels() {
        let points = pca_point_cloud(&[1.0, 2.0, 3.0, 4.0], 2, 1, 2);
        assert_eq!(points.len(), 4);
        assert!(points.iter().all(|p| p[1] == 0.0 && p[2] == 0.0));
    }

    #[test]
    fn test_point_cloud_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pca.json");
        save_point_cloud(&path, &[[1.0, 2.0, 3.0, 255.0, 0.0, 0.0]]).unwrap();
        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["type"], "lidar/beta");
        assert_eq!(v["points"][0][3], 255.0);
    }

    #[test]
    fn test_tokens_image_size() {
        let img = tokens_spectrogram_image(&vec![0.5; 2 * 4 * 8], 2, 4, 8);
        assert_eq!(img.dimensions(), (16, 4));
    }

    #[test]
    fn test_audio_spectrogram_size_and_save() {
        let sr = 16000;
        let tone: Vec<f32> = (0..8192).map(|n| (2.0 * PI * 440.0 * n as f32 / sr as f32).sin()).collect();
        let img = audio_spectrogram_image(&tone, sr);
        assert_eq!(img.dimensions(), (1 + (8192 - 1024) / 256, 80));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mel.png");
        save_image(&path, &img).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_short_audio_still_gives_one_frame() {
        assert_eq!(audio_spectrogram_image(&[0.0; 100], 8000).width(), 1);
    }

    #[test]
    fn test_colour_maps_hit_endpoints() {
        assert_eq!(viridis(0.0), [68, 1, 84]);
        assert_eq!(viridis(1.0), [253, 231, 37]);
        assert_eq!(rainbow(0.0), [255, 0, 0]);
    }
}
