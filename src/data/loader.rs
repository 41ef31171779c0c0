// ============================================================
// Layer 4 - WAV Loader
// ============================================================
// Walks a directory tree, decodes every .wav file with hound
// and resamples it to the training sample rate.
//
// WAV samples are interleaved (L R L R ...); AudioClip keeps
// them planar, so decoding goes through
// AudioClip::from_interleaved.
//
// Integer PCM is scaled by 2^(bits-1) into [-1, 1]; float PCM
// is taken as-is.

use anyhow::{Context, Result};
use std::{fs::File, io::BufReader, path::Path};
use walkdir::WalkDir;

use crate::domain::audio::AudioClip;
use crate::domain::traits::AudioSource;

/// Loads all .wav files below a directory.
pub struct WavLoader {
    dir: String,

    /// Every clip is resampled to this rate
    target_rate: u32,
}

impl WavLoader {
    pub fn new(dir: impl Into<String>, target_rate: u32) -> Self {
        Self { dir: dir.into(), target_rate }
    }
}

impl AudioSource for WavLoader {
    fn load_all(&self) -> Result<Vec<AudioClip>> {
        let dir = Path::new(&self.dir);

        if !dir.exists() {
            tracing::warn!(
                "Audio directory '{}' does not exist, returning empty corpus",
                self.dir
            );
            return Ok(Vec::new());
        }

        let mut paths: Vec<_> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("wav"))
                    .unwrap_or(false)
            })
            .collect();
        // Directory iteration order is platform dependent
        paths.sort();

        let mut clips = Vec::with_capacity(paths.len());
        for path in paths {
            match load_wav(&path).and_then(|c| resample_clip(c, self.target_rate)) {
                Ok(clip) => {
                    tracing::debug!(
                        "Loaded: {} ({} ch, {:.2}s)",
                        clip.source, clip.channels, clip.duration_secs()
                    );
                    clips.push(clip);
                }
                // One corrupt file should not abort a whole run
                Err(e) => tracing::warn!("Skipping '{}': {:#}", path.display(), e),
            }
        }

        tracing::info!("Successfully loaded {} audio clips", clips.len());
        Ok(clips)
    }
}

/// Decode a single WAV file into a planar AudioClip.
pub fn load_wav(path: &Path) -> Result<AudioClip> {
    let file = File::open(path)
        .with_context(|| format!("Cannot open '{}'", path.display()))?;
    let mut reader = hound::WavReader::new(BufReader::new(file))
        .with_context(|| format!("Cannot parse WAV header of '{}'", path.display()))?;

    let spec = reader.spec();
    anyhow::ensure!(spec.sample_rate > 0, "invalid sample rate 0");
    anyhow::ensure!(spec.channels > 0, "WAV file has no channels");

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .context("WAV sample read error")?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .context("WAV float sample read error")?,
    };

    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    Ok(AudioClip::from_interleaved(
        source,
        spec.sample_rate,
        spec.channels as usize,
        &interleaved,
    ))
}

/// Resample every channel of a clip with rubato's FFT resampler.
///
/// The resampler's output delay is trimmed, so the result is time
/// aligned with the input and keeps its tail.
pub fn resample_clip(clip: AudioClip, to_rate: u32) -> Result<AudioClip> {
    if clip.sample_rate == to_rate || clip.frames() == 0 || clip.channels == 0 {
        return Ok(clip);
    }

    use rubato::{FftFixedInOut, Resampler};

    let channels = clip.channels;
    let mut resampler = FftFixedInOut::<f32>::new(
        clip.sample_rate as usize,
        to_rate as usize,
        1024,
        channels,
    )
    .map_err(|e| anyhow::anyhow!("Resampler init failed: {e}"))?;

    let chunk_size = resampler.input_frames_max();
    let delay      = resampler.output_delay();
    let frames     = clip.frames();
    let expected   = (frames as f64 * to_rate as f64 / clip.sample_rate as f64).round() as usize;
    let mut output: Vec<Vec<f32>> = vec![Vec::new(); channels];

    // Keep feeding silence past the end until the delayed tail is flushed
    let mut start = 0;
    while output[0].len() < delay + expected {
        let (lo, hi) = (start.min(frames), (start + chunk_size).min(frames));
        let chunk: Vec<Vec<f32>> = (0..channels)
            .map(|c| {
                let mut padded = clip.channel(c)[lo..hi].to_vec();
                padded.resize(chunk_size, 0.0);
                padded
            })
            .collect();

        let result = resampler
            .process(&chunk, None)
            .map_err(|e| anyhow::anyhow!("Resampling failed: {e}"))?;
        for (out, res) in output.iter_mut().zip(result) {
            out.extend_from_slice(&res);
        }
        start += chunk_size;
    }

    let samples: Vec<f32> = output
        .into_iter()
        .flat_map(|ch| ch.into_iter().skip(delay).take(expected))
        .collect();

    Ok(AudioClip::new(clip.source, to_rate, channels, samples))
}
