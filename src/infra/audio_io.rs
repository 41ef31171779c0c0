// ============================================================
// Layer 6 - WAV Output
// ============================================================
// 16-bit PCM writer for demos and reconstructions. Callers hand
// over planar audio ([channel][frame]); hound wants interleaved
// samples, so frames are written channel by channel.

use anyhow::{ensure, Context, Result};
use std::path::Path;

/// Clamp to [-1, 1] and scale to the i16 range.
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Write planar 16-bit samples (`channels` rows of equal length).
pub fn write_wav_i16(path: &Path, planar: &[i16], channels: usize, sample_rate: u32) -> Result<()> {
    ensure!(channels > 0, "cannot write a WAV file with 0 channels");
    ensure!(
        planar.len() % channels == 0,
        "{} samples do not split evenly into {} channels",
        planar.len(),
        channels
    );

    let spec = hound::WavSpec {
        channels:        channels as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format:   hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;

    let frames = planar.len() / channels;
    for frame in 0..frames {
        for ch in 0..channels {
            writer.write_sample(planar[ch * frames + frame])?;
        }
    }
    writer
        .finalize()
        .with_context(|| format!("Cannot finalise '{}'", path.display()))?;

    tracing::debug!("Wrote {} frames x {} ch to '{}'", frames, channels, path.display());
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::load_wav;

    #[test]
    fn test_to_pcm16_clamps() {
        assert_eq!(to_pcm16(&[0.0, 1.0, -1.0, 2.0, -3.0]), vec![0, 32767, -32767, 32767, -32767]);
        assert_eq!(to_pcm16(&[0.5]), vec![16383]);
    }

    #[test]
    fn test_written_file_reads_back_planar() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");

        // left: rising, right: silent
        let planar = to_pcm16(&[0.25, 0.5, 0.75, 0.0, 0.0, 0.0]);
        write_wav_i16(&path, &planar, 2, 16000).unwrap();

        let clip = load_wav(&path).unwrap();
        assert_eq!(clip.channels, 2);
        assert_eq!(clip.sample_rate, 16000);
        assert_eq!(clip.frames(), 3);
        assert!((clip.channel(0)[2] - 0.75).abs() < 1e-3);
        assert!(clip.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_rejects_ragged_channels() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_wav_i16(&dir.path().join("x.wav"), &[1, 2, 3], 2, 8000).is_err());
    }
}
