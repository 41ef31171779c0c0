// ============================================================
// Layer 6 - Local Experiment Tracker
// ============================================================
// Appends every logged dict to {dir}/history.jsonl:
//
//   {"step":1,"values":{"train/loss":{"type":"scalar","value":2.1}}}
//   {"step":1,"values":{"recon":{"type":"audio","path":"media/recon_00000001.wav",...}}}
//
// Media files (wav, png, point clouds) live under {dir}/media and
// are referenced by path, so the history stays small and greppable.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use crate::domain::{log_entry::LogDict, traits::ExperimentLogger};

/// One line of history.jsonl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub step:   usize,
    pub values: LogDict,
}

pub struct LocalExperiment {
    history_path: PathBuf,
    media_dir:    PathBuf,
}

impl LocalExperiment {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let media_dir = dir.join("media");
        fs::create_dir_all(&media_dir)
            .with_context(|| format!("Cannot create experiment dir '{}'", dir.display()))?;

        let history_path = dir.join("history.jsonl");
        tracing::debug!("Experiment history: '{}'", history_path.display());
        Ok(Self { history_path, media_dir })
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    /// Read every record back, oldest first.
    pub fn read_history(&self) -> Result<Vec<HistoryRecord>> {
        if !self.history_path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.history_path)?);
        reader
            .lines()
            .filter(|l| l.as_ref().map(|s| !s.trim().is_empty()).unwrap_or(true))
            .map(|line| Ok(serde_json::from_str(&line?)?))
            .collect()
    }
}

impl ExperimentLogger for LocalExperiment {
    fn log(&mut self, values: &LogDict, step: usize) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let line = serde_json::to_string(&HistoryRecord { step, values: values.clone() })?;

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)
            .with_context(|| format!("Cannot open '{}'", self.history_path.display()))?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    fn media_dir(&self) -> &Path {
        &self.media_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::log_entry::LogValue;

    #[test]
    fn test_log_appends_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut exp = LocalExperiment::new(dir.path()).unwrap();
        assert!(exp.media_dir().is_dir());

        let mut a = LogDict::new();
        a.insert("train/loss".into(), LogValue::scalar(1.5));
        exp.log(&a, 1).unwrap();

        let mut b = LogDict::new();
        b.insert(
            "recon".into(),
            LogValue::Audio {
                path:        exp.media_dir().join("recon_00000002.wav"),
                sample_rate: 48000,
                caption:     "Reconstructed".into(),
            },
        );
        exp.log(&b, 2).unwrap();
        exp.log(&LogDict::new(), 3).unwrap();

        let history = exp.read_history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].step, 1);
        assert_eq!(history[0].values["train/loss"].as_scalar(), Some(1.5));
        assert_eq!(history[1].values, b);
    }

    #[test]
    fn test_line_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut exp = LocalExperiment::new(dir.path()).unwrap();
        let mut a = LogDict::new();
        a.insert("train/loss".into(), LogValue::scalar(2.0));
        exp.log(&a, 7).unwrap();

        let text = fs::read_to_string(exp.history_path()).unwrap();
        assert_eq!(
            text.trim(),
            r#"{"step":7,"values":{"train/loss":{"type":"scalar","value":2.0}}}"#
        );
    }
}
