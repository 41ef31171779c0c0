// ============================================================
// Layer 6 - Metrics Logger
// ============================================================
// Records one CSV row per training step.
//
// Generator and discriminator steps log different values, so the
// columns are the union of both and a step leaves the columns it
// did not compute empty.
//
// Output file: {checkpoint_dir}/metrics.csv
//
// Example CSV output:
//   step,phase,loss,mrstft_loss,l1_time_loss,loss_adv,feature_matching,kl_loss,latent_std,discriminator_loss
//   1,generator,3.124500,3.120100,0.081200,0.000000,0.000000,0.004400,0.981000,
//   150002,discriminator,1.998100,,,,,,,1.998100
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};
use serde::{Deserialize, Serialize};

use crate::domain::log_entry::LogDict;
use crate::ml::trainer::StepPhase;

/// Value columns after `step,phase,loss`, each read from `train/{name}`.
const COLUMNS: [&str; 7] = [
    "mrstft_loss",
    "l1_time_loss",
    "loss_adv",
    "feature_matching",
    "kl_loss",
    "latent_std",
    "discriminator_loss",
];

/// One row of metrics data for a single training step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMetrics {
    /// Global step after the update
    pub step:  usize,
    pub phase: String,
    /// The loss that was optimised on this step
    pub loss:  f64,
    /// Same order as COLUMNS; None when the step did not compute it
    pub values: Vec<Option<f64>>,
}

impl StepMetrics {
    pub fn from_log(step: usize, phase: StepPhase, loss: f64, log: &LogDict) -> Self {
        let values = COLUMNS
            .iter()
            .map(|name| {
                log.get(&format!("train/{name}"))
                    .and_then(|v| v.as_scalar())
            })
            .collect();
        Self { step, phase: phase.as_str().to_string(), loss, values }
    }

    fn csv_row(&self) -> String {
        let mut row = format!("{},{},{:.6}", self.step, self.phase, self.loss);
        for v in &self.values {
            row.push(',');
            if let Some(v) = v {
                row.push_str(&format!("{v:.6}"));
            }
        }
        row
    }
}

/// Logs step metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet, so a
    /// resumed run keeps appending to the same file.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "step,phase,loss,{}", COLUMNS.join(","))?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one step as a new row.
    pub fn log(&self, m: &StepMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;
        writeln!(f, "{}", m.csv_row())?;

        tracing::trace!("Logged step {} metrics: loss={:.4}", m.step, m.loss);
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::log_entry::LogValue;

    #[test]
    fn test_row_leaves_missing_columns_empty() {
        let mut log = LogDict::new();
        log.insert("train/discriminator_loss".into(), LogValue::scalar(1.5));
        let m = StepMetrics::from_log(4, StepPhase::Discriminator, 1.5, &log);
        assert_eq!(m.csv_row(), "4,discriminator,1.500000,,,,,,,1.500000");
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();

        let mut log = LogDict::new();
        log.insert("train/mrstft_loss".into(), LogValue::scalar(0.25));
        MetricsLogger::new(path.clone()).unwrap()
            .log(&StepMetrics::from_log(1, StepPhase::Generator, 0.25, &log))
            .unwrap();
        // Re-opening (resume) must not write a second header
        MetricsLogger::new(path).unwrap()
            .log(&StepMetrics::from_log(2, StepPhase::Generator, 0.5, &log))
            .unwrap();

        let text = fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("step,phase,loss,mrstft_loss"));
        assert_eq!(lines[2], "2,generator,0.500000,0.250000,,,,,,");
    }
}
