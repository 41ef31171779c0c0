// ============================================================
// Layer 3 - Experiment Log Values
// ============================================================
// What the training loop and the demo callback hand to the
// experiment tracker. Media is written to disk first and then
// referenced by path, so every value stays serialisable.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogValue {
    Scalar { value: f64 },
    Audio  { path: PathBuf, sample_rate: u32, caption: String },
    Image  { path: PathBuf },
    /// Points as [x, y, z, r, g, b] rows
    PointCloud { path: PathBuf, points: usize },
}

impl LogValue {
    pub fn scalar(value: f64) -> Self {
        LogValue::Scalar { value }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            LogValue::Scalar { value } => Some(*value),
            _ => None,
        }
    }
}

/// Ordered so that JSON lines and CSV columns are stable between steps
pub type LogDict = BTreeMap<String, LogValue>;
