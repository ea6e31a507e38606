//! Loss history for monitoring CartoonGAN training
//!
//! Every recorded loss is kept for the whole run; epoch summaries are
//! computed from the position where the epoch started.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Name of a tracked loss series
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    /// Scaled feature-space L1 during pretraining
    Reconstruction,
    /// Sum of the three discriminator BCE terms
    Discriminator,
    /// Generator adversarial BCE term
    Generator,
    /// Weighted content loss during adversarial training
    Content,
}

impl LossKind {
    /// Every loss kind, in recording order
    pub const ALL: [LossKind; 4] = [
        LossKind::Reconstruction,
        LossKind::Discriminator,
        LossKind::Generator,
        LossKind::Content,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LossKind::Reconstruction => "reconstruction",
            LossKind::Discriminator => "discriminator",
            LossKind::Generator => "generator",
            LossKind::Content => "content",
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only loss series plus timing for one training phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossAccumulator {
    /// Per-batch loss values by kind
    pub losses: BTreeMap<LossKind, Vec<f64>>,
    /// Wall time of each epoch in seconds
    pub per_epoch_time: Vec<f64>,
    /// Wall time of the whole phase in seconds
    pub total_time: Option<f64>,
}

impl LossAccumulator {
    /// Create new empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one batch loss
    pub fn record(&mut self, kind: LossKind, value: f64) {
        self.losses.entry(kind).or_default().push(value);
    }

    /// All recorded values of a kind
    pub fn series(&self, kind: LossKind) -> &[f64] {
        self.losses.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of recorded values of a kind
    pub fn len(&self, kind: LossKind) -> usize {
        self.series(kind).len()
    }

    /// True when nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.losses.values().all(Vec::is_empty)
    }

    /// Latest value of a kind
    pub fn latest(&self, kind: LossKind) -> Option<f64> {
        self.series(kind).last().copied()
    }

    /// Mean of the values recorded at or after `start`
    pub fn mean_since(&self, kind: LossKind, start: usize) -> f64 {
        let series = self.series(kind);
        if start >= series.len() {
            return 0.0;
        }
        let tail = &series[start..];
        tail.iter().sum::<f64>() / tail.len() as f64
    }

    /// Moving average of the last `window` values of a kind
    pub fn moving_average(&self, kind: LossKind, window: usize) -> f64 {
        moving_average(self.series(kind), window)
    }

    /// Record the wall time of a finished epoch
    pub fn record_epoch_time(&mut self, seconds: f64) {
        self.per_epoch_time.push(seconds);
    }

    /// Number of finished epochs
    pub fn num_epochs(&self) -> usize {
        self.per_epoch_time.len()
    }

    /// Mean epoch wall time
    pub fn mean_epoch_time(&self) -> f64 {
        moving_average(&self.per_epoch_time, self.per_epoch_time.len())
    }

    /// Check if adversarial training appears to have collapsed
    ///
    /// Collapse indicators:
    /// - Discriminator loss very low (separates cartoons from generated images trivially)
    /// - Generator adversarial loss very high (cannot fool the discriminator)
    pub fn check_mode_collapse(&self, window: usize) -> bool {
        if self.len(LossKind::Discriminator) < window || window == 0 {
            return false;
        }

        let disc_ma = self.moving_average(LossKind::Discriminator, window);
        let gen_ma = self.moving_average(LossKind::Generator, window);

        disc_ma < 0.1 && gen_ma > 5.0
    }

    /// Save as pretty JSON
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load from JSON
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save the loss series to a CSV file, one row per step
    ///
    /// Series of different length leave trailing cells empty.
    pub fn save_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;

        let kinds: Vec<LossKind> = LossKind::ALL
            .into_iter()
            .filter(|kind| self.len(*kind) > 0)
            .collect();

        let mut header = vec!["step".to_string()];
        header.extend(kinds.iter().map(|k| k.to_string()));
        writer.write_record(&header)?;

        let rows = kinds.iter().map(|k| self.len(*k)).max().unwrap_or(0);
        for i in 0..rows {
            let mut record = vec![(i + 1).to_string()];
            for kind in &kinds {
                record.push(
                    self.series(*kind)
                        .get(i)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                );
            }
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Histories of both training phases, owned by the trainer and returned to the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Reconstruction pretraining
    pub pretrain: LossAccumulator,
    /// Adversarial training
    pub adversarial: LossAccumulator,
}

/// Calculate moving average of last `window` values
fn moving_average(values: &[f64], window: usize) -> f64 {
    if values.is_empty() || window == 0 {
        return 0.0;
    }

    let n = window.min(values.len());
    let sum: f64 = values.iter().rev().take(n).sum();
    sum / n as f64
}
