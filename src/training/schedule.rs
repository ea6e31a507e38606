//! Multi-step learning-rate schedule
//!
//! The rate is multiplied by `gamma` each time the number of completed
//! epochs reaches a milestone. A milestone listed twice decays twice.

use serde::{Deserialize, Serialize};

/// Epoch-keyed step decay of a base learning rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiStepLr {
    base_lr: f64,
    milestones: Vec<usize>,
    gamma: f64,
    epoch: usize,
}

impl MultiStepLr {
    pub fn new(base_lr: f64, milestones: Vec<usize>, gamma: f64) -> Self {
        let mut milestones = milestones;
        milestones.sort_unstable();
        Self {
            base_lr,
            milestones,
            gamma,
            epoch: 0,
        }
    }

    /// CartoonGAN schedule: decay by 10x at half and at three quarters of `total_epochs`
    pub fn halving_quarters(base_lr: f64, total_epochs: usize) -> Self {
        Self::new(base_lr, vec![total_epochs / 2, total_epochs / 4 * 3], 0.1)
    }

    /// Learning rate after `epoch` completed epochs
    pub fn lr_at(&self, epoch: usize) -> f64 {
        let decays = self.milestones.iter().filter(|&&m| m <= epoch).count();
        self.base_lr * self.gamma.powi(decays as i32)
    }

    /// Learning rate currently in effect
    pub fn lr(&self) -> f64 {
        self.lr_at(self.epoch)
    }

    /// Advance one epoch and return the new learning rate
    pub fn step(&mut self) -> f64 {
        self.epoch += 1;
        self.lr()
    }

    /// Number of completed epochs
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn milestones(&self) -> &[usize] {
        &self.milestones
    }
}
