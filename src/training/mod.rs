//! Training module for CartoonGAN
//!
//! This module provides:
//! - The two-phase training orchestrator (pretraining, adversarial training)
//! - Loss functions (BCE against batch roles, feature-space L1)
//! - Multi-step learning-rate schedule
//! - Loss history bookkeeping

mod history;
mod losses;
mod schedule;
mod trainer;

pub use history::{LossAccumulator, LossKind, TrainingHistory};
pub use losses::{
    adversarial_loss, content_loss, discriminator_loss, BatchRole, DiscriminatorLoss,
};
pub use schedule::MultiStepLr;
pub use trainer::{
    adversarial_step, reconstruction_step, EntryPoint, Optimizers, StepLosses, Trainer,
    TrainingConfig, TrainingData, TrainingPhase,
};
