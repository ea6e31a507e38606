//! # CartoonGAN
//!
//! This crate trains an image-to-image generator that turns photographs into
//! cartoon-styled images, following the CartoonGAN recipe: a residual
//! encoder/decoder generator, a patch discriminator that also sees cartoons
//! with smoothed edges, and a VGG19 content loss.
//!
//! ## Modules
//!
//! - `data`: Image folders, batching and edge promotion
//! - `model`: Generator, Discriminator and the frozen VGG19 feature extractor
//! - `training`: Two-phase training loop, losses and learning-rate schedule
//! - `transfer`: Inference with a trained generator
//! - `utils`: Configuration, devices, checkpoints, logging and sample sinks

pub mod data;
pub mod error;
pub mod model;
pub mod training;
pub mod transfer;
pub mod utils;

pub use data::{DataLoader, ImageFolder};
pub use error::{Error, Result};
pub use model::{CartoonGan, Discriminator, FeatureExtractor, Generator, ModelConfig, ResidualBlock};
pub use training::{EntryPoint, Trainer, TrainingConfig, TrainingData, TrainingHistory, TrainingPhase};
pub use transfer::Stylizer;
pub use utils::{ComputeContext, Config};
