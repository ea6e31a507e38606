//! Model module containing the CartoonGAN networks
//!
//! This module provides:
//! - Generator (encoder, residual bottleneck, decoder)
//! - Patch Discriminator
//! - Frozen VGG19 feature extractor for the content loss
//! - CartoonGan wrapper owning all three and their variable stores

mod cartoongan;
mod discriminator;
mod generator;
mod layers;
mod residual;
mod vgg;

pub use cartoongan::{CartoonGan, ModelConfig};
pub use discriminator::{Discriminator, DiscriminatorConfig};
pub use generator::{Generator, GeneratorConfig};
pub use residual::ResidualBlock;
pub use vgg::{FeatureExtractor, FEATURE_CHANNELS, FEATURE_LAYERS};
