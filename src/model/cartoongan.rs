//! CartoonGAN wrapper combining Generator, Discriminator and the VGG19 extractor
//!
//! Each trainable network lives in its own variable store so that the two
//! optimizers never touch each other's parameters.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, nn::OptimizerConfig, nn::VarStore, Device, Tensor};

use super::discriminator::{Discriminator, DiscriminatorConfig};
use super::generator::{Generator, GeneratorConfig};
use super::vgg::FeatureExtractor;
use crate::error::Result;
use crate::utils::ComputeContext;

/// Architecture of both trainable networks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub generator: GeneratorConfig,
    pub discriminator: DiscriminatorConfig,
}

/// Complete CartoonGAN model
pub struct CartoonGan {
    /// Generator network
    pub generator: Generator,
    /// Discriminator network
    pub discriminator: Discriminator,
    /// Frozen feature extractor for the content loss
    pub extractor: FeatureExtractor,
    /// Variable store for generator
    pub gen_vs: VarStore,
    /// Variable store for discriminator
    pub disc_vs: VarStore,
    /// Device all three networks live on
    pub device: Device,
    config: ModelConfig,
}

impl CartoonGan {
    /// Create a new CartoonGAN model
    ///
    /// # Arguments
    ///
    /// * `config` - Generator and discriminator architecture
    /// * `ctx` - Compute context the networks are placed on
    /// * `vgg_weights` - Pretrained VGG19 weights for the feature extractor
    pub fn new(config: ModelConfig, ctx: &ComputeContext, vgg_weights: Option<&Path>) -> Result<Self> {
        let device = ctx.device();
        let gen_vs = VarStore::new(device);
        let disc_vs = VarStore::new(device);

        let generator = Generator::new(&gen_vs.root(), config.generator.clone());
        let discriminator = Discriminator::new(&disc_vs.root(), config.discriminator.clone());
        let extractor = FeatureExtractor::new(device, vgg_weights)?;

        Ok(Self {
            generator,
            discriminator,
            extractor,
            gen_vs,
            disc_vs,
            device,
            config,
        })
    }

    /// Stylize a batch of photos without tracking gradients
    pub fn stylize(&self, images: &Tensor) -> Tensor {
        tch::no_grad(|| self.generator.forward(&images.to_device(self.device)))
    }

    /// Adam optimizer over the generator's parameters
    pub fn gen_optimizer(&self, lr: f64, beta1: f64, beta2: f64) -> Result<nn::Optimizer> {
        Ok(nn::adam(beta1, beta2, 0.0).build(&self.gen_vs, lr)?)
    }

    /// Adam optimizer over the discriminator's parameters
    pub fn disc_optimizer(&self, lr: f64, beta1: f64, beta2: f64) -> Result<nn::Optimizer> {
        Ok(nn::adam(beta1, beta2, 0.0).build(&self.disc_vs, lr)?)
    }

    /// Parameter counts of (generator, discriminator, feature extractor)
    pub fn parameter_counts(&self) -> (i64, i64, i64) {
        (
            count_parameters(&self.gen_vs),
            count_parameters(&self.disc_vs),
            count_parameters(self.extractor.var_store()),
        )
    }

    /// Get model configuration
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

/// Total number of scalar parameters in a variable store
pub fn count_parameters(vs: &VarStore) -> i64 {
    vs.variables().values().map(|t| t.numel() as i64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    fn tiny_config() -> ModelConfig {
        ModelConfig {
            generator: GeneratorConfig {
                features: 4,
                residual_blocks: 1,
                ..Default::default()
            },
            discriminator: DiscriminatorConfig {
                features: 4,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_cartoongan_creation() {
        let model = CartoonGan::new(tiny_config(), &ComputeContext::cpu(), None).unwrap();
        let (gen, disc, vgg) = model.parameter_counts();

        assert!(gen > 0);
        assert!(disc > 0);
        assert!(vgg > gen);
        assert_eq!(model.config().generator.residual_blocks, 1);
    }

    #[test]
    fn test_cartoongan_stylize() {
        let model = CartoonGan::new(tiny_config(), &ComputeContext::cpu(), None).unwrap();

        let photos = Tensor::rand([2, 3, 16, 16], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
        let cartoons = model.stylize(&photos);

        assert_eq!(cartoons.size(), vec![2, 3, 16, 16]);
        assert!(!cartoons.requires_grad());
    }

    #[test]
    fn test_separate_var_stores() {
        let model = CartoonGan::new(tiny_config(), &ComputeContext::cpu(), None).unwrap();

        let gen_names: Vec<String> = model.gen_vs.variables().into_keys().collect();
        let disc_names: Vec<String> = model.disc_vs.variables().into_keys().collect();

        assert!(gen_names.iter().all(|n| n.starts_with("down.") || n.starts_with("resnet.") || n.starts_with("up.")));
        assert!(disc_names.iter().all(|n| n.starts_with("conv")));
    }
}
