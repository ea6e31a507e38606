//! Discriminator network for CartoonGAN
//!
//! A fully-convolutional patch discriminator: every element of the output
//! map scores one receptive-field patch of the input as cartoon or not.

use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, Tensor};

use super::layers::{conv2d, instance_norm, leaky_relu};

/// Discriminator network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscriminatorConfig {
    /// Number of input image channels
    pub in_channels: i64,
    /// Number of output channels (1 for a single real/fake map)
    pub out_channels: i64,
    /// Base number of filters
    pub features: i64,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            out_channels: 1,
            features: 32,
        }
    }
}

/// Discriminator network
///
/// Architecture (k3 convolutions, LeakyReLU 0.2):
/// s1 → s2 → s1+IN → s2 → s1+IN → s1+IN → s1 + sigmoid
///
/// Two stride-2 layers give an output map of (B, out_channels, H/4, W/4).
#[derive(Debug)]
pub struct Discriminator {
    config: DiscriminatorConfig,
    conv1: nn::Conv2D,
    conv2: nn::Conv2D,
    conv3: nn::Conv2D,
    conv4: nn::Conv2D,
    conv5: nn::Conv2D,
    conv6: nn::Conv2D,
    conv7: nn::Conv2D,
}

impl Discriminator {
    /// Create a new Discriminator network
    pub fn new(vs: &nn::Path, config: DiscriminatorConfig) -> Self {
        let f = config.features;

        let conv1 = conv2d(vs / "conv1", config.in_channels, f, 3, 1, 1);
        let conv2 = conv2d(vs / "conv2", f, f * 2, 3, 2, 1);
        let conv3 = conv2d(vs / "conv3", f * 2, f * 4, 3, 1, 1);
        let conv4 = conv2d(vs / "conv4", f * 4, f * 4, 3, 2, 1);
        let conv5 = conv2d(vs / "conv5", f * 4, f * 8, 3, 1, 1);
        let conv6 = conv2d(vs / "conv6", f * 8, f * 8, 3, 1, 1);
        let conv7 = conv2d(vs / "conv7", f * 8, config.out_channels, 3, 1, 1);

        Self {
            config,
            conv1,
            conv2,
            conv3,
            conv4,
            conv5,
            conv6,
            conv7,
        }
    }

    /// Get configuration
    pub fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }
}

impl Module for Discriminator {
    /// Returns per-patch probabilities (after sigmoid)
    fn forward(&self, xs: &Tensor) -> Tensor {
        let x = leaky_relu(&self.conv1.forward(xs));
        let x = leaky_relu(&self.conv2.forward(&x));
        let x = leaky_relu(&instance_norm(&self.conv3.forward(&x)));
        let x = leaky_relu(&self.conv4.forward(&x));
        let x = leaky_relu(&instance_norm(&self.conv5.forward(&x)));
        let x = leaky_relu(&instance_norm(&self.conv6.forward(&x)));
        self.conv7.forward(&x).sigmoid()
    }
}
