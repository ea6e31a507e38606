//! Generator network for CartoonGAN
//!
//! Maps a photograph to a cartoon-styled image of the same resolution.
//! Architecture: a downsampling encoder, a bottleneck of residual blocks
//! and an upsampling decoder ending in tanh.

use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, Tensor};

use super::layers::{conv2d, instance_norm, upconv2d};
use super::residual::ResidualBlock;

/// Generator network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Number of input image channels
    pub in_channels: i64,
    /// Number of output image channels
    pub out_channels: i64,
    /// Base channel width (the bottleneck runs at 4x this)
    pub features: i64,
    /// Number of residual blocks in the bottleneck
    pub residual_blocks: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            out_channels: 3,
            features: 64,
            residual_blocks: 8,
        }
    }
}

/// Generator network
///
/// Architecture:
/// 1. k7s1 conv, then two stride-2 stages (strided conv + k3s1 conv), each with IN + ReLU
/// 2. `residual_blocks` residual blocks at H/4 x W/4 and 4 * `features` channels
/// 3. Two stride-2 transposed-conv stages (+ k3s1 conv, IN, ReLU), k7s1 conv, tanh
#[derive(Debug)]
pub struct Generator {
    config: GeneratorConfig,
    down1: nn::Conv2D,
    down2a: nn::Conv2D,
    down2b: nn::Conv2D,
    down3a: nn::Conv2D,
    down3b: nn::Conv2D,
    blocks: Vec<ResidualBlock>,
    up1a: nn::ConvTranspose2D,
    up1b: nn::Conv2D,
    up2a: nn::ConvTranspose2D,
    up2b: nn::Conv2D,
    out: nn::Conv2D,
}

impl Generator {
    /// Create a new Generator network
    pub fn new(vs: &nn::Path, config: GeneratorConfig) -> Self {
        let f = config.features;

        let down = vs / "down";
        let down1 = conv2d(&down / "conv1", config.in_channels, f, 7, 1, 3);
        let down2a = conv2d(&down / "conv2a", f, f * 2, 3, 2, 1);
        let down2b = conv2d(&down / "conv2b", f * 2, f * 2, 3, 1, 1);
        let down3a = conv2d(&down / "conv3a", f * 2, f * 4, 3, 2, 1);
        let down3b = conv2d(&down / "conv3b", f * 4, f * 4, 3, 1, 1);

        let res = vs / "resnet";
        let blocks = (0..config.residual_blocks)
            .map(|i| ResidualBlock::new(&(&res / i), f * 4))
            .collect();

        let up = vs / "up";
        let up1a = upconv2d(&up / "deconv1", f * 4, f * 2);
        let up1b = conv2d(&up / "conv1", f * 2, f * 2, 3, 1, 1);
        let up2a = upconv2d(&up / "deconv2", f * 2, f);
        let up2b = conv2d(&up / "conv2", f, f, 3, 1, 1);
        let out = conv2d(&up / "out", f, config.out_channels, 7, 1, 3);

        Self {
            config,
            down1,
            down2a,
            down2b,
            down3a,
            down3b,
            blocks,
            up1a,
            up1b,
            up2a,
            up2b,
            out,
        }
    }

    /// Encoder: (B, C, H, W) -> (B, 4f, H/4, W/4)
    fn encode(&self, xs: &Tensor) -> Tensor {
        let x = instance_norm(&self.down1.forward(xs)).relu();

        let x = self.down2b.forward(&self.down2a.forward(&x));
        let x = instance_norm(&x).relu();

        let x = self.down3b.forward(&self.down3a.forward(&x));
        instance_norm(&x).relu()
    }

    /// Decoder: (B, 4f, H/4, W/4) -> (B, out_channels, H, W)
    fn decode(&self, xs: &Tensor) -> Tensor {
        let x = self.up1b.forward(&self.up1a.forward(xs));
        let x = instance_norm(&x).relu();

        let x = self.up2b.forward(&self.up2a.forward(&x));
        let x = instance_norm(&x).relu();

        self.out.forward(&x).tanh()
    }

    /// Get configuration
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

impl Module for Generator {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let x = self.encode(xs);
        let x = self.blocks.iter().fold(x, |x, block| block.forward(&x));
        self.decode(&x)
    }
}
