//! Residual block used in the generator bottleneck

use tch::{nn, nn::Module, Tensor};

use super::layers::{conv2d, instance_norm};

/// conv → IN → ReLU → conv → IN, added back onto the input.
///
/// Both convolutions are 3x3 with stride 1 and padding 1, so the block
/// never changes the shape of its input.
#[derive(Debug)]
pub struct ResidualBlock {
    conv1: nn::Conv2D,
    conv2: nn::Conv2D,
}

impl ResidualBlock {
    /// Create a residual block operating on `channels` feature maps
    pub fn new(vs: &nn::Path, channels: i64) -> Self {
        let conv1 = conv2d(vs / "conv1", channels, channels, 3, 1, 1);
        let conv2 = conv2d(vs / "conv2", channels, channels, 3, 1, 1);
        Self { conv1, conv2 }
    }
}

impl Module for ResidualBlock {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let x = instance_norm(&self.conv1.forward(xs)).relu();
        let x = instance_norm(&self.conv2.forward(&x));
        xs + x
    }
}
