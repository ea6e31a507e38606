//! Frozen VGG19 feature extractor for the content loss
//!
//! Only the convolutional stack up to conv4_4 is built; the classifier head
//! is never instantiated. Variable names follow the torchvision layout
//! (`features.<index>.weight`), so converted `vgg19` weights load as-is and
//! any classifier entries in the weight file are ignored.

use std::path::Path;

use tch::{nn, nn::ModuleT, Device, Tensor};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// VGG19 layer layout: channel counts, `None` marks a 2x2 max-pool
const VGG19_CFG: [Option<i64>; 21] = [
    Some(64),
    Some(64),
    None,
    Some(128),
    Some(128),
    None,
    Some(256),
    Some(256),
    Some(256),
    Some(256),
    None,
    Some(512),
    Some(512),
    Some(512),
    Some(512),
    None,
    Some(512),
    Some(512),
    Some(512),
    Some(512),
    None,
];

/// Number of feature-stack entries evaluated in feature mode (through conv4_4)
pub const FEATURE_LAYERS: usize = 26;

/// Channels of the extracted feature map
pub const FEATURE_CHANNELS: i64 = 512;

/// Frozen VGG19 running in feature mode
pub struct FeatureExtractor {
    features: nn::SequentialT,
    vs: nn::VarStore,
}

impl std::fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("layers", &self.features.len())
            .field("device", &self.vs.device())
            .finish()
    }
}

fn feature_stack(p: &nn::Path, depth: usize) -> nn::SequentialT {
    let f = p / "features";
    let depth = depth as i64;
    let mut seq = nn::seq_t();
    let mut c_in = 3;

    for entry in VGG19_CFG.iter() {
        if seq.len() >= depth {
            break;
        }
        match *entry {
            Some(c_out) => {
                let conv = nn::conv2d(
                    &f / seq.len(),
                    c_in,
                    c_out,
                    3,
                    nn::ConvConfig {
                        padding: 1,
                        ..Default::default()
                    },
                );
                seq = seq.add(conv);
                c_in = c_out;
                if seq.len() < depth {
                    seq = seq.add_fn(|xs| xs.relu());
                }
            }
            None => {
                seq = seq.add_fn(|xs| xs.max_pool2d_default(2));
            }
        }
    }

    seq
}

impl FeatureExtractor {
    /// Build the extractor on `device`, loading pretrained weights when given
    ///
    /// Without weights the network stays randomly initialized, which makes the
    /// content loss meaningless; a warning is logged in that case.
    pub fn new(device: Device, weights: Option<&Path>) -> Result<Self> {
        let mut vs = nn::VarStore::new(device);
        let features = feature_stack(&vs.root(), FEATURE_LAYERS);

        match weights {
            Some(path) => {
                vs.load(path).map_err(|source| {
                    tracing::error!("Failed to load VGG19 weights from {}: {}", path.display(), source);
                    Error::Checkpoint {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                info!("Loaded VGG19 weights from {}", path.display());
            }
            None => {
                warn!("No VGG19 weights supplied; content loss uses a randomly initialized network");
            }
        }

        vs.freeze();

        Ok(Self { features, vs })
    }

    /// Extract conv4_4 features from images normalized to [-1, 1]
    ///
    /// Always runs in inference mode. Gradients still flow back to the input
    /// when it requires them, but never into the extractor's own weights.
    pub fn forward(&self, images: &Tensor) -> Tensor {
        let xs = (images + 1.0) / 2.0;
        self.features.forward_t(&xs, false)
    }

    /// Number of layers evaluated in feature mode
    pub fn depth(&self) -> usize {
        self.features.len() as usize
    }

    /// Variable store holding the frozen weights
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    #[test]
    fn test_feature_stack_layout() {
        let extractor = FeatureExtractor::new(Device::Cpu, None).unwrap();
        assert_eq!(extractor.depth(), FEATURE_LAYERS);

        let vars = extractor.var_store().variables();
        // 12 convolutions up to conv4_4, torchvision indices
        assert_eq!(vars.len(), 24);
        assert!(vars.contains_key("features.0.weight"));
        assert!(vars.contains_key("features.25.weight"));
        assert!(!vars.contains_key("features.28.weight"));
    }

    #[test]
    fn test_feature_shape() {
        let extractor = FeatureExtractor::new(Device::Cpu, None).unwrap();
        let images = Tensor::rand([2, 3, 32, 32], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
        let features = extractor.forward(&images);
        assert_eq!(features.size(), vec![2, FEATURE_CHANNELS, 4, 4]);
    }

    #[test]
    fn test_extractor_is_frozen_and_deterministic() {
        let extractor = FeatureExtractor::new(Device::Cpu, None).unwrap();
        for (_, var) in extractor.var_store().variables() {
            assert!(!var.requires_grad());
        }

        let images = Tensor::randn([1, 3, 16, 16], (Kind::Float, Device::Cpu));
        let a = extractor.forward(&images);
        let b = extractor.forward(&images);
        assert!(a.equal(&b));
    }

    #[test]
    fn test_missing_weights_file_is_checkpoint_error() {
        let err = FeatureExtractor::new(Device::Cpu, Some(Path::new("/nonexistent/vgg19.pt")))
            .unwrap_err();
        assert!(matches!(err, Error::Checkpoint { .. }));
    }
}
