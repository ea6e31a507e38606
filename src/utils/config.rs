//! Configuration management
//!
//! Provides unified configuration for the whole CartoonGAN pipeline.
//! Files are TOML or JSON, chosen by extension.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{DiscriminatorConfig, GeneratorConfig, ModelConfig};
use crate::training::TrainingConfig;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run name, used for result file names
    pub name: String,
    /// Directory for samples, histories and checkpoints (defaults to `<name>_results`)
    pub results_dir: Option<PathBuf>,
    /// Data configuration
    pub data: DataConfig,
    /// Model configuration
    pub model: ModelSection,
    /// Training configuration
    pub training: TrainingSection,
    /// Checkpoints to resume from
    pub checkpoint: CheckpointConfig,
}

/// Data-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root of the photo dataset
    pub src_data: PathBuf,
    /// Root of the cartoon dataset
    pub tgt_data: PathBuf,
    /// Split holding training photos (and raw cartoons under `tgt_data`)
    pub train_split: String,
    /// Split holding [cartoon | edge-smoothed] pairs under `tgt_data`
    pub pair_split: String,
    /// Split holding test photos under `src_data`
    pub test_split: String,
    /// Square input resolution
    pub input_size: i64,
    /// Batch size
    pub batch_size: usize,
}

/// Model-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub in_g_channel: i64,
    pub out_g_channel: i64,
    pub in_d_channel: i64,
    pub out_d_channel: i64,
    /// Base filters for generator
    pub generator_features: i64,
    /// Base filters for discriminator
    pub discriminator_features: i64,
    /// Residual blocks in the generator bottleneck
    pub resnet_blocks: usize,
    /// Pretrained VGG19 weights
    pub vgg_model: Option<PathBuf>,
}

/// Training-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    /// Reconstruction pretraining epochs
    pub pre_train_epoch: usize,
    /// Adversarial training epochs
    pub train_epoch: usize,
    /// Generator learning rate
    pub lr_g: f64,
    /// Discriminator learning rate
    pub lr_d: f64,
    pub beta1: f64,
    pub beta2: f64,
    /// Content loss weight (lambda)
    pub con_lambda: f64,
    /// Reconstruction loss scale during pretraining
    pub recon_scale: f64,
    /// Sample images written per split at each snapshot
    pub sample_count: usize,
    /// Write sample images at all
    pub save_samples: bool,
    /// Device: "auto", "cpu", "cuda", "cuda:N" or "mps"
    pub device: String,
}

/// Checkpoints to resume from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Generator weights; when set, pretraining is skipped
    pub latest_generator_model: Option<PathBuf>,
    /// Discriminator weights
    pub latest_discriminator_model: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "CartoonGan_Converter".to_string(),
            results_dir: None,
            data: DataConfig::default(),
            model: ModelSection::default(),
            training: TrainingSection::default(),
            checkpoint: CheckpointConfig::default(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            src_data: PathBuf::from("data/src_data"),
            tgt_data: PathBuf::from("data/tgt_data"),
            train_split: "train".to_string(),
            pair_split: "pair".to_string(),
            test_split: "test".to_string(),
            input_size: 256,
            batch_size: 8,
        }
    }
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            in_g_channel: 3,
            out_g_channel: 3,
            in_d_channel: 3,
            out_d_channel: 1,
            generator_features: 64,
            discriminator_features: 32,
            resnet_blocks: 8,
            vgg_model: Some(PathBuf::from("vgg19.pt")),
        }
    }
}

impl Default for TrainingSection {
    fn default() -> Self {
        Self {
            pre_train_epoch: 10,
            train_epoch: 100,
            lr_g: 2e-4,
            lr_d: 2e-4,
            beta1: 0.5,
            beta2: 0.999,
            con_lambda: 10.0,
            recon_scale: 10.0,
            sample_count: 5,
            save_samples: true,
            device: "auto".to_string(),
        }
    }
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from TOML file
    pub fn from_toml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to TOML file
    pub fn save_toml(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load a TOML or JSON file depending on its extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if is_toml(path) {
            Self::from_toml(path)
        } else {
            Self::from_json(path)
        }
    }

    /// Save as TOML or JSON depending on the extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if is_toml(path) {
            self.save_toml(path)
        } else {
            self.save_json(path)
        }
    }

    /// Directory receiving samples, histories and checkpoints
    pub fn results_dir(&self) -> PathBuf {
        self.results_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}_results", self.name)))
    }

    /// Network architecture described by this configuration
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            generator: GeneratorConfig {
                in_channels: self.model.in_g_channel,
                out_channels: self.model.out_g_channel,
                features: self.model.generator_features,
                residual_blocks: self.model.resnet_blocks,
            },
            discriminator: DiscriminatorConfig {
                in_channels: self.model.in_d_channel,
                out_channels: self.model.out_d_channel,
                features: self.model.discriminator_features,
            },
        }
    }

    /// Trainer settings described by this configuration
    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            name: self.name.clone(),
            results_dir: self.results_dir(),
            input_size: self.data.input_size,
            pretrain_epochs: self.training.pre_train_epoch,
            epochs: self.training.train_epoch,
            gen_lr: self.training.lr_g,
            disc_lr: self.training.lr_d,
            beta1: self.training.beta1,
            beta2: self.training.beta2,
            content_weight: self.training.con_lambda,
            recon_scale: self.training.recon_scale,
            sample_count: self.training.sample_count,
            save_samples: self.training.save_samples,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Config(msg));

        if self.name.trim().is_empty() {
            return fail("run name must not be empty".to_string());
        }
        if self.data.batch_size == 0 {
            return fail("batch size must be > 0".to_string());
        }
        if self.data.input_size <= 0 || self.data.input_size % 4 != 0 {
            return fail(format!(
                "input size must be a positive multiple of 4, got {}",
                self.data.input_size
            ));
        }
        let m = &self.model;
        if [m.in_g_channel, m.out_g_channel, m.in_d_channel, m.out_d_channel]
            .iter()
            .any(|&c| c <= 0)
        {
            return fail("channel counts must be > 0".to_string());
        }
        if m.out_g_channel != m.in_d_channel {
            return fail(format!(
                "generator output channels ({}) must match discriminator input channels ({})",
                m.out_g_channel, m.in_d_channel
            ));
        }
        if m.generator_features <= 0 || m.discriminator_features <= 0 {
            return fail("feature widths must be > 0".to_string());
        }
        if m.resnet_blocks == 0 {
            return fail("generator needs at least one residual block".to_string());
        }
        let t = &self.training;
        if t.train_epoch == 0 {
            return fail("number of adversarial epochs must be > 0".to_string());
        }
        if !(t.lr_g > 0.0 && t.lr_d > 0.0) {
            return fail("learning rates must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&t.beta1) || !(0.0..1.0).contains(&t.beta2) {
            return fail(format!("Adam betas must lie in [0, 1), got ({}, {})", t.beta1, t.beta2));
        }
        if t.con_lambda < 0.0 || t.recon_scale < 0.0 {
            return fail("loss weights must be >= 0".to_string());
        }
        if let Some(path) = &self.checkpoint.latest_generator_model {
            if !path.is_file() {
                return fail(format!("generator checkpoint {} does not exist", path.display()));
            }
        }
        if let Some(path) = &self.checkpoint.latest_discriminator_model {
            if !path.is_file() {
                return fail(format!("discriminator checkpoint {} does not exist", path.display()));
            }
        }
        if let Some(path) = &self.model.vgg_model {
            if !path.is_file() {
                return fail(format!("VGG19 weights {} do not exist", path.display()));
            }
        }
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().map(|ext| ext == "toml").unwrap_or(false)
}

/// Load the configuration file if it exists, otherwise write the defaults there
pub fn ensure_config_exists(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if path.exists() {
        Config::load(path)
    } else {
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }
}
