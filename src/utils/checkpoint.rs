//! Checkpoint save/load utilities
//!
//! Network parameters are persisted through a [`CheckpointStore`]; run
//! metadata is written next to them as JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tch::nn::VarStore;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::model::ModelConfig;
use crate::training::{LossKind, TrainingHistory, TrainingPhase};

/// File name of the metadata written next to the latest checkpoints
pub const META_FILE: &str = "checkpoint_meta.json";

/// Storage for network parameters
pub trait CheckpointStore {
    /// Load parameters into `vs`; fails if the file is absent or corrupt
    fn load(&self, vs: &mut VarStore, path: &Path) -> Result<()>;

    /// Persist the parameters of `vs`
    fn save(&self, vs: &VarStore, path: &Path) -> Result<()>;
}

/// Checkpoints as files on the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsCheckpointStore;

impl CheckpointStore for FsCheckpointStore {
    fn load(&self, vs: &mut VarStore, path: &Path) -> Result<()> {
        vs.load(path).map_err(|source| {
            error!("Failed to load checkpoint {}: {}", path.display(), source);
            Error::Checkpoint {
                path: path.to_path_buf(),
                source,
            }
        })?;
        info!("Loaded checkpoint from {}", path.display());
        Ok(())
    }

    fn save(&self, vs: &VarStore, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        vs.save(path).map_err(|source| {
            error!("Failed to save checkpoint {}: {}", path.display(), source);
            Error::Checkpoint {
                path: path.to_path_buf(),
                source,
            }
        })
    }
}

/// Checkpoint metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Number of completed adversarial epochs
    pub epoch: usize,
    /// Phase the run was in when the checkpoint was written
    pub phase: TrainingPhase,
    /// Latest discriminator loss
    pub disc_loss: Option<f64>,
    /// Latest generator adversarial loss
    pub gen_loss: Option<f64>,
    /// Latest content loss
    pub content_loss: Option<f64>,
    /// Timestamp of checkpoint
    pub timestamp: String,
    /// Network architecture
    pub model: ModelConfig,
    /// Generator weights file
    pub generator: PathBuf,
    /// Discriminator weights file
    pub discriminator: PathBuf,
}

impl CheckpointMeta {
    /// Describe a checkpoint written after `epoch` adversarial epochs
    pub fn new(
        epoch: usize,
        phase: TrainingPhase,
        history: &TrainingHistory,
        model: &ModelConfig,
        generator: PathBuf,
        discriminator: PathBuf,
    ) -> Self {
        let latest = |kind| history.adversarial.latest(kind);
        Self {
            epoch,
            phase,
            disc_loss: latest(LossKind::Discriminator),
            gen_loss: latest(LossKind::Generator),
            content_loss: latest(LossKind::Content),
            timestamp: chrono::Utc::now().to_rfc3339(),
            model: model.clone(),
            generator,
            discriminator,
        }
    }
}

/// Save checkpoint metadata into `dir`
pub fn save_checkpoint_meta(meta: &CheckpointMeta, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(META_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(meta)?)?;
    Ok(path)
}

/// Load checkpoint metadata from `dir`
pub fn load_checkpoint_meta(dir: &Path) -> Result<CheckpointMeta> {
    let content = std::fs::read_to_string(dir.join(META_FILE))?;
    Ok(serde_json::from_str(&content)?)
}
