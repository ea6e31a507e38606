//! Utility module with helper functions
//!
//! This module provides:
//! - Configuration handling
//! - Compute context (device) resolution
//! - Checkpoint save/load utilities
//! - Logging setup
//! - Visualization sinks

mod checkpoint;
mod config;
mod device;
mod logging;
mod visualize;

pub use checkpoint::{
    load_checkpoint_meta, save_checkpoint_meta, CheckpointMeta, CheckpointStore, FsCheckpointStore,
    META_FILE,
};
pub use config::{
    ensure_config_exists, CheckpointConfig, Config, DataConfig, ModelSection, TrainingSection,
};
pub use device::ComputeContext;
pub use logging::setup_logging;
pub use visualize::{side_by_side, to_pixels, NullSink, PngSink, SampleSink};
