//! Visualization sinks for sample snapshots

use std::path::Path;

use tch::{Device, Kind, Tensor};

use crate::error::{Error, Result};

/// Destination for human-viewable sample images
pub trait SampleSink {
    /// Persist a (C, H, W) image with values in [-1, 1]
    fn save(&self, image: &Tensor, path: &Path) -> Result<()>;
}

/// Writes samples as image files (format picked from the extension)
#[derive(Debug, Clone, Copy, Default)]
pub struct PngSink;

impl SampleSink for PngSink {
    fn save(&self, image: &Tensor, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tch::vision::image::save(&to_pixels(image)?, path)?;
        Ok(())
    }
}

/// Discards every sample
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl SampleSink for NullSink {
    fn save(&self, _image: &Tensor, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Map a [-1, 1] float image to u8 pixels on the CPU
pub fn to_pixels(image: &Tensor) -> Result<Tensor> {
    let image = match image.dim() {
        3 => image.shallow_clone(),
        4 if image.size()[0] == 1 => image.squeeze_dim(0),
        _ => {
            return Err(Error::Config(format!(
                "expected a (C, H, W) image, got shape {:?}",
                image.size()
            )))
        }
    };

    Ok(((image.to_device(Device::Cpu).to_kind(Kind::Float) + 1.0) * 127.5)
        .clamp(0.0, 255.0)
        .round()
        .to_kind(Kind::Uint8))
}

/// Place an input and its stylized output side by side along the width
pub fn side_by_side(input: &Tensor, output: &Tensor) -> Tensor {
    Tensor::cat(&[input, output], -1)
}
