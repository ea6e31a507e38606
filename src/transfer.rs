//! Inference: stylize photos with a trained generator

use std::path::Path;

use tch::{nn::Module, nn::VarStore, vision::image, Device, Tensor};
use tracing::{info, warn};

use crate::data::{list_images, normalize};
use crate::error::{Error, Result};
use crate::model::{Generator, GeneratorConfig};
use crate::utils::{CheckpointStore, ComputeContext, SampleSink};

/// A generator restored for inference
pub struct Stylizer {
    generator: Generator,
    vs: VarStore,
    device: Device,
}

impl Stylizer {
    /// Untrained generator (mostly useful for tests)
    pub fn new(config: GeneratorConfig, ctx: &ComputeContext) -> Self {
        let device = ctx.device();
        let mut vs = VarStore::new(device);
        let generator = Generator::new(&vs.root(), config);
        vs.freeze();
        Self {
            generator,
            vs,
            device,
        }
    }

    /// Restore generator weights from `checkpoint`
    pub fn load<S: CheckpointStore>(
        config: GeneratorConfig,
        ctx: &ComputeContext,
        store: &S,
        checkpoint: &Path,
    ) -> Result<Self> {
        let mut stylizer = Self::new(config, ctx);
        store.load(&mut stylizer.vs, checkpoint)?;
        stylizer.vs.freeze();
        Ok(stylizer)
    }

    /// Stylize a batch of images in [-1, 1]
    pub fn stylize(&self, images: &Tensor) -> Tensor {
        tch::no_grad(|| self.generator.forward(&images.to_device(self.device)))
    }

    /// Stylize one image file into a (3, H, W) tensor in [-1, 1]
    ///
    /// With `size`, the image is resized to a `size` square; otherwise each side
    /// is rounded down to a multiple of 4.
    pub fn stylize_file(&self, path: &Path, size: Option<i64>) -> Result<Tensor> {
        let pixels = image::load(path).map_err(|e| Error::data(path, e.to_string()))?;
        let (height, width) = match size {
            Some(size) => (size, size),
            None => {
                let shape = pixels.size();
                (shape[1] / 4 * 4, shape[2] / 4 * 4)
            }
        };
        if height == 0 || width == 0 {
            return Err(Error::data(path, "image is smaller than 4x4"));
        }

        let pixels = image::resize(&pixels, width, height).map_err(|e| Error::data(path, e.to_string()))?;
        let stylized = self.stylize(&normalize(&pixels).unsqueeze(0));
        Ok(stylized.squeeze_dim(0))
    }

    /// Stylize every image in `input`, writing `<stem>.png` files through `sink`
    ///
    /// Unreadable images are skipped with a warning. Returns the number written.
    pub fn stylize_dir<V: SampleSink>(
        &self,
        input: &Path,
        output: &Path,
        size: Option<i64>,
        sink: &V,
    ) -> Result<usize> {
        if !input.is_dir() {
            return Err(Error::data(input, "input directory does not exist"));
        }

        let mut written = 0;
        for path in list_images(input)? {
            let stylized = match self.stylize_file(&path, size) {
                Ok(stylized) => stylized,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| written.to_string());
            sink.save(&stylized, &output.join(format!("{stem}.png")))?;
            written += 1;
        }

        info!("Stylized {} images into {}", written, output.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{FsCheckpointStore, PngSink};
    use tch::Kind;

    fn tiny() -> GeneratorConfig {
        GeneratorConfig {
            features: 4,
            residual_blocks: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_stylize_shape() {
        let stylizer = Stylizer::new(tiny(), &ComputeContext::cpu());
        let images = Tensor::rand([2, 3, 8, 8], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
        assert_eq!(stylizer.stylize(&images).size(), vec![2, 3, 8, 8]);
    }

    #[test]
    fn test_stylize_dir_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photos");
        let output = dir.path().join("cartoons");
        std::fs::create_dir_all(&input).unwrap();
        let pixels = Tensor::full([3, 10, 14], 90, (Kind::Uint8, Device::Cpu));
        image::save(&pixels, input.join("street.png")).unwrap();

        let weights = dir.path().join("generator_param.pt");
        let trained = Stylizer::new(tiny(), &ComputeContext::cpu());
        FsCheckpointStore.save(&trained.vs, &weights).unwrap();

        let stylizer =
            Stylizer::load(tiny(), &ComputeContext::cpu(), &FsCheckpointStore, &weights).unwrap();
        let written = stylizer.stylize_dir(&input, &output, None, &PngSink).unwrap();
        assert_eq!(written, 1);

        let saved = image::load(output.join("street.png")).unwrap();
        // 10x14 rounds down to 8x12
        assert_eq!(saved.size(), vec![3, 8, 12]);
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let result = Stylizer::load(
            tiny(),
            &ComputeContext::cpu(),
            &FsCheckpointStore,
            Path::new("/missing/generator_param.pt"),
        );
        assert!(matches!(result, Err(Error::Checkpoint { .. })));
    }
}
