//! Edge promotion: build [cartoon | edge-smoothed] training pairs
//!
//! Cartoons have crisp edges. Blurring only the edge regions of a cartoon
//! produces a hard negative for the discriminator.

use std::path::Path;

use tch::{vision::image, Device, Kind, Tensor};
use tracing::{info, warn};

use super::image_folder::{discover, list_images};
use crate::error::{Error, Result};

/// Sobel magnitude (on 0..255 luma) above which a pixel counts as an edge
pub const EDGE_THRESHOLD: f64 = 100.0;

const KERNEL_SIZE: i64 = 5;

/// Sigma of a 5x5 Gaussian when derived from the kernel size
const GAUSSIAN_SIGMA: f64 = 1.1;

fn sobel_kernels() -> (Tensor, Tensor) {
    let gx = Tensor::from_slice(&[-1.0f32, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0]).view([1, 1, 3, 3]);
    let gy = gx.transpose(2, 3).contiguous();
    (gx, gy)
}

/// Normalized 5x5 Gaussian, one copy per channel for a grouped convolution
fn gaussian_kernel(channels: i64) -> Tensor {
    let half = KERNEL_SIZE / 2;
    let taps: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f64) / (2.0 * GAUSSIAN_SIGMA * GAUSSIAN_SIGMA)).exp() as f32)
        .collect();
    let taps = Tensor::from_slice(&taps);
    let taps = &taps / taps.sum(Kind::Float);

    taps.outer(&taps)
        .view([1, 1, KERNEL_SIZE, KERNEL_SIZE])
        .repeat([channels, 1, 1, 1])
}

/// Dilated edge mask of a (1, 3, H, W) float image in 0..255, shape (1, 1, H, W)
pub fn edge_mask(image: &Tensor) -> Tensor {
    let weights = Tensor::from_slice(&[0.299f32, 0.587, 0.114]).view([1, 3, 1, 1]);
    let luma = (image * weights).sum_dim_intlist(&[1i64][..], true, Kind::Float);
    let padded = luma.replication_pad2d([1, 1, 1, 1]);

    let (gx, gy) = sobel_kernels();
    let dx = padded.conv2d::<Tensor>(&gx, None, [1, 1], [0, 0], [1, 1], 1);
    let dy = padded.conv2d::<Tensor>(&gy, None, [1, 1], [0, 0], [1, 1], 1);
    let magnitude = (&dx * &dx + &dy * &dy).sqrt();

    let pad = KERNEL_SIZE / 2;
    magnitude
        .gt(EDGE_THRESHOLD)
        .to_kind(Kind::Float)
        .max_pool2d([KERNEL_SIZE, KERNEL_SIZE], [1, 1], [pad, pad], [1, 1], false)
}

/// Edge-promote one u8 RGB image
///
/// Returns a u8 (3, size, 2 * size) image holding the resized original on the
/// left and its edge-smoothed copy on the right.
pub fn edge_promote(pixels: &Tensor, size: i64) -> Result<Tensor> {
    let resized = image::resize(pixels, size, size)?;
    let rgb = resized
        .to_device(Device::Cpu)
        .to_kind(Kind::Float)
        .unsqueeze(0);

    let pad = KERNEL_SIZE / 2;
    let blurred = rgb
        .reflection_pad2d([pad, pad, pad, pad])
        .conv2d::<Tensor>(&gaussian_kernel(3), None, [1, 1], [0, 0], [1, 1], 3);

    let mask = edge_mask(&rgb);
    let smoothed = &mask * &blurred + (mask.ones_like() - &mask) * &rgb;

    let pair = Tensor::cat(&[&rgb, &smoothed], 3)
        .squeeze_dim(0)
        .round()
        .clamp(0.0, 255.0)
        .to_kind(Kind::Uint8);
    Ok(pair)
}

/// Edge-promote every image in `input`, writing `1.png`, `2.png`, ... to `output`
///
/// Returns the number of pairs written.
pub fn edge_promote_dir(input: &Path, output: &Path, size: i64) -> Result<usize> {
    if !input.is_dir() {
        return Err(Error::data(input, "cartoon directory does not exist"));
    }
    let files = list_images(input)?;
    if files.is_empty() {
        return Err(Error::data(input, "no images found"));
    }

    std::fs::create_dir_all(output)?;
    info!(
        "Edge-promoting {} images from {} into {}",
        files.len(),
        input.display(),
        output.display()
    );

    let mut written = 0;
    for path in &files {
        let pixels = match image::load(path) {
            Ok(pixels) => pixels,
            Err(e) => {
                warn!("Skipping unreadable image {}: {}", path.display(), e);
                continue;
            }
        };
        let pair = edge_promote(&pixels, size)?;
        written += 1;
        image::save(&pair, output.join(format!("{written}.png")))?;
    }

    info!("Edge-promoting finished: {} pairs", written);
    Ok(written)
}

/// True when `dir` is missing or would load as an empty split
///
/// Uses the same discovery as the dataset loader, so pairs kept in class
/// sub-directories count as present.
pub fn needs_edge_promotion(dir: &Path) -> bool {
    !dir.is_dir()
        || discover(dir)
            .map(|(_, entries)| entries.is_empty())
            .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_image(size: i64) -> Tensor {
        // black background with a white square in the middle
        let pixels = Tensor::zeros([3, size, size], (Kind::Uint8, Device::Cpu));
        let q = size / 4;
        let _ = pixels.narrow(1, q, 2 * q).narrow(2, q, 2 * q).fill_(255);
        pixels
    }

    #[test]
    fn test_flat_image_has_no_edges() {
        let flat = Tensor::full([1, 3, 16, 16], 128.0, (Kind::Float, Device::Cpu));
        let mask = edge_mask(&flat);
        assert_eq!(mask.size(), vec![1, 1, 16, 16]);
        assert_eq!(mask.sum(Kind::Float).double_value(&[]), 0.0);
    }

    #[test]
    fn test_mask_covers_square_border() {
        let rgb = square_image(32).to_kind(Kind::Float).unsqueeze(0);
        let mask = edge_mask(&rgb);

        // border of the square is an edge, far corner is not
        assert_eq!(mask.double_value(&[0, 0, 8, 16]), 1.0);
        assert_eq!(mask.double_value(&[0, 0, 0, 0]), 0.0);
    }

    #[test]
    fn test_edge_promote_pair_layout() {
        let pair = edge_promote(&square_image(32), 16).unwrap();
        assert_eq!(pair.size(), vec![3, 16, 32]);
        assert_eq!(pair.kind(), Kind::Uint8);

        let original = pair.narrow(2, 0, 16);
        let smoothed = pair.narrow(2, 16, 16);
        // flat regions are untouched, edges are blurred
        assert_eq!(original.int64_value(&[0, 0, 0]), smoothed.int64_value(&[0, 0, 0]));
        assert!(!original.equal(&smoothed));
    }

    #[test]
    fn test_edge_promote_dir() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("train");
        let output = dir.path().join("pair");
        std::fs::create_dir_all(&input).unwrap();
        image::save(&square_image(24), input.join("a.png")).unwrap();
        image::save(&square_image(24), input.join("b.png")).unwrap();

        assert!(needs_edge_promotion(&output));
        let written = edge_promote_dir(&input, &output, 16).unwrap();
        assert_eq!(written, 2);
        assert!(output.join("1.png").exists());
        assert!(output.join("2.png").exists());
        assert!(!needs_edge_promotion(&output));

        let pair = image::load(output.join("1.png")).unwrap();
        assert_eq!(pair.size(), vec![3, 16, 32]);
    }

    #[test]
    fn test_pairs_in_class_subdirectory_are_found() {
        let dir = tempfile::tempdir().unwrap();
        let pair_dir = dir.path().join("pair");
        let class = pair_dir.join("ghibli");
        std::fs::create_dir_all(&class).unwrap();
        assert!(needs_edge_promotion(&pair_dir));

        let pair = edge_promote(&square_image(24), 8).unwrap();
        image::save(&pair, class.join("1.png")).unwrap();
        assert!(!needs_edge_promotion(&pair_dir));
    }

    #[test]
    fn test_edge_promote_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = edge_promote_dir(&dir.path().join("nope"), dir.path(), 16).unwrap_err();
        assert!(matches!(err, Error::Data { .. }));
    }
}
