//! Image datasets stored as directories on disk
//!
//! A split is a directory `root/<split>`. Images placed directly in it form a
//! single class; otherwise every sub-directory is a class, labelled by its
//! index in sorted order. Only file paths are kept; pixels are decoded one
//! batch at a time.

use std::path::{Path, PathBuf};

use tch::{vision::image, Kind, Tensor};
use tracing::{debug, info};

use crate::error::{Error, Result};

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// Returns true if the path looks like an image file
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by name
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Map u8 pixels to floats in [-1, 1]
pub fn normalize(pixels: &Tensor) -> Tensor {
    pixels.to_kind(Kind::Float) / 127.5 - 1.0
}

/// Load an image as a (3, height, width) tensor in [-1, 1]
pub fn load_image(path: &Path, height: i64, width: i64) -> Result<Tensor> {
    let pixels = image::load(path).map_err(|e| Error::data(path, e.to_string()))?;
    let pixels = image::resize(&pixels, width, height).map_err(|e| Error::data(path, e.to_string()))?;
    Ok(normalize(&pixels))
}

/// Image files of a directory with their class labels
///
/// Images placed directly in `dir` form one class named after it; otherwise
/// every non-empty sub-directory is a class. Returns (classes, entries).
pub(crate) fn discover(dir: &Path) -> Result<(Vec<String>, Vec<(PathBuf, i64)>)> {
    let mut entries: Vec<(PathBuf, i64)> = Vec::new();
    let mut classes = Vec::new();
    let name_of = |p: &Path| {
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    };

    let direct = list_images(dir)?;
    if !direct.is_empty() {
        classes.push(name_of(dir));
        entries.extend(direct.into_iter().map(|p| (p, 0)));
        return Ok((classes, entries));
    }

    let mut subdirs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    subdirs.sort();

    for sub in subdirs {
        let files = list_images(&sub)?;
        if files.is_empty() {
            continue;
        }
        let label = classes.len() as i64;
        classes.push(name_of(&sub));
        entries.extend(files.into_iter().map(|p| (p, label)));
    }
    Ok((classes, entries))
}

/// Index of one split's image files; pixels are decoded only per batch
#[derive(Debug, Clone)]
pub struct ImageFolder {
    classes: Vec<String>,
    entries: Vec<(PathBuf, i64)>,
    height: i64,
    width: i64,
}

impl ImageFolder {
    /// Index `root/split`; batches are resized to `height` x `width`
    ///
    /// # Arguments
    ///
    /// * `root` - Dataset root
    /// * `split` - Split directory name (e.g. "train", "pair", "test")
    /// * `height` - Output image height
    /// * `width` - Output image width
    pub fn open(root: &Path, split: &str, height: i64, width: i64) -> Result<Self> {
        let dir = root.join(split);
        if !dir.is_dir() {
            return Err(Error::data(&dir, "split directory does not exist"));
        }

        let (classes, entries) = discover(&dir)?;
        if entries.is_empty() {
            return Err(Error::data(&dir, "no images found"));
        }

        info!(
            "Found {} images ({} classes) in {}",
            entries.len(),
            classes.len(),
            dir.display()
        );

        Ok(Self {
            classes,
            entries,
            height,
            width,
        })
    }

    /// Square images of side `size`
    pub fn open_square(root: &Path, split: &str, size: i64) -> Result<Self> {
        Self::open(root, split, size, size)
    }

    /// [cartoon | edge-smoothed] pairs: `size` high and `2 * size` wide
    pub fn open_pairs(root: &Path, split: &str, size: i64) -> Result<Self> {
        Self::open(root, split, size, 2 * size)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Class names, indexed by label
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Decode the samples at `indices` into an (images, labels) batch
    pub fn load_batch(&self, indices: &[i64]) -> Result<(Tensor, Tensor)> {
        let mut images = Vec::with_capacity(indices.len());
        let mut labels = Vec::with_capacity(indices.len());
        for &index in indices {
            let (path, label) = &self.entries[index as usize];
            debug!("Loading {}", path.display());
            images.push(load_image(path, self.height, self.width)?);
            labels.push(*label);
        }
        Ok((Tensor::stack(&images, 0), Tensor::from_slice(&labels)))
    }
}

/// Split a batch of [cartoon | edge-smoothed] pairs into its two halves
///
/// The pair image is cut at column `size`.
pub fn split_pair(pairs: &Tensor, size: i64) -> Result<(Tensor, Tensor)> {
    let shape = pairs.size();
    if shape.len() != 4 || shape[3] != 2 * size {
        return Err(Error::Config(format!(
            "expected pair batch of width {}, got shape {:?}",
            2 * size,
            shape
        )));
    }
    Ok((pairs.narrow(3, 0, size), pairs.narrow(3, size, size)))
}
