//! DataLoader for batching and iterating over image sets
//!
//! Provides batching for GAN training with support for:
//! - Random shuffling
//! - Drop last incomplete batch
//! - Restartable iteration over (images, labels) batches
//!
//! Folder-backed loaders decode only the images of the batch being served.

use rand::seq::SliceRandom;
use tch::{Device, Kind, Tensor};

use super::image_folder::ImageFolder;
use crate::error::Result;

/// Where batches come from
#[derive(Debug)]
enum Samples {
    /// Images (N, C, H, W) and labels (N) already in memory
    Tensors { images: Tensor, labels: Tensor },
    /// Image files decoded per batch
    Folder(ImageFolder),
}

impl Samples {
    fn len(&self) -> usize {
        match self {
            Samples::Tensors { images, .. } => images.size()[0] as usize,
            Samples::Folder(folder) => folder.len(),
        }
    }

    fn batch(&self, indices: &[i64]) -> Result<(Tensor, Tensor)> {
        match self {
            Samples::Tensors { images, labels } => {
                let index = Tensor::from_slice(indices);
                Ok((images.index_select(0, &index), labels.index_select(0, &index)))
            }
            Samples::Folder(folder) => folder.load_batch(indices),
        }
    }
}

/// DataLoader over an image set
#[derive(Debug)]
pub struct DataLoader {
    samples: Samples,
    /// Batch size
    batch_size: usize,
    /// Whether to shuffle data each epoch
    shuffle: bool,
    /// Whether to drop the last incomplete batch
    drop_last: bool,
    /// Current indices for iteration
    indices: Vec<i64>,
    /// Current position in iteration
    current_idx: usize,
}

impl DataLoader {
    fn with_samples(samples: Samples, batch_size: usize, shuffle: bool, drop_last: bool) -> Self {
        let indices: Vec<i64> = (0..samples.len() as i64).collect();

        let mut loader = Self {
            samples,
            batch_size: batch_size.max(1),
            shuffle,
            drop_last,
            indices,
            current_idx: 0,
        };

        if shuffle {
            loader.shuffle_indices();
        }

        loader
    }

    /// Create a new DataLoader over in-memory images
    ///
    /// # Arguments
    ///
    /// * `images` - Tensor of shape (N, C, H, W)
    /// * `labels` - Tensor of shape (N)
    /// * `batch_size` - Number of images per batch
    /// * `shuffle` - Whether to shuffle data each epoch
    /// * `drop_last` - Whether to drop incomplete final batch
    pub fn new(images: Tensor, labels: Tensor, batch_size: usize, shuffle: bool, drop_last: bool) -> Self {
        Self::with_samples(Samples::Tensors { images, labels }, batch_size, shuffle, drop_last)
    }

    /// Loader that reads a folder's images batch by batch
    pub fn from_folder(folder: ImageFolder, batch_size: usize, shuffle: bool, drop_last: bool) -> Self {
        Self::with_samples(Samples::Folder(folder), batch_size, shuffle, drop_last)
    }

    /// Loader over unlabelled images (every label is 0)
    pub fn unlabelled(images: Tensor, batch_size: usize, shuffle: bool, drop_last: bool) -> Self {
        let labels = Tensor::zeros([images.size()[0]], (Kind::Int64, Device::Cpu));
        Self::new(images, labels, batch_size, shuffle, drop_last)
    }

    /// Get the number of batches per epoch
    pub fn num_batches(&self) -> usize {
        let num_samples = self.num_samples();
        if self.drop_last {
            num_samples / self.batch_size
        } else {
            (num_samples + self.batch_size - 1) / self.batch_size
        }
    }

    /// Get total number of samples
    pub fn num_samples(&self) -> usize {
        self.indices.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Shuffle indices for a new epoch
    fn shuffle_indices(&mut self) {
        let mut rng = rand::thread_rng();
        self.indices.shuffle(&mut rng);
    }

    /// Reset for new epoch
    pub fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            self.shuffle_indices();
        }
    }

    /// Get next (images, labels) batch
    ///
    /// Returns None when epoch is complete. A batch whose files cannot be
    /// decoded is an error; iteration moves past it.
    pub fn next_batch(&mut self) -> Option<Result<(Tensor, Tensor)>> {
        let num_samples = self.indices.len();
        let start = self.current_idx;

        if start >= num_samples {
            return None;
        }

        let end = (start + self.batch_size).min(num_samples);

        // Skip incomplete batch if drop_last
        if self.drop_last && end - start < self.batch_size {
            return None;
        }

        self.current_idx = end;
        Some(self.samples.batch(&self.indices[start..end]))
    }

    /// Iterate over all batches of a fresh epoch
    pub fn iter(&mut self) -> DataLoaderIter<'_> {
        self.reset();
        DataLoaderIter { loader: self }
    }
}

/// Iterator adapter for DataLoader
pub struct DataLoaderIter<'a> {
    loader: &'a mut DataLoader,
}

impl<'a> Iterator for DataLoaderIter<'a> {
    type Item = Result<(Tensor, Tensor)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.loader.next_batch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tch::vision::image;

    fn images(n: i64) -> Tensor {
        Tensor::arange(n, (Kind::Float, Device::Cpu))
            .view([n, 1, 1, 1])
            .expand([n, 3, 4, 4], false)
            .contiguous()
    }

    fn write_folder(dir: &std::path::Path, count: i64) {
        std::fs::create_dir_all(dir).unwrap();
        for i in 0..count {
            let pixels = Tensor::full([3, 6, 6], i * 50, (Kind::Uint8, Device::Cpu));
            image::save(&pixels, dir.join(format!("{i}.png"))).unwrap();
        }
    }

    #[test]
    fn test_dataloader_basic() {
        let mut loader = DataLoader::unlabelled(images(10), 3, false, false);

        assert_eq!(loader.num_batches(), 4); // ceil(10/3) = 4
        assert_eq!(loader.num_samples(), 10);

        let mut batch_count = 0;
        while let Some(batch) = loader.next_batch() {
            let (batch, labels) = batch.unwrap();
            batch_count += 1;
            let expected = if batch_count < 4 { 3 } else { 1 };
            assert_eq!(batch.size(), vec![expected, 3, 4, 4]);
            assert_eq!(labels.size(), vec![expected]);
        }
        assert_eq!(batch_count, 4);
    }

    #[test]
    fn test_dataloader_drop_last() {
        let mut loader = DataLoader::unlabelled(images(10), 3, false, true);

        assert_eq!(loader.num_batches(), 3); // floor(10/3) = 3

        let batches: Vec<(Tensor, Tensor)> = loader.iter().collect::<Result<_>>().unwrap();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|(b, _)| b.size()[0] == 3));
    }

    #[test]
    fn test_dataloader_iter_restarts() {
        let mut loader = DataLoader::unlabelled(images(10), 5, false, true);

        assert_eq!(loader.iter().count(), 2);
        assert_eq!(loader.iter().count(), 2);
    }

    #[test]
    fn test_shuffle_keeps_every_sample() {
        let mut loader = DataLoader::unlabelled(images(8), 8, true, false);
        let (batch, _) = loader.iter().next().unwrap().unwrap();

        let mut ids: Vec<f32> = Vec::<f32>::try_from(batch.select(1, 0).select(1, 0).select(1, 0)).unwrap();
        ids.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(ids, (0..8).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_labels_follow_images() {
        let labels = Tensor::from_slice(&[0i64, 1, 2, 3]);
        let mut loader = DataLoader::new(images(4), labels, 2, true, false);

        for batch in loader.iter() {
            let (batch, labels) = batch.unwrap();
            let ids = Vec::<f32>::try_from(batch.select(1, 0).select(1, 0).select(1, 0)).unwrap();
            let labels = Vec::<i64>::try_from(labels).unwrap();
            let ids: Vec<i64> = ids.into_iter().map(|v| v as i64).collect();
            assert_eq!(ids, labels);
        }
    }

    #[test]
    fn test_folder_loader_decodes_per_batch() {
        let dir = tempfile::tempdir().unwrap();
        let split = dir.path().join("train");
        write_folder(&split, 5);

        let folder = ImageFolder::open_square(dir.path(), "train", 4).unwrap();
        let mut loader = DataLoader::from_folder(folder, 2, false, false);
        assert_eq!(loader.num_samples(), 5);
        assert_eq!(loader.num_batches(), 3);

        let sizes: Vec<i64> = loader
            .iter()
            .map(|batch| batch.unwrap().0.size()[0])
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);

        // files changed after the loader was built are seen on the next epoch
        let white = Tensor::full([3, 6, 6], 255, (Kind::Uint8, Device::Cpu));
        image::save(&white, split.join("0.png")).unwrap();
        let (first, _) = loader.iter().next().unwrap().unwrap();
        assert!((first.get(0).min().double_value(&[]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unreadable_file_fails_only_its_batch() {
        let dir = tempfile::tempdir().unwrap();
        let split = dir.path().join("train");
        write_folder(&split, 4);
        std::fs::write(split.join("3.png"), "not a png").unwrap();

        let folder = ImageFolder::open_square(dir.path(), "train", 4).unwrap();
        let mut loader = DataLoader::from_folder(folder, 2, false, true);

        let results: Vec<_> = loader.iter().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Data { .. })));
    }
}
