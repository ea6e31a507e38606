//! Data module for loading and preparing image datasets
//!
//! This module provides:
//! - Image folders loaded from disk and normalized to [-1, 1]
//! - DataLoader for batching images
//! - Edge promotion for building [cartoon | edge-smoothed] pairs

pub mod edge;
mod image_folder;
mod loader;

pub use edge::{edge_promote, edge_promote_dir, needs_edge_promotion};
pub use image_folder::{is_image, list_images, load_image, normalize, split_pair, ImageFolder};
pub use loader::{DataLoader, DataLoaderIter};
