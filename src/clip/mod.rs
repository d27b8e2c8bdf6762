//! CLIP (Contrastive Language-Image Pre-training) image embeddings
//!
//! The vision tower runs frozen, inference only, one image per call.

mod model;
mod preprocess;

pub use model::ClipVisionEncoder;
pub use preprocess::{preprocess, INPUT_SIZE};

use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::Path;

/// Pooled feature vector. Its length is whatever the model's `[1, D]` output
/// holds: 768 for ViT-B/32 `pooler_output`, 512 for projected image embeds.
pub type Embedding = Vec<f32>;

/// Anything that turns one image into one fixed-length feature vector.
pub trait ImageEncoder {
    fn encode(&mut self, img: &DynamicImage) -> Result<Embedding>;
}

/// Open and decode an image file.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).with_context(|| format!("Failed to load image {}", path.display()))
}
