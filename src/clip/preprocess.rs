//! CLIP image preprocessing: shortest-side resize, centre crop, normalise.

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;

/// CLIP input resolution for ViT-B/32.
pub const INPUT_SIZE: u32 = 224;

// CLIP normalisation constants
const MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Dimensions after scaling the shortest side to `target`.
fn shortest_side_size(width: u32, height: u32, target: u32) -> (u32, u32) {
    if width <= height {
        let long = (height as u64 * target as u64 / width.max(1) as u64) as u32;
        (target, long.max(target))
    } else {
        let long = (width as u64 * target as u64 / height.max(1) as u64) as u32;
        (long.max(target), target)
    }
}

/// Convert an image into a normalised `[1, 3, 224, 224]` NCHW tensor.
pub fn preprocess(img: &DynamicImage) -> Array4<f32> {
    let (width, height) = img.dimensions();
    let (resized_w, resized_h) = shortest_side_size(width, height, INPUT_SIZE);

    let resized = img.resize_exact(resized_w, resized_h, FilterType::CatmullRom);
    let left = (resized_w - INPUT_SIZE) / 2;
    let top = (resized_h - INPUT_SIZE) / 2;
    let cropped = resized.crop_imm(left, top, INPUT_SIZE, INPUT_SIZE);
    let rgb = cropped.to_rgb8();

    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                ((pixel[c] as f32 / 255.0) - MEAN[c]) / STD[c];
        }
    }

    tensor
}
