//! Image preprocessing for the letter model
//!
//! Handles decoding, resizing, normalization, and tensor conversion.

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use ndarray::{Array3, Array4, Axis};
use serde::{Deserialize, Serialize};

use super::PredictError;

/// Input normalization applied to 0-255 pixel values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// EfficientNet graphs rescale internally, so pixels pass through unchanged
    #[default]
    #[serde(rename = "efficientnet")]
    EfficientNet,
    /// pixel / 255
    Scale01,
    /// pixel / 127.5 - 1, maps [0, 255] -> [-1, 1]
    Symmetric,
    /// (pixel / 255 - mean) / std with ImageNet statistics
    #[serde(rename = "imagenet")]
    ImageNet,
}

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

impl Normalization {
    /// Normalize one channel value
    #[inline]
    pub fn apply(self, value: f32, channel: usize) -> f32 {
        match self {
            Normalization::EfficientNet => value,
            Normalization::Scale01 => value / 255.0,
            Normalization::Symmetric => value / 127.5 - 1.0,
            Normalization::ImageNet => {
                (value / 255.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]
            }
        }
    }
}

/// Preprocessing configuration
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Model input width
    pub width: u32,
    /// Model input height
    pub height: u32,
    /// Normalization applied after the f32 cast
    pub normalization: Normalization,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
            normalization: Normalization::EfficientNet,
        }
    }
}

/// Decode an uploaded byte stream, guessing the format from its contents
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, PredictError> {
    image::load_from_memory(bytes).map_err(PredictError::Decode)
}

/// Convert to RGB and resize to exactly `width` x `height` (no aspect preservation)
pub fn resize_rgb(image: &DynamicImage, width: u32, height: u32) -> RgbImage {
    let rgb = image.to_rgb8();
    if rgb.dimensions() == (width, height) {
        return rgb;
    }
    image::imageops::resize(&rgb, width, height, FilterType::Triangle)
}

/// Convert an RGB image to an HWC f32 array with values in 0-255
pub fn rgb_to_f32(image: &RgbImage) -> Array3<f32> {
    let (w, h) = image.dimensions();
    Array3::from_shape_fn((h as usize, w as usize, 3), |(y, x, c)| {
        image.get_pixel(x as u32, y as u32)[c] as f32
    })
}

/// Normalize an HWC array in place
pub fn normalize(image: &mut Array3<f32>, normalization: Normalization) {
    if normalization == Normalization::EfficientNet {
        return;
    }
    for ((_, _, c), value) in image.indexed_iter_mut() {
        *value = normalization.apply(*value, c);
    }
}

/// Full preprocessing pipeline: NHWC tensor with batch size 1
pub fn preprocess(image: &DynamicImage, config: &PreprocessConfig) -> Array4<f32> {
    // 1. RGB + resize
    let resized = resize_rgb(image, config.width, config.height);

    // 2. Cast to f32
    let mut hwc = rgb_to_f32(&resized);

    // 3. Normalize (per element, so it commutes with the batch axis)
    normalize(&mut hwc, config.normalization);

    // 4. Batch dimension
    hwc.insert_axis(Axis(0))
}
