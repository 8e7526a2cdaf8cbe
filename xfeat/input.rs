use std::path::Path;

use image::{DynamicImage, GenericImageView, ImageReader};
use xfeat_core::Tensor4;

use crate::error::{XFeatError, XFeatResult};

/// Channel layout of converted images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    /// Single luminance channel
    #[default]
    Gray,
    Rgb,
}

impl ColorMode {
    pub fn channels(self) -> usize {
        match self {
            ColorMode::Gray => 1,
            ColorMode::Rgb => 3,
        }
    }
}

/// Decode an image file
pub fn load_image<P: AsRef<Path>>(path: P) -> XFeatResult<DynamicImage> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
}

/// Convert one image into a `[1, C, H, W]` tensor with values in `[0, 1]`.
pub fn image_to_tensor(img: &DynamicImage, mode: ColorMode) -> XFeatResult<Tensor4> {
    images_to_tensor(std::slice::from_ref(img), mode)
}

/// Stack equally sized images into a `[B, C, H, W]` tensor in `[0, 1]`.
pub fn images_to_tensor(images: &[DynamicImage], mode: ColorMode) -> XFeatResult<Tensor4> {
    let Some(first) = images.first() else {
        return Err(XFeatError::BatchSize { expected: 1, actual: 0 });
    };
    let (w, h) = first.dimensions();
    let channels = mode.channels();
    let plane = (w as usize) * (h as usize);
    let mut data = Vec::with_capacity(images.len() * channels * plane);

    for (index, img) in images.iter().enumerate() {
        if img.dimensions() != (w, h) {
            return Err(XFeatError::InputSizeMismatch {
                index,
                expected: (w, h),
                actual: img.dimensions(),
            });
        }
        match mode {
            ColorMode::Gray => {
                let luma = img.to_luma8();
                data.extend(luma.as_raw().iter().map(|&v| v as f32 / 255.0));
            }
            ColorMode::Rgb => {
                let rgb = img.to_rgb8();
                let raw = rgb.as_raw();
                for c in 0..3 {
                    data.extend(raw.iter().skip(c).step_by(3).map(|&v| v as f32 / 255.0));
                }
            }
        }
    }

    Ok(Tensor4::from_vec([images.len(), channels, h as usize, w as usize], data)?)
}
