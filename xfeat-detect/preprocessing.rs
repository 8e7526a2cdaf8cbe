use rayon::prelude::*;
use xfeat_core::Tensor4;

use crate::error::{DetectError, DetectResult};
use crate::types::ImageFrame;

/// Backbone inputs must be a multiple of this in both dimensions.
pub const INPUT_MULTIPLE: usize = 32;

/// Resizing of image batches ahead of the backbone
pub struct ImagePreprocessing;

impl ImagePreprocessing {
    /// Resize so both dimensions are multiples of 32 (rounded down).
    ///
    /// Returns the resized batch and the frame recording the original /
    /// resized ratios. Inputs already aligned are returned unchanged.
    pub fn preprocess(images: &Tensor4) -> DetectResult<(Tensor4, ImageFrame)> {
        let (h, w) = (images.height(), images.width());
        if h == 0 || w == 0 {
            return Err(DetectError::InvalidImageSize { width: w, height: h });
        }
        let (target_h, target_w) = (
            (h / INPUT_MULTIPLE) * INPUT_MULTIPLE,
            (w / INPUT_MULTIPLE) * INPUT_MULTIPLE,
        );
        if target_h == 0 || target_w == 0 {
            return Err(DetectError::ImageTooSmall {
                width: w,
                height: h,
                min_size: INPUT_MULTIPLE,
            });
        }

        let frame = ImageFrame {
            height: target_h,
            width: target_w,
            rh: h as f32 / target_h as f32,
            rw: w as f32 / target_w as f32,
        };
        if target_h == h && target_w == w {
            return Ok((images.clone(), frame));
        }
        log::debug!("resizing input {}x{} -> {}x{}", w, h, target_w, target_h);
        Ok((Self::resize_bilinear(images, target_h, target_w)?, frame))
    }

    /// Resize by a scale factor; output size is `floor(dim * factor)`.
    ///
    /// Source positions step by `1 / factor` rather than by the ratio of the
    /// rounded sizes.
    pub fn resize_by_factor(images: &Tensor4, factor: f32) -> DetectResult<Tensor4> {
        let out_h = scaled_len(images.height(), factor);
        let out_w = scaled_len(images.width(), factor);
        let step = 1.0 / factor;
        Self::resize_with_steps(images, out_h, out_w, step, step)
    }

    /// Bilinear resize of every plane with half-pixel centers.
    pub fn resize_bilinear(images: &Tensor4, out_h: usize, out_w: usize) -> DetectResult<Tensor4> {
        let (in_h, in_w) = (images.height(), images.width());
        if out_h == 0 || out_w == 0 || in_h == 0 || in_w == 0 {
            return Err(DetectError::InvalidImageSize { width: out_w, height: out_h });
        }
        let step_y = in_h as f32 / out_h as f32;
        let step_x = in_w as f32 / out_w as f32;
        Self::resize_with_steps(images, out_h, out_w, step_y, step_x)
    }

    fn resize_with_steps(
        images: &Tensor4,
        out_h: usize,
        out_w: usize,
        step_y: f32,
        step_x: f32,
    ) -> DetectResult<Tensor4> {
        let [b_n, c_n, in_h, in_w] = images.shape();
        if out_h == 0 || out_w == 0 || in_h == 0 || in_w == 0 {
            return Err(DetectError::InvalidImageSize { width: out_w, height: out_h });
        }
        if out_h == in_h && out_w == in_w && step_y == 1.0 && step_x == 1.0 {
            return Ok(images.clone());
        }

        let xs = source_taps(in_w, out_w, step_x);
        let ys = source_taps(in_h, out_h, step_y);
        let mut out = Tensor4::zeros([b_n, c_n, out_h, out_w]);
        out.data_mut()
            .par_chunks_mut(out_h * out_w)
            .enumerate()
            .for_each(|(plane_idx, dst)| {
                let src = images.plane(plane_idx / c_n, plane_idx % c_n);
                for (y, &(y0, y1, fy)) in ys.iter().enumerate() {
                    let row0 = &src[y0 * in_w..(y0 + 1) * in_w];
                    let row1 = &src[y1 * in_w..(y1 + 1) * in_w];
                    for (x, &(x0, x1, fx)) in xs.iter().enumerate() {
                        let top = row0[x0] * (1.0 - fx) + row0[x1] * fx;
                        let bottom = row1[x0] * (1.0 - fx) + row1[x1] * fx;
                        dst[y * out_w + x] = top * (1.0 - fy) + bottom * fy;
                    }
                }
            });
        Ok(out)
    }
}

/// `floor(len * factor)`, tolerant to the f32 representation of `factor`
/// (`1.3f32` is slightly below 1.3).
pub fn scaled_len(len: usize, factor: f32) -> usize {
    let scaled = len as f64 * factor as f64;
    (scaled * (1.0 + 1e-6)).floor() as usize
}

/// Per output index: lower tap, upper tap and weight of the upper tap.
fn source_taps(in_len: usize, out_len: usize, step: f32) -> Vec<(usize, usize, f32)> {
    (0..out_len)
        .map(|d| {
            let src = ((d as f32 + 0.5) * step - 0.5).max(0.0);
            let i0 = (src.floor() as usize).min(in_len - 1);
            let i1 = (i0 + 1).min(in_len - 1);
            (i0, i1, src - i0 as f32)
        })
        .collect()
}
