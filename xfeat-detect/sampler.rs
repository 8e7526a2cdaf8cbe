//! Sampling of dense maps at real-valued keypoint locations.
//!
//! Keypoints live in pixel coordinates of an extraction frame of size
//! `(H, W)` (pixel centers at integer positions). They are first normalized to
//! the `[-1, 1]` grid of that frame, then mapped onto the target map with
//! `align_corners = false` semantics, so a map at a coarser resolution is
//! sampled at the geometrically corresponding location. Reads outside the map
//! are clamped to the border.

use rayon::prelude::*;
use xfeat_core::{descriptor_from_slice, Descriptor, Tensor4, DESCRIPTOR_DIM};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{DetectError, DetectResult};

/// Bicubic convolution coefficient, as in common tensor libraries
const CUBIC_A: f32 = -0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InterpolationMode {
    Nearest,
    Bilinear,
    Bicubic,
}

/// Grid sampler with a fixed interpolation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorSampler {
    mode: InterpolationMode,
}

impl DescriptorSampler {
    pub fn new(mode: InterpolationMode) -> Self {
        Self { mode }
    }

    pub fn nearest() -> Self {
        Self::new(InterpolationMode::Nearest)
    }

    pub fn bilinear() -> Self {
        Self::new(InterpolationMode::Bilinear)
    }

    pub fn bicubic() -> Self {
        Self::new(InterpolationMode::Bicubic)
    }

    pub fn mode(&self) -> InterpolationMode {
        self.mode
    }

    /// Sample `map [B, C, h, w]` at per-image positions given in an
    /// `height x width` frame. Returns `[B][N * C]` row-major values.
    pub fn sample(
        &self,
        map: &Tensor4,
        positions: &[Vec<[f32; 2]>],
        height: usize,
        width: usize,
    ) -> DetectResult<Vec<Vec<f32>>> {
        if positions.len() != map.batch() {
            return Err(DetectError::BatchMismatch {
                what: "sample positions",
                expected: map.batch(),
                actual: positions.len(),
            });
        }
        if height == 0 || width == 0 {
            return Err(DetectError::InvalidImageSize { width, height });
        }
        let channels = map.channels();
        let out = positions
            .par_iter()
            .enumerate()
            .map(|(b, points)| {
                let mut values = vec![0.0f32; points.len() * channels];
                for (n, &[x, y]) in points.iter().enumerate() {
                    self.sample_point(map, b, x, y, height, width, &mut values[n * channels..(n + 1) * channels]);
                }
                values
            })
            .collect();
        Ok(out)
    }

    /// Sample a single-channel map; returns `[B][N]`.
    pub fn sample_scalar(
        &self,
        map: &Tensor4,
        positions: &[Vec<[f32; 2]>],
        height: usize,
        width: usize,
    ) -> DetectResult<Vec<Vec<f32>>> {
        if map.channels() != 1 {
            return Err(DetectError::ChannelMismatch { expected: 1, actual: map.channels() });
        }
        self.sample(map, positions, height, width)
    }

    /// Sample a 64-channel descriptor map; returns `[B][N]` descriptors.
    pub fn sample_descriptors(
        &self,
        map: &Tensor4,
        positions: &[Vec<[f32; 2]>],
        height: usize,
        width: usize,
    ) -> DetectResult<Vec<Vec<Descriptor>>> {
        if map.channels() != DESCRIPTOR_DIM {
            return Err(DetectError::ChannelMismatch { expected: DESCRIPTOR_DIM, actual: map.channels() });
        }
        let flat = self.sample(map, positions, height, width)?;
        Ok(flat
            .into_iter()
            .map(|values| {
                values
                    .chunks_exact(DESCRIPTOR_DIM)
                    .filter_map(descriptor_from_slice)
                    .collect()
            })
            .collect())
    }

    /// Interpolate every channel of batch element `b` at `(x, y)` into `out`.
    #[allow(clippy::too_many_arguments)]
    pub fn sample_point(
        &self,
        map: &Tensor4,
        b: usize,
        x: f32,
        y: f32,
        height: usize,
        width: usize,
        out: &mut [f32],
    ) {
        let (mw, mh) = (map.width(), map.height());
        if mw == 0 || mh == 0 {
            out.iter_mut().for_each(|v| *v = 0.0);
            return;
        }
        let ix = to_map_coordinate(x, width, mw);
        let iy = to_map_coordinate(y, height, mh);
        for (c, slot) in out.iter_mut().enumerate() {
            let plane = map.plane(b, c);
            *slot = match self.mode {
                InterpolationMode::Nearest => nearest(plane, mw, mh, ix, iy),
                InterpolationMode::Bilinear => bilinear(plane, mw, mh, ix, iy),
                InterpolationMode::Bicubic => bicubic(plane, mw, mh, ix, iy),
            };
        }
    }
}

/// Frame pixel coordinate → continuous map coordinate.
///
/// `g = (2p + 1) / extent - 1` normalizes to the grid, then
/// `((g + 1) * size - 1) / 2` unnormalizes onto a map of `size` pixels.
#[inline]
pub fn to_map_coordinate(p: f32, extent: usize, size: usize) -> f32 {
    let g = (2.0 * p + 1.0) / extent as f32 - 1.0;
    ((g + 1.0) * size as f32 - 1.0) / 2.0
}

#[inline]
fn clamp_index(i: i64, size: usize) -> usize {
    i.clamp(0, size as i64 - 1) as usize
}

#[inline]
fn nearest(plane: &[f32], w: usize, h: usize, ix: f32, iy: f32) -> f32 {
    let x = clamp_index(ix.round_ties_even() as i64, w);
    let y = clamp_index(iy.round_ties_even() as i64, h);
    plane[y * w + x]
}

#[inline]
fn bilinear(plane: &[f32], w: usize, h: usize, ix: f32, iy: f32) -> f32 {
    let ix = ix.clamp(0.0, (w - 1) as f32);
    let iy = iy.clamp(0.0, (h - 1) as f32);
    let (x0, y0) = (ix.floor(), iy.floor());
    let (tx, ty) = (ix - x0, iy - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);
    let xa = clamp_index(x0, w);
    let xb = clamp_index(x0 + 1, w);
    let ya = clamp_index(y0, h);
    let yb = clamp_index(y0 + 1, h);

    let top = plane[ya * w + xa] * (1.0 - tx) + plane[ya * w + xb] * tx;
    let bottom = plane[yb * w + xa] * (1.0 - tx) + plane[yb * w + xb] * tx;
    top * (1.0 - ty) + bottom * ty
}

#[inline]
fn cubic_weights(t: f32) -> [f32; 4] {
    let near = |d: f32| ((CUBIC_A + 2.0) * d - (CUBIC_A + 3.0)) * d * d + 1.0;
    let far = |d: f32| ((CUBIC_A * d - 5.0 * CUBIC_A) * d + 8.0 * CUBIC_A) * d - 4.0 * CUBIC_A;
    [far(t + 1.0), near(t), near(1.0 - t), far(2.0 - t)]
}

#[inline]
fn bicubic(plane: &[f32], w: usize, h: usize, ix: f32, iy: f32) -> f32 {
    let ix = ix.clamp(0.0, (w - 1) as f32);
    let iy = iy.clamp(0.0, (h - 1) as f32);
    let (x0, y0) = (ix.floor(), iy.floor());
    let wx = cubic_weights(ix - x0);
    let wy = cubic_weights(iy - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let mut acc = 0.0f32;
    for (j, wyj) in wy.iter().enumerate() {
        let yy = clamp_index(y0 - 1 + j as i64, h);
        let row = &plane[yy * w..(yy + 1) * w];
        let mut line = 0.0f32;
        for (i, wxi) in wx.iter().enumerate() {
            line += row[clamp_index(x0 - 1 + i as i64, w)] * wxi;
        }
        acc += line * wyj;
    }
    acc
}
