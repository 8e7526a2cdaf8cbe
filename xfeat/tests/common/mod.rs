#![allow(dead_code)]

use std::sync::Arc;

use xfeat::xfeat_core::{
    l2_normalize, CoreResult, DenseFeatureTriple, DescriptorPair, OffsetLogits, Tensor4,
    XFeatConfig, CELL_SIZE, DESCRIPTOR_DIM, OFFSET_BINS,
};
use xfeat::xfeat_detect::PipelineBuilder;
use xfeat::{ExecutionContext, XFeat};

/// Logit gain of the box-filter backbone
pub const GAIN: f32 = 6.0;

/// 5x5 box mean of channel 0 (zero padded) at `(x, y)`.
fn box_mean(images: &Tensor4, b: usize, x: usize, y: usize) -> f32 {
    let (h, w) = (images.height() as i64, images.width() as i64);
    let mut sum = 0.0;
    for dy in -2i64..=2 {
        for dx in -2i64..=2 {
            let (xx, yy) = (x as i64 + dx, y as i64 + dy);
            if xx >= 0 && yy >= 0 && xx < w && yy < h {
                sum += images.get(b, 0, yy as usize, xx as usize);
            }
        }
    }
    sum / 25.0
}

/// Deterministic unit descriptor of cell `(y, x)` in a grid `grid_w` cells wide.
pub fn cell_descriptor(grid_w: usize, y: usize, x: usize) -> [f32; DESCRIPTOR_DIM] {
    let mut state = ((grid_w * 10_007 + y) * 10_007 + x) as u64 ^ 0x9E37_79B9_7F4A_7C15;
    let mut d = [0.0f32; DESCRIPTOR_DIM];
    for v in d.iter_mut() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        *v = (state % 10_000) as f32 / 5_000.0 - 1.0;
    }
    l2_normalize(&mut d);
    d
}

/// Backbone stand-in: keypoint logits follow a box-filtered copy of the
/// image, reliability is 1 everywhere and every cell has its own unit
/// descriptor.
pub fn box_filter_backbone(images: &Tensor4) -> CoreResult<DenseFeatureTriple> {
    let [b_n, _, h, w] = images.shape();
    let (ch, cw) = (h / CELL_SIZE, w / CELL_SIZE);
    let logits = Tensor4::from_fn([b_n, OFFSET_BINS, ch, cw], |b, c, y, x| {
        let (p, q) = (c / CELL_SIZE, c % CELL_SIZE);
        GAIN * box_mean(images, b, x * CELL_SIZE + q, y * CELL_SIZE + p)
    });
    let descriptors = Tensor4::from_fn([b_n, DESCRIPTOR_DIM, ch, cw], |_, c, y, x| {
        cell_descriptor(cw, y, x)[c]
    });
    Ok(DenseFeatureTriple {
        descriptors,
        logits,
        reliability: Tensor4::filled([b_n, 1, ch, cw], 1.0),
    })
}

pub fn uniform_fine_matcher(pairs: &[DescriptorPair]) -> Vec<OffsetLogits> {
    vec![[0.0; OFFSET_BINS]; pairs.len()]
}

/// Confident prediction of a zero offset (grid cell (4, 4)).
pub fn centered_fine_matcher(pairs: &[DescriptorPair]) -> Vec<OffsetLogits> {
    let mut logits = [0.0; OFFSET_BINS];
    logits[4 * CELL_SIZE + 4] = 10.0;
    vec![logits; pairs.len()]
}

/// Grayscale batch with a 5x5 blob of ones centred on each `(x, y)`.
pub fn blob_images(batch: usize, height: usize, width: usize, centers: &[(usize, usize)]) -> Tensor4 {
    Tensor4::from_fn([batch, 1, height, width], |_, _, y, x| {
        let inside = centers
            .iter()
            .any(|&(cx, cy)| x + 2 >= cx && x <= cx + 2 && y + 2 >= cy && y <= cy + 2);
        if inside { 1.0 } else { 0.0 }
    })
}

pub fn extractor(cfg: XFeatConfig, fine: fn(&[DescriptorPair]) -> Vec<OffsetLogits>) -> XFeat {
    let builder = PipelineBuilder::from_config(cfg)
        .context(ExecutionContext::new(2).expect("thread pool"));
    XFeat::from_builder(builder, Arc::new(box_filter_backbone), Arc::new(fine)).expect("extractor")
}
