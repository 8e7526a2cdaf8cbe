use rayon::prelude::*;
use xfeat_core::{Tensor4, CELL_SIZE, OFFSET_BINS};

use crate::error::DetectResult;

/// Depth-to-space decoding of keypoint logits into a full resolution heatmap
pub struct HeatmapDecoder;

impl HeatmapDecoder {
    /// Decode `[B, 64, H, W]` logits into a `[B, 1, 8H, 8W]` heatmap.
    ///
    /// Every coarse cell runs its own softmax over the 64 channels; channel
    /// `8p + q` of cell `(i, j)` lands on heatmap pixel `(8i + p, 8j + q)`.
    pub fn decode(logits: &Tensor4, temperature: f32) -> DetectResult<Tensor4> {
        logits.expect_channels("keypoint logits", OFFSET_BINS)?;
        let [b_n, _, h, w] = logits.shape();
        let (out_h, out_w) = (h * CELL_SIZE, w * CELL_SIZE);
        let mut heatmap = Tensor4::zeros([b_n, 1, out_h, out_w]);
        if b_n == 0 || h == 0 || w == 0 {
            return Ok(heatmap);
        }

        let plane = h * w;
        heatmap
            .data_mut()
            .par_chunks_mut(out_h * out_w)
            .enumerate()
            .for_each(|(b, out)| {
                let cells = logits.item(b);
                let mut probs = [0.0f32; OFFSET_BINS];
                for i in 0..h {
                    for j in 0..w {
                        let cell = i * w + j;
                        for (k, p) in probs.iter_mut().enumerate() {
                            *p = cells[k * plane + cell] * temperature;
                        }
                        softmax_in_place(&mut probs);
                        for (k, p) in probs.iter().enumerate() {
                            let (dy, dx) = (k / CELL_SIZE, k % CELL_SIZE);
                            out[(i * CELL_SIZE + dy) * out_w + j * CELL_SIZE + dx] = *p;
                        }
                    }
                }
            });

        Ok(heatmap)
    }
}

/// Numerically stable softmax; subtracts the maximum before exponentiating.
pub fn softmax_in_place(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cell_sums(heatmap: &Tensor4) -> Vec<f32> {
        let (h, w) = (heatmap.height() / CELL_SIZE, heatmap.width() / CELL_SIZE);
        let mut sums = Vec::new();
        for b in 0..heatmap.batch() {
            for i in 0..h {
                for j in 0..w {
                    let mut s = 0.0;
                    for dy in 0..CELL_SIZE {
                        for dx in 0..CELL_SIZE {
                            s += heatmap.get(b, 0, i * CELL_SIZE + dy, j * CELL_SIZE + dx);
                        }
                    }
                    sums.push(s);
                }
            }
        }
        sums
    }

    #[test]
    fn test_layout_places_subcells_row_major() {
        // Cell (1, 2) strongly prefers channel 8*3 + 5.
        let logits = Tensor4::from_fn([1, 64, 2, 3], |_, c, y, x| {
            if y == 1 && x == 2 && c == 29 { 50.0 } else { 0.0 }
        });
        let heatmap = HeatmapDecoder::decode(&logits, 1.0).unwrap();
        assert_eq!(heatmap.shape(), [1, 1, 16, 24]);
        assert!(heatmap.get(0, 0, 8 + 3, 16 + 5) > 0.99);
        assert!((heatmap.get(0, 0, 0, 0) - 1.0 / 64.0).abs() < 1e-6);
    }

    #[test]
    fn test_large_logits_stay_finite() {
        let logits = Tensor4::from_fn([1, 64, 1, 1], |_, c, _, _| 1.0e4 + c as f32);
        let heatmap = HeatmapDecoder::decode(&logits, 1.0).unwrap();
        assert!(heatmap.data().iter().all(|v| v.is_finite()));
        assert!((heatmap.get(0, 0, 7, 7) - heatmap.data().iter().cloned().fold(0.0, f32::max)).abs() < 1e-7);
    }

    #[test]
    fn test_wrong_channel_count_is_shape_error() {
        let logits = Tensor4::zeros([1, 65, 2, 2]);
        assert!(HeatmapDecoder::decode(&logits, 1.0).is_err());
    }

    proptest! {
        #[test]
        fn prop_cells_sum_to_one(values in proptest::collection::vec(-20.0f32..20.0, 64 * 2 * 3)) {
            let logits = Tensor4::from_vec([1, 64, 2, 3], values).unwrap();
            let heatmap = HeatmapDecoder::decode(&logits, 1.0).unwrap();
            for s in cell_sums(&heatmap) {
                prop_assert!((s - 1.0).abs() < 1e-4);
            }
        }
    }
}
