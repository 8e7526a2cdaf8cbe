use rayon::prelude::*;
use xfeat_core::Tensor4;

use crate::error::{DetectError, DetectResult};
use crate::types::{KeypointSlot, PixelCoord};

/// Windowed non-maximum suppression over a keypoint heatmap
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeypointSelector {
    threshold: f32,
    kernel_size: usize,
}

impl Default for KeypointSelector {
    fn default() -> Self {
        Self {
            threshold: 0.05,
            kernel_size: 5,
        }
    }
}

impl KeypointSelector {
    pub fn new(threshold: f32, kernel_size: usize) -> DetectResult<Self> {
        if kernel_size == 0 || kernel_size % 2 == 0 {
            return Err(DetectError::InvalidKernelSize(kernel_size));
        }
        Ok(Self {
            threshold,
            kernel_size,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// Candidates of every image in row-major scan order.
    ///
    /// A pixel is kept iff it equals the maximum of its window and exceeds
    /// the threshold. Lists are ragged; see [`Self::pad_to_batch`].
    pub fn select(&self, heatmap: &Tensor4) -> DetectResult<Vec<Vec<PixelCoord>>> {
        heatmap.expect_channels("heatmap", 1)?;
        let [b_n, _, h, w] = heatmap.shape();
        let candidates = (0..b_n)
            .into_par_iter()
            .map(|b| {
                let plane = heatmap.plane(b, 0);
                let local_max = local_maximum(plane, w, h, self.kernel_size);
                let mut found = Vec::new();
                for y in 0..h {
                    for x in 0..w {
                        let v = plane[y * w + x];
                        if v == local_max[y * w + x] && v > self.threshold {
                            found.push(PixelCoord::new(x, y));
                        }
                    }
                }
                found
            })
            .collect::<Vec<_>>();
        log::trace!(
            "nms candidates per image: {:?}",
            candidates.iter().map(Vec::len).collect::<Vec<_>>()
        );
        Ok(candidates)
    }

    /// Candidates padded with `Absent` to the batch-wide maximum count.
    pub fn select_padded(&self, heatmap: &Tensor4) -> DetectResult<Vec<Vec<KeypointSlot>>> {
        Ok(Self::pad_to_batch(self.select(heatmap)?))
    }

    /// Right-pad ragged candidate lists to a uniform length.
    pub fn pad_to_batch(ragged: Vec<Vec<PixelCoord>>) -> Vec<Vec<KeypointSlot>> {
        let longest = ragged.iter().map(Vec::len).max().unwrap_or(0);
        ragged
            .into_iter()
            .map(|list| {
                let mut slots: Vec<KeypointSlot> =
                    list.into_iter().map(KeypointSlot::Detected).collect();
                slots.resize(longest, KeypointSlot::Absent);
                slots
            })
            .collect()
    }
}

/// Sliding-window maximum with `same` output size.
///
/// Out-of-image positions never win, matching max pooling with implicit
/// `-inf` padding. Computed separably (rows, then columns).
pub fn local_maximum(plane: &[f32], width: usize, height: usize, kernel_size: usize) -> Vec<f32> {
    let r = kernel_size / 2;
    let mut horizontal = vec![f32::NEG_INFINITY; plane.len()];
    for y in 0..height {
        let row = &plane[y * width..(y + 1) * width];
        for x in 0..width {
            let lo = x.saturating_sub(r);
            let hi = (x + r).min(width - 1);
            horizontal[y * width + x] = row[lo..=hi].iter().copied().fold(f32::NEG_INFINITY, f32::max);
        }
    }

    let mut out = vec![f32::NEG_INFINITY; plane.len()];
    for y in 0..height {
        let lo = y.saturating_sub(r);
        let hi = (y + r).min(height - 1);
        for x in 0..width {
            let mut m = f32::NEG_INFINITY;
            for yy in lo..=hi {
                m = m.max(horizontal[yy * width + x]);
            }
            out[y * width + x] = m;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn heatmap_with_peaks(h: usize, w: usize, peaks: &[(usize, usize, f32)]) -> Tensor4 {
        let mut t = Tensor4::zeros([1, 1, h, w]);
        for &(x, y, v) in peaks {
            t.set(0, 0, y, x, v);
        }
        t
    }

    #[test]
    fn test_rejects_even_kernel() {
        assert!(matches!(KeypointSelector::new(0.05, 4), Err(DetectError::InvalidKernelSize(4))));
        assert!(KeypointSelector::new(0.05, 0).is_err());
    }

    #[test]
    fn test_single_peak() {
        let hm = heatmap_with_peaks(16, 16, &[(5, 7, 0.9)]);
        let kps = KeypointSelector::default().select(&hm).unwrap();
        assert_eq!(kps, vec![vec![PixelCoord::new(5, 7)]]);
    }

    #[test]
    fn test_threshold_is_strict() {
        let hm = heatmap_with_peaks(8, 8, &[(2, 2, 0.05), (6, 6, 0.0501)]);
        let kps = KeypointSelector::default().select(&hm).unwrap();
        assert_eq!(kps[0], vec![PixelCoord::new(6, 6)]);
    }

    #[test]
    fn test_weaker_neighbour_suppressed_inside_window() {
        let hm = heatmap_with_peaks(16, 16, &[(5, 5, 0.9), (7, 5, 0.5), (8, 5, 0.6)]);
        let kps = KeypointSelector::default().select(&hm).unwrap();
        // (8, 5) is 3 px from the strongest peak, outside its radius-2 window.
        assert_eq!(kps[0], vec![PixelCoord::new(5, 5), PixelCoord::new(8, 5)]);
    }

    #[test]
    fn test_border_peaks_detected() {
        let hm = heatmap_with_peaks(8, 8, &[(0, 0, 0.7), (7, 7, 0.6)]);
        let kps = KeypointSelector::default().select(&hm).unwrap();
        assert_eq!(kps[0], vec![PixelCoord::new(0, 0), PixelCoord::new(7, 7)]);
    }

    #[test]
    fn test_padding_to_batch_maximum() {
        let mut hm = Tensor4::zeros([2, 1, 8, 8]);
        hm.set(0, 0, 1, 1, 0.9);
        hm.set(1, 0, 1, 1, 0.9);
        hm.set(1, 0, 6, 6, 0.9);
        let padded = KeypointSelector::default().select_padded(&hm).unwrap();
        assert_eq!(padded[0].len(), 2);
        assert_eq!(padded[1].len(), 2);
        assert_eq!(padded[0][1], KeypointSlot::Absent);
        assert_eq!(padded[0][1].padded_xy(), [0.0, 0.0]);
    }

    #[test]
    fn test_empty_heatmap_gives_empty_lists() {
        let hm = Tensor4::zeros([3, 1, 8, 8]);
        let padded = KeypointSelector::default().select_padded(&hm).unwrap();
        assert_eq!(padded.len(), 3);
        assert!(padded.iter().all(Vec::is_empty));
    }

    #[test]
    fn test_local_maximum_matches_brute_force() {
        let (w, h) = (9, 7);
        let plane: Vec<f32> = (0..w * h).map(|i| ((i * 37) % 23) as f32).collect();
        let fast = local_maximum(&plane, w, h, 3);
        for y in 0..h {
            for x in 0..w {
                let mut m = f32::NEG_INFINITY;
                for yy in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                    for xx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                        m = m.max(plane[yy * w + xx]);
                    }
                }
                assert_eq!(fast[y * w + x], m);
            }
        }
    }

    proptest! {
        #[test]
        fn prop_nms_is_deterministic(values in proptest::collection::vec(0.0f32..1.0, 12 * 10)) {
            let hm = Tensor4::from_vec([1, 1, 10, 12], values).unwrap();
            let selector = KeypointSelector::default();
            let first = selector.select(&hm).unwrap();
            let second = selector.select(&hm).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_candidates_are_window_maxima(values in proptest::collection::vec(0.0f32..1.0, 12 * 10)) {
            let hm = Tensor4::from_vec([1, 1, 10, 12], values).unwrap();
            let kps = KeypointSelector::default().select(&hm).unwrap();
            for p in &kps[0] {
                let v = hm.get(0, 0, p.y, p.x);
                prop_assert!(v > 0.05);
                for yy in p.y.saturating_sub(2)..=(p.y + 2).min(9) {
                    for xx in p.x.saturating_sub(2)..=(p.x + 2).min(11) {
                        prop_assert!(hm.get(0, 0, yy, xx) <= v);
                    }
                }
            }
        }
    }
}
