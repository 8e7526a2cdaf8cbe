//! Coarse-to-fine refinement of semi-dense matches.
//!
//! The fine matcher predicts, for each coarse correspondence, 64 logits over
//! an 8x8 grid of sub-cell offsets. The softmax peak gives a confidence and
//! the soft-argmax a sub-pixel displacement of the left keypoint.

use rayon::prelude::*;
use xfeat_core::{
    concat_descriptors, run_fine_matcher, BatchCorrespondence, DenseFeatures, DescriptorPair,
    FineMatcher, OffsetLogits, RefinedMatch, XFeatConfig, CELL_SIZE,
};

use crate::error::{MatchError, MatchResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Refiner {
    fine_conf: f32,
    temperature: f32,
}

impl Default for Refiner {
    fn default() -> Self {
        Self {
            fine_conf: 0.25,
            temperature: 3.0,
        }
    }
}

impl Refiner {
    pub fn new(fine_conf: f32, temperature: f32) -> Self {
        Self { fine_conf, temperature }
    }

    pub fn from_config(cfg: &XFeatConfig) -> Self {
        Self::new(cfg.fine_confidence, cfg.fine_temperature)
    }

    pub fn fine_conf(&self) -> f32 {
        self.fine_conf
    }

    /// Refine batched correspondences between two dense feature sets.
    ///
    /// Matches whose confidence does not exceed the threshold are dropped;
    /// the survivors keep their input order.
    pub fn refine(
        &self,
        left: &[DenseFeatures],
        right: &[DenseFeatures],
        matches: &[BatchCorrespondence],
        fine_matcher: &dyn FineMatcher,
    ) -> MatchResult<Vec<RefinedMatch>> {
        if left.len() != right.len() {
            return Err(MatchError::BatchMismatch {
                what: "refine",
                left: left.len(),
                right: right.len(),
            });
        }

        let mut gathered = Vec::with_capacity(matches.len());
        let mut pairs: Vec<DescriptorPair> = Vec::with_capacity(matches.len());
        for m in matches {
            let a = left.get(m.batch).and_then(|f| f.get(m.left));
            let b = right.get(m.batch).and_then(|f| f.get(m.right));
            let (Some(a), Some(b)) = (a, b) else {
                return Err(MatchError::IndexOutOfRange {
                    batch: m.batch,
                    left: m.left,
                    right: m.right,
                });
            };
            pairs.push(concat_descriptors(&a.descriptor, &b.descriptor));
            gathered.push((m.batch, a, b));
        }
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let logits = run_fine_matcher(fine_matcher, &pairs)?;
        let refined: Vec<RefinedMatch> = gathered
            .par_iter()
            .zip(logits.par_iter())
            .filter_map(|(&(batch, a, b), row)| {
                let confidence = fine_confidence(row, self.temperature);
                if confidence <= self.fine_conf {
                    return None;
                }
                let [dx, dy] = subpixel_soft_argmax(row, self.temperature);
                Some(RefinedMatch {
                    batch,
                    x0: a.x + dx * a.scale,
                    y0: a.y + dy * a.scale,
                    x1: b.x,
                    y1: b.y,
                })
            })
            .collect();

        log::debug!("refinement kept {} of {} matches", refined.len(), matches.len());
        Ok(refined)
    }
}

fn softmax(logits: &OffsetLogits, temperature: f32) -> OffsetLogits {
    let mut probs = [0.0f32; CELL_SIZE * CELL_SIZE];
    let max = logits.iter().fold(f32::NEG_INFINITY, |m, &v| m.max(v * temperature));
    let mut sum = 0.0;
    for (p, &v) in probs.iter_mut().zip(logits.iter()) {
        *p = (v * temperature - max).exp();
        sum += *p;
    }
    probs.iter_mut().for_each(|p| *p /= sum);
    probs
}

/// Peak probability of the tempered softmax over the offset grid.
pub fn fine_confidence(logits: &OffsetLogits, temperature: f32) -> f32 {
    softmax(logits, temperature)
        .iter()
        .fold(f32::NEG_INFINITY, |m, &p| m.max(p))
}

/// Expected offset under the tempered softmax, centred on the grid midpoint.
///
/// Logit `k` is grid cell `(i, j) = (k / 8, k % 8)`. The first component
/// weights the row index `i - 4` and the second the column index `j - 4`,
/// so both lie in `[-4, 3]`.
pub fn subpixel_soft_argmax(logits: &OffsetLogits, temperature: f32) -> [f32; 2] {
    let probs = softmax(logits, temperature);
    let half = (CELL_SIZE / 2) as f32;
    let mut offset = [0.0f32; 2];
    for (k, p) in probs.iter().enumerate() {
        let (i, j) = ((k / CELL_SIZE) as f32, (k % CELL_SIZE) as f32);
        offset[0] += p * (i - half);
        offset[1] += p * (j - half);
    }
    offset
}
