//! Function boundaries to the learned networks.
//!
//! Both networks are treated as deterministic, synchronous shape-in/shape-out
//! functions. Any inference runtime can sit behind these traits.

use crate::error::{CoreError, CoreResult};
use crate::features::{DescriptorPair, OffsetLogits, CELL_SIZE, DESCRIPTOR_DIM, OFFSET_BINS};
use crate::tensor::Tensor4;

/// Raw backbone output for a preprocessed batch, all maps at 1/8 resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseFeatureTriple {
    /// `[B, 64, H/8, W/8]` dense descriptors
    pub descriptors: Tensor4,
    /// `[B, 64, H/8, W/8]` keypoint logits, one per sub-pixel of a cell
    pub logits: Tensor4,
    /// `[B, 1, H/8, W/8]` reliability
    pub reliability: Tensor4,
}

impl DenseFeatureTriple {
    /// Check the triple against the preprocessed input it was computed from.
    pub fn validate(&self, batch: usize, input_height: usize, input_width: usize) -> CoreResult<()> {
        let (h, w) = (input_height / CELL_SIZE, input_width / CELL_SIZE);
        self.descriptors
            .expect_shape("backbone descriptor map", [batch, DESCRIPTOR_DIM, h, w])?;
        self.logits
            .expect_shape("backbone keypoint logits", [batch, OFFSET_BINS, h, w])?;
        self.reliability
            .expect_shape("backbone reliability map", [batch, 1, h, w])?;
        Ok(())
    }

    pub fn batch(&self) -> usize {
        self.descriptors.batch()
    }
}

/// Convolutional feature extractor.
pub trait Backbone: Send + Sync {
    /// `images [B, C, H, W]` with `H`, `W` multiples of 32.
    fn forward(&self, images: &Tensor4) -> CoreResult<DenseFeatureTriple>;
}

/// Learned offset predictor used by match refinement.
pub trait FineMatcher: Send + Sync {
    /// One row of 64 offset logits per concatenated descriptor pair.
    fn forward(&self, pairs: &[DescriptorPair]) -> CoreResult<Vec<OffsetLogits>>;
}

impl<F> Backbone for F
where
    F: Fn(&Tensor4) -> CoreResult<DenseFeatureTriple> + Send + Sync,
{
    fn forward(&self, images: &Tensor4) -> CoreResult<DenseFeatureTriple> {
        self(images)
    }
}

impl<F> FineMatcher for F
where
    F: Fn(&[DescriptorPair]) -> Vec<OffsetLogits> + Send + Sync,
{
    fn forward(&self, pairs: &[DescriptorPair]) -> CoreResult<Vec<OffsetLogits>> {
        Ok(self(pairs))
    }
}

/// Run the fine matcher and check that it produced one row per input.
pub fn run_fine_matcher(
    matcher: &dyn FineMatcher,
    pairs: &[DescriptorPair],
) -> CoreResult<Vec<OffsetLogits>> {
    let out = matcher.forward(pairs)?;
    if out.len() != pairs.len() {
        return Err(CoreError::ShapeMismatch {
            context: "fine matcher output",
            expected: vec![pairs.len(), OFFSET_BINS],
            actual: vec![out.len(), OFFSET_BINS],
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(batch: usize, h: usize, w: usize) -> DenseFeatureTriple {
        DenseFeatureTriple {
            descriptors: Tensor4::zeros([batch, DESCRIPTOR_DIM, h, w]),
            logits: Tensor4::zeros([batch, OFFSET_BINS, h, w]),
            reliability: Tensor4::zeros([batch, 1, h, w]),
        }
    }

    #[test]
    fn test_validate_accepts_matching_shapes() {
        assert!(triple(2, 4, 8).validate(2, 32, 64).is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_resolution() {
        let result = triple(1, 4, 4).validate(1, 64, 64);
        assert!(matches!(result, Err(CoreError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_fine_matcher_row_count_checked() {
        let short = |_: &[DescriptorPair]| vec![[0.0f32; OFFSET_BINS]];
        let pairs = vec![[0.0f32; 2 * DESCRIPTOR_DIM]; 3];
        assert!(run_fine_matcher(&short, &pairs).is_err());
        let exact = |p: &[DescriptorPair]| vec![[0.0f32; OFFSET_BINS]; p.len()];
        assert_eq!(run_fine_matcher(&exact, &pairs).unwrap().len(), 3);
    }
}
