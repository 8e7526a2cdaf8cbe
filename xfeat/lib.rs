//! High-level feature extraction and matching.
//!
//! [`XFeat`] owns a [`FeatureDetector`] (backbone, configuration and thread
//! pool) plus the fine matcher used to refine semi-dense matches.

pub mod error;
pub mod input;

use std::sync::Arc;

use xfeat_core::{
    Backbone, BatchCorrespondence, DenseFeatureTriple, DenseFeatures, Descriptor, FineMatcher,
    SparseFeatures, Tensor4, XFeatConfig,
};
use xfeat_detect::{DescribedKeypoints, FeatureDetector, ImageFrame, PipelineBuilder};
use xfeat_match::{MutualMatcher, Refiner};

pub use error::{XFeatError, XFeatResult};
pub use input::{image_to_tensor, images_to_tensor, load_image, ColorMode};
pub use xfeat_core::{self, ExecutionContext, Keypoint, RefinedMatch};
pub use xfeat_detect::{self, DetectError};
pub use xfeat_match::{self, MatchError};

/// Keypoint coordinates of a matched image pair
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairMatches {
    /// Matched points of the first image, aligned with `matched1`
    pub matched0: Vec<[f32; 2]>,
    pub matched1: Vec<[f32; 2]>,
    /// Points of the first image without a mutual match
    pub unmatched0: Vec<[f32; 2]>,
    pub unmatched1: Vec<[f32; 2]>,
}

impl PairMatches {
    fn from_indices(points0: &[[f32; 2]], points1: &[[f32; 2]], idx0: &[usize], idx1: &[usize]) -> Self {
        let leftovers = |points: &[[f32; 2]], used: &[usize]| {
            let mut taken = vec![false; points.len()];
            used.iter().for_each(|&i| taken[i] = true);
            points
                .iter()
                .zip(taken)
                .filter(|(_, t)| !t)
                .map(|(p, _)| *p)
                .collect::<Vec<_>>()
        };
        Self {
            matched0: idx0.iter().map(|&i| points0[i]).collect(),
            matched1: idx1.iter().map(|&i| points1[i]).collect(),
            unmatched0: leftovers(points0, idx0),
            unmatched1: leftovers(points1, idx1),
        }
    }

    pub fn len(&self) -> usize {
        self.matched0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matched0.is_empty()
    }
}

/// Sparse and semi-dense extraction with mutual nearest neighbour matching
pub struct XFeat {
    detector: FeatureDetector,
    fine_matcher: Arc<dyn FineMatcher>,
    refiner: Refiner,
}

impl XFeat {
    /// Create an extractor with the given configuration and networks
    pub fn new(
        cfg: XFeatConfig,
        backbone: Arc<dyn Backbone>,
        fine_matcher: Arc<dyn FineMatcher>,
    ) -> XFeatResult<Self> {
        Self::from_builder(PipelineBuilder::from_config(cfg), backbone, fine_matcher)
    }

    pub fn from_builder(
        builder: PipelineBuilder,
        backbone: Arc<dyn Backbone>,
        fine_matcher: Arc<dyn FineMatcher>,
    ) -> XFeatResult<Self> {
        let detector = builder.build(backbone)?;
        let refiner = Refiner::from_config(detector.config());
        Ok(Self {
            detector,
            fine_matcher,
            refiner,
        })
    }

    /// Sparse keypoints and descriptors for every image of the batch
    pub fn detect_and_compute(&self, images: &Tensor4) -> XFeatResult<Vec<SparseFeatures>> {
        Ok(self.detector.detect_and_compute(images, None)?)
    }

    pub fn detect_and_compute_with_top_k(
        &self,
        images: &Tensor4,
        top_k: usize,
    ) -> XFeatResult<Vec<SparseFeatures>> {
        Ok(self.detector.detect_and_compute(images, Some(top_k))?)
    }

    /// Semi-dense features sorted by reliability, dual-scale when `multiscale`
    pub fn detect_and_compute_dense(
        &self,
        images: &Tensor4,
        top_k: Option<usize>,
        multiscale: bool,
    ) -> XFeatResult<Vec<DenseFeatures>> {
        Ok(self.detector.detect_and_compute_dense(images, top_k, multiscale)?)
    }

    /// Sparse features from backbone maps computed elsewhere
    pub fn detect_and_compute_from_maps(
        &self,
        triple: &DenseFeatureTriple,
        frame: ImageFrame,
    ) -> XFeatResult<Vec<SparseFeatures>> {
        Ok(self.detector.detect_and_compute_from_maps(triple, frame, None)?)
    }

    /// Semi-dense features from backbone maps computed elsewhere
    pub fn detect_and_compute_dense_from_maps(
        &self,
        triple: &DenseFeatureTriple,
        frame: ImageFrame,
        top_k: Option<usize>,
    ) -> XFeatResult<Vec<DenseFeatures>> {
        Ok(self.detector.detect_and_compute_dense_from_maps(triple, frame, top_k)?)
    }

    /// Descriptors at caller supplied keypoints of a precomputed descriptor map
    pub fn describe_keypoints(
        &self,
        descriptor_map: &Tensor4,
        keypoints: &[Vec<[f32; 2]>],
        frame: ImageFrame,
    ) -> XFeatResult<Vec<DescribedKeypoints>> {
        Ok(self.detector.describe_keypoints(descriptor_map, keypoints, frame)?)
    }

    /// Mutual nearest neighbours as parallel index lists
    pub fn match_descriptors(
        &self,
        left: &[Descriptor],
        right: &[Descriptor],
        min_cossim: f32,
    ) -> (Vec<usize>, Vec<usize>) {
        let matcher = MutualMatcher::new(min_cossim);
        self.detector
            .context()
            .install(|| matcher.match_pair(left, right))
            .into_iter()
            .map(|c| (c.left, c.right))
            .unzip()
    }

    pub fn batch_match(
        &self,
        left: &[Vec<Descriptor>],
        right: &[Vec<Descriptor>],
        min_cossim: f32,
    ) -> XFeatResult<Vec<BatchCorrespondence>> {
        let matcher = MutualMatcher::new(min_cossim);
        Ok(self
            .detector
            .context()
            .install(|| matcher.match_batch(left, right))?)
    }

    /// Semi-dense matching with coarse-to-fine refinement.
    ///
    /// Returns `(x0, y0, x1, y1)` rows per batch element.
    pub fn match_and_refine(
        &self,
        images0: &Tensor4,
        images1: &Tensor4,
    ) -> XFeatResult<Vec<Vec<[f32; 4]>>> {
        if images0.batch() != images1.batch() {
            return Err(XFeatError::BatchSize {
                expected: images0.batch(),
                actual: images1.batch(),
            });
        }
        let out0 = self.detect_and_compute_dense(images0, None, true)?;
        let out1 = self.detect_and_compute_dense(images1, None, true)?;

        let descriptors = |features: &[DenseFeatures]| -> Vec<Vec<Descriptor>> {
            features.iter().map(|f| f.descriptors.clone()).collect()
        };
        let correspondences = self.batch_match(&descriptors(&out0), &descriptors(&out1), -1.0)?;

        let refined = self.detector.context().install(|| {
            self.refiner
                .refine(&out0, &out1, &correspondences, self.fine_matcher.as_ref())
        })?;

        let mut per_batch = vec![Vec::new(); images0.batch()];
        for m in refined {
            per_batch[m.batch].push(m.to_array());
        }
        log::debug!(
            "refined matches per pair: {:?}",
            per_batch.iter().map(Vec::len).collect::<Vec<_>>()
        );
        Ok(per_batch)
    }

    /// [`Self::match_and_refine`] for a single image pair
    pub fn match_and_refine_pair(&self, image0: &Tensor4, image1: &Tensor4) -> XFeatResult<Vec<[f32; 4]>> {
        expect_single(image0)?;
        expect_single(image1)?;
        Ok(self
            .match_and_refine(image0, image1)?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    /// Detect on two single images and match their sparse features
    pub fn match_xfeat(&self, image0: &Tensor4, image1: &Tensor4, min_cossim: f32) -> XFeatResult<PairMatches> {
        expect_single(image0)?;
        expect_single(image1)?;
        let out0 = self.single_sparse(image0)?;
        let out1 = self.single_sparse(image1)?;
        Ok(self.pair_matches(&out0, &out1, min_cossim))
    }

    /// Match features of a previous frame against a new single image
    pub fn track_keypoints(
        &self,
        previous: &SparseFeatures,
        image: &Tensor4,
        min_cossim: f32,
    ) -> XFeatResult<PairMatches> {
        expect_single(image)?;
        let current = self.single_sparse(image)?;
        Ok(self.pair_matches(previous, &current, min_cossim))
    }

    pub fn config(&self) -> &XFeatConfig {
        self.detector.config()
    }

    pub fn detector(&self) -> &FeatureDetector {
        &self.detector
    }

    fn single_sparse(&self, image: &Tensor4) -> XFeatResult<SparseFeatures> {
        Ok(self.detect_and_compute(image)?.into_iter().next().unwrap_or_default())
    }

    fn pair_matches(&self, out0: &SparseFeatures, out1: &SparseFeatures, min_cossim: f32) -> PairMatches {
        let (idx0, idx1) = self.match_descriptors(&out0.descriptors, &out1.descriptors, min_cossim);
        log::debug!("{} sparse matches ({} / {} features)", idx0.len(), out0.len(), out1.len());
        PairMatches::from_indices(&out0.positions(), &out1.positions(), &idx0, &idx1)
    }
}

fn expect_single(images: &Tensor4) -> XFeatResult<()> {
    if images.batch() != 1 {
        return Err(XFeatError::BatchSize {
            expected: 1,
            actual: images.batch(),
        });
    }
    Ok(())
}
