//! Sparse keypoint detection and description.

use rayon::prelude::*;
use xfeat_core::{
    l2_normalize, Backbone, DenseFeatureTriple, Descriptor, Keypoint, SparseFeatures, Tensor4,
    XFeatConfig,
};

use crate::error::{DetectError, DetectResult};
use crate::heatmap::HeatmapDecoder;
use crate::nms::KeypointSelector;
use crate::preprocessing::ImagePreprocessing;
use crate::sampler::DescriptorSampler;
use crate::types::{ImageFrame, KeypointSlot, ScoredCandidate};

/// Score given to padding and origin slots; never survives the `> 0` filter.
const INVALID_SCORE: f32 = -1.0;

/// Keypoints with descriptors but no detection score
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescribedKeypoints {
    pub keypoints: Vec<[f32; 2]>,
    pub descriptors: Vec<Descriptor>,
}

/// Heatmap based keypoint detection with bicubic descriptor sampling
#[derive(Debug, Clone)]
pub struct SparsePipeline {
    selector: KeypointSelector,
    temperature: f32,
}

impl SparsePipeline {
    pub fn new(cfg: &XFeatConfig) -> DetectResult<Self> {
        Ok(Self {
            selector: KeypointSelector::new(cfg.detection_threshold, cfg.nms_kernel_size)?,
            temperature: cfg.heatmap_temperature,
        })
    }

    pub fn selector(&self) -> &KeypointSelector {
        &self.selector
    }

    /// Detect and describe up to `top_k` keypoints per image.
    pub fn detect_and_compute(
        &self,
        backbone: &dyn Backbone,
        images: &Tensor4,
        top_k: usize,
    ) -> DetectResult<Vec<SparseFeatures>> {
        let (input, frame) = ImagePreprocessing::preprocess(images)?;
        log::debug!(
            "sparse extraction on {:?} (frame {}x{}, top_k {})",
            input.shape(),
            frame.width,
            frame.height,
            top_k
        );
        let triple = backbone.forward(&input)?;
        triple.validate(input.batch(), frame.height, frame.width)?;
        self.detect_and_compute_from_maps(&triple, frame, top_k)
    }

    /// Run detection on backbone maps computed elsewhere.
    ///
    /// `frame` gives the size the maps were computed at and the ratios
    /// back to the caller's image.
    pub fn detect_and_compute_from_maps(
        &self,
        triple: &DenseFeatureTriple,
        frame: ImageFrame,
        top_k: usize,
    ) -> DetectResult<Vec<SparseFeatures>> {
        let batch = triple.batch();
        triple.validate(batch, frame.height, frame.width)?;

        let mut descriptor_map = triple.descriptors.clone();
        descriptor_map.l2_normalize_channels();

        let heatmap = HeatmapDecoder::decode(&triple.logits, self.temperature)?;
        let slots = self.selector.select_padded(&heatmap)?;

        let positions: Vec<Vec<[f32; 2]>> = slots
            .iter()
            .map(|image| image.iter().map(KeypointSlot::padded_xy).collect())
            .collect();
        let (h, w) = (frame.height, frame.width);
        let heat = DescriptorSampler::nearest().sample_scalar(&heatmap, &positions, h, w)?;
        let reliability =
            DescriptorSampler::bilinear().sample_scalar(&triple.reliability, &positions, h, w)?;

        let ranked: Vec<Vec<ScoredCandidate>> = slots
            .par_iter()
            .zip(positions.par_iter())
            .zip(heat.par_iter().zip(reliability.par_iter()))
            .map(|((image_slots, xy), (heat, rel))| {
                let scored = image_slots
                    .iter()
                    .enumerate()
                    .map(|(n, slot)| ScoredCandidate {
                        x: xy[n][0],
                        y: xy[n][1],
                        score: if slot.is_scorable() { heat[n] * rel[n] } else { INVALID_SCORE },
                    })
                    .collect();
                rank_top_k(scored, top_k)
            })
            .collect();

        let kept: Vec<Vec<ScoredCandidate>> = ranked
            .into_iter()
            .map(|image| image.into_iter().filter(|c| c.score > 0.0).collect())
            .collect();
        let kept_xy: Vec<Vec<[f32; 2]>> = kept
            .iter()
            .map(|image| image.iter().map(|c| [c.x, c.y]).collect())
            .collect();
        let descriptors =
            DescriptorSampler::bicubic().sample_descriptors(&descriptor_map, &kept_xy, h, w)?;

        let features: Vec<SparseFeatures> = kept
            .into_iter()
            .zip(descriptors)
            .map(|(candidates, mut descs)| {
                descs.iter_mut().for_each(|d| l2_normalize(d));
                let keypoints = candidates
                    .iter()
                    .map(|c| {
                        let [x, y] = frame.to_original(c.x, c.y);
                        Keypoint { x, y, score: c.score }
                    })
                    .collect();
                SparseFeatures { keypoints, descriptors: descs }
            })
            .collect();

        log::debug!(
            "sparse features per image: {:?}",
            features.iter().map(SparseFeatures::len).collect::<Vec<_>>()
        );
        Ok(features)
    }

    /// Describe caller supplied keypoints (preprocessed-frame pixels) of precomputed maps.
    ///
    /// Descriptors are bicubic-sampled and normalized; the keypoints are
    /// returned in original image coordinates.
    pub fn describe_keypoints(
        &self,
        descriptor_map: &Tensor4,
        keypoints: &[Vec<[f32; 2]>],
        frame: ImageFrame,
    ) -> DetectResult<Vec<DescribedKeypoints>> {
        if keypoints.len() != descriptor_map.batch() {
            return Err(DetectError::BatchMismatch {
                what: "keypoint lists",
                expected: descriptor_map.batch(),
                actual: keypoints.len(),
            });
        }
        let descriptors = DescriptorSampler::bicubic().sample_descriptors(
            descriptor_map,
            keypoints,
            frame.height,
            frame.width,
        )?;
        Ok(keypoints
            .iter()
            .zip(descriptors)
            .map(|(points, mut descs)| {
                descs.iter_mut().for_each(|d| l2_normalize(d));
                DescribedKeypoints {
                    keypoints: points.iter().map(|&[x, y]| frame.to_original(x, y)).collect(),
                    descriptors: descs,
                }
            })
            .collect())
    }
}

/// Stable descending sort by score, truncated to `top_k`.
///
/// Equal scores keep their scan order.
pub fn rank_top_k(mut candidates: Vec<ScoredCandidate>, top_k: usize) -> Vec<ScoredCandidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(top_k);
    candidates
}
