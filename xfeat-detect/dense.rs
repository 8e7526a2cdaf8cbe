//! Semi-dense extraction: every coarse cell is a candidate, ranked by reliability.

use rayon::prelude::*;
use xfeat_core::{
    descriptor_from_slice, Backbone, DenseFeature, DenseFeatureTriple, DenseFeatures, Tensor4,
    XFeatConfig, CELL_SIZE,
};

use crate::error::DetectResult;
use crate::preprocessing::ImagePreprocessing;
use crate::pyramid::ImagePyramid;
use crate::types::ImageFrame;

#[derive(Debug, Clone)]
pub struct DensePipeline {
    cfg: XFeatConfig,
}

impl DensePipeline {
    pub fn new(cfg: &XFeatConfig) -> Self {
        Self { cfg: cfg.clone() }
    }

    /// Dual-scale extraction when `multiscale`, single-scale otherwise.
    pub fn detect_and_compute_dense(
        &self,
        backbone: &dyn Backbone,
        images: &Tensor4,
        top_k: usize,
        multiscale: bool,
    ) -> DetectResult<Vec<DenseFeatures>> {
        let features = if multiscale {
            self.extract_dualscale(backbone, images, top_k)?
        } else {
            self.extract_dense(backbone, images, top_k)?
        };
        log::debug!(
            "dense features per image: {:?}",
            features.iter().map(DenseFeatures::len).collect::<Vec<_>>()
        );
        Ok(features)
    }

    /// Best `min(cells, top_k)` cells per image with scale tag 1.
    ///
    /// Descriptors are the raw backbone vectors (not normalized).
    pub fn extract_dense(
        &self,
        backbone: &dyn Backbone,
        images: &Tensor4,
        top_k: usize,
    ) -> DetectResult<Vec<DenseFeatures>> {
        let (input, frame) = ImagePreprocessing::preprocess(images)?;
        let triple = backbone.forward(&input)?;
        triple.validate(input.batch(), frame.height, frame.width)?;
        self.extract_dense_from_maps(&triple, frame, top_k)
    }

    /// Dense extraction on backbone maps computed elsewhere.
    ///
    /// `frame` describes the preprocessed input the maps were computed on;
    /// cell coordinates are scaled back by its `(rw, rh)` ratios.
    pub fn extract_dense_from_maps(
        &self,
        triple: &DenseFeatureTriple,
        frame: ImageFrame,
        top_k: usize,
    ) -> DetectResult<Vec<DenseFeatures>> {
        triple.validate(triple.descriptors.batch(), frame.height, frame.width)?;

        let [b_n, c_n, h, w] = triple.descriptors.shape();
        if top_k > h * w {
            log::warn!("requested {} dense features but the map only has {} cells", top_k, h * w);
        }
        let features = (0..b_n)
            .into_par_iter()
            .map(|b| {
                let reliability = triple.reliability.plane(b, 0);
                let mut order: Vec<usize> = (0..h * w).collect();
                order.sort_by(|&i, &j| reliability[j].total_cmp(&reliability[i]));
                order.truncate(top_k);

                let mut out = DenseFeatures::default();
                let mut vector = vec![0.0f32; c_n];
                for cell in order {
                    let (row, col) = (cell / w, cell % w);
                    for (c, v) in vector.iter_mut().enumerate() {
                        *v = triple.descriptors.plane(b, c)[cell];
                    }
                    if let Some(descriptor) = descriptor_from_slice(&vector) {
                        let [x, y] = frame.to_original((col * CELL_SIZE) as f32, (row * CELL_SIZE) as f32);
                        out.push(DenseFeature { x, y, scale: 1.0, descriptor });
                    }
                }
                out
            })
            .collect();
        Ok(features)
    }

    /// Extraction at both pyramid levels, smaller scale first.
    ///
    /// Coordinates are mapped back by the level factor and every feature is
    /// tagged with the inverse factor.
    pub fn extract_dualscale(
        &self,
        backbone: &dyn Backbone,
        images: &Tensor4,
        top_k: usize,
    ) -> DetectResult<Vec<DenseFeatures>> {
        let levels = ImagePyramid::generate_scale_levels(&self.cfg, top_k);
        let pyramid = ImagePyramid::build_image_pyramid(images, &levels)?;

        let mut merged = vec![DenseFeatures::default(); images.batch()];
        for (level, resized) in levels.iter().zip(&pyramid) {
            let per_image = self.extract_dense(backbone, resized, level.top_k)?;
            for (acc, mut features) in merged.iter_mut().zip(per_image) {
                for [x, y] in features.keypoints.iter_mut() {
                    *x /= level.factor;
                    *y /= level.factor;
                }
                features.scales.iter_mut().for_each(|s| *s = level.scale_tag());
                acc.extend(features);
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xfeat_core::{CoreResult, DESCRIPTOR_DIM, OFFSET_BINS};

    /// Backbone whose reliability grows with the cell index and whose
    /// descriptor channel 0 stores the cell index.
    fn ramp_backbone(images: &Tensor4) -> CoreResult<DenseFeatureTriple> {
        let [b, _, h, w] = images.shape();
        let (h, w) = (h / CELL_SIZE, w / CELL_SIZE);
        Ok(DenseFeatureTriple {
            descriptors: Tensor4::from_fn([b, DESCRIPTOR_DIM, h, w], |_, c, y, x| {
                if c == 0 { (y * w + x) as f32 } else { 1.0 }
            }),
            logits: Tensor4::zeros([b, OFFSET_BINS, h, w]),
            reliability: Tensor4::from_fn([b, 1, h, w], |_, _, y, x| (y * w + x) as f32),
        })
    }

    #[test]
    fn test_single_scale_ranks_by_reliability() {
        let pipeline = DensePipeline::new(&XFeatConfig::default());
        let images = Tensor4::zeros([1, 1, 32, 64]);
        let out = pipeline.extract_dense(&ramp_backbone, &images, 3).unwrap();
        assert_eq!(out[0].len(), 3);
        // 4x8 cells; the last cell (row 3, col 7) is most reliable.
        assert_eq!(out[0].keypoints, vec![[56.0, 24.0], [48.0, 24.0], [40.0, 24.0]]);
        assert_eq!(out[0].descriptors[0][0], 31.0);
        assert!(out[0].scales.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_budget_larger_than_cells() {
        let pipeline = DensePipeline::new(&XFeatConfig::default());
        let images = Tensor4::zeros([2, 1, 32, 32]);
        let out = pipeline.extract_dense(&ramp_backbone, &images, 1000).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].len(), 16);
    }

    #[test]
    fn test_dense_from_maps_rescales_by_frame() {
        let pipeline = DensePipeline::new(&XFeatConfig::default());
        let triple = ramp_backbone(&Tensor4::zeros([1, 1, 32, 64])).unwrap();
        let frame = ImageFrame { height: 32, width: 64, rh: 2.0, rw: 1.5 };
        let out = pipeline.extract_dense_from_maps(&triple, frame, 3).unwrap();
        assert_eq!(out[0].keypoints, vec![[84.0, 48.0], [72.0, 48.0], [60.0, 48.0]]);
        assert_eq!(out[0].descriptors[0][0], 31.0);
        assert_eq!(out[0].descriptors[2][0], 29.0);
        assert!(out[0].scales.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_dense_from_maps_rejects_frame_mismatch() {
        let pipeline = DensePipeline::new(&XFeatConfig::default());
        let triple = ramp_backbone(&Tensor4::zeros([1, 1, 32, 64])).unwrap();
        let frame = ImageFrame::identity(64, 64);
        assert!(pipeline.extract_dense_from_maps(&triple, frame, 3).is_err());
    }

    #[test]
    fn test_dual_scale_split_and_tags() {
        let pipeline = DensePipeline::new(&XFeatConfig::default());
        let images = Tensor4::zeros([1, 1, 256, 256]);
        let out = pipeline
            .detect_and_compute_dense(&ramp_backbone, &images, 100, true)
            .unwrap();
        let feats = &out[0];
        assert_eq!(feats.len(), 100);
        let coarse = feats.scales.iter().filter(|&&s| (s - 1.0 / 0.6).abs() < 1e-5).count();
        let fine = feats.scales.iter().filter(|&&s| (s - 1.0 / 1.3).abs() < 1e-5).count();
        assert_eq!((coarse, fine), (20, 80));
        assert!(feats.scales[..20].iter().all(|&s| s > 1.0));
    }

    #[test]
    fn test_dual_scale_coordinates_return_to_input_frame() {
        let pipeline = DensePipeline::new(&XFeatConfig::default());
        let images = Tensor4::zeros([1, 1, 256, 256]);
        let out = pipeline.extract_dualscale(&ramp_backbone, &images, 100).unwrap();
        for [x, y] in &out[0].keypoints {
            assert!(*x >= 0.0 && *x < 256.0 && *y >= 0.0 && *y < 256.0);
        }
    }
}
