use std::sync::Arc;

use xfeat_core::{
    Backbone, DenseFeatureTriple, DenseFeatures, ExecutionContext, SparseFeatures, Tensor4,
    XFeatConfig,
};

use crate::dense::DensePipeline;
use crate::error::DetectResult;
use crate::sparse::{DescribedKeypoints, SparsePipeline};
use crate::types::ImageFrame;

/// Sparse and dense extraction over a shared backbone.
///
/// Configuration and thread pool are fixed at construction; every call runs
/// inside the detector's own pool.
#[derive(Clone)]
pub struct FeatureDetector {
    cfg: XFeatConfig,
    ctx: ExecutionContext,
    backbone: Arc<dyn Backbone>,
    sparse: SparsePipeline,
    dense: DensePipeline,
}

impl FeatureDetector {
    /// Validates `cfg` and builds a pool of `cfg.n_threads` workers.
    pub fn new(cfg: XFeatConfig, backbone: Arc<dyn Backbone>) -> DetectResult<Self> {
        let ctx = ExecutionContext::from_config(&cfg)?;
        Self::with_context(cfg, backbone, ctx)
    }

    /// Like [`Self::new`] but runs on an existing execution context.
    pub fn with_context(
        cfg: XFeatConfig,
        backbone: Arc<dyn Backbone>,
        ctx: ExecutionContext,
    ) -> DetectResult<Self> {
        cfg.validate()?;
        let sparse = SparsePipeline::new(&cfg)?;
        let dense = DensePipeline::new(&cfg);
        log::debug!("feature detector ready: {}", cfg.summary());
        Ok(Self {
            cfg,
            ctx,
            backbone,
            sparse,
            dense,
        })
    }

    /// Sparse features per image; `top_k` defaults to the configured budget.
    pub fn detect_and_compute(
        &self,
        images: &Tensor4,
        top_k: Option<usize>,
    ) -> DetectResult<Vec<SparseFeatures>> {
        let top_k = top_k.unwrap_or(self.cfg.top_k);
        self.ctx
            .install(|| self.sparse.detect_and_compute(self.backbone.as_ref(), images, top_k))
    }

    /// Semi-dense features per image, dual-scale when `multiscale`.
    pub fn detect_and_compute_dense(
        &self,
        images: &Tensor4,
        top_k: Option<usize>,
        multiscale: bool,
    ) -> DetectResult<Vec<DenseFeatures>> {
        let top_k = top_k.unwrap_or(self.cfg.top_k);
        self.ctx.install(|| {
            self.dense
                .detect_and_compute_dense(self.backbone.as_ref(), images, top_k, multiscale)
        })
    }

    pub fn detect_and_compute_from_maps(
        &self,
        triple: &DenseFeatureTriple,
        frame: ImageFrame,
        top_k: Option<usize>,
    ) -> DetectResult<Vec<SparseFeatures>> {
        let top_k = top_k.unwrap_or(self.cfg.top_k);
        self.ctx
            .install(|| self.sparse.detect_and_compute_from_maps(triple, frame, top_k))
    }

    /// Single-scale dense features from precomputed backbone maps.
    pub fn detect_and_compute_dense_from_maps(
        &self,
        triple: &DenseFeatureTriple,
        frame: ImageFrame,
        top_k: Option<usize>,
    ) -> DetectResult<Vec<DenseFeatures>> {
        let top_k = top_k.unwrap_or(self.cfg.top_k);
        self.ctx
            .install(|| self.dense.extract_dense_from_maps(triple, frame, top_k))
    }

    pub fn describe_keypoints(
        &self,
        descriptor_map: &Tensor4,
        keypoints: &[Vec<[f32; 2]>],
        frame: ImageFrame,
    ) -> DetectResult<Vec<DescribedKeypoints>> {
        self.ctx
            .install(|| self.sparse.describe_keypoints(descriptor_map, keypoints, frame))
    }

    pub fn config(&self) -> &XFeatConfig {
        &self.cfg
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn config_summary(&self) -> String {
        self.cfg.summary()
    }
}

impl std::fmt::Debug for FeatureDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureDetector")
            .field("cfg", &self.cfg)
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}
