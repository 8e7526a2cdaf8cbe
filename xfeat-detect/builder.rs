use std::sync::Arc;

use xfeat_core::{Backbone, ExecutionContext, XFeatConfig};

use crate::detector::FeatureDetector;
use crate::error::DetectResult;

/// Builder for a [`FeatureDetector`]
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    config: XFeatConfig,
    context: Option<ExecutionContext>,
}

impl PipelineBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder from an existing configuration
    pub fn from_config(config: XFeatConfig) -> Self {
        Self {
            config,
            context: None,
        }
    }

    /// Set the per-image feature budget
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.config.top_k = top_k;
        self
    }

    /// Set the heatmap detection threshold
    pub fn detection_threshold(mut self, threshold: f32) -> Self {
        self.config.detection_threshold = threshold;
        self
    }

    /// Set the NMS window side (odd)
    pub fn nms_kernel_size(mut self, kernel_size: usize) -> Self {
        self.config.nms_kernel_size = kernel_size;
        self
    }

    pub fn heatmap_temperature(mut self, temperature: f32) -> Self {
        self.config.heatmap_temperature = temperature;
        self
    }

    /// Set the resize factors of the two dense pyramid levels
    pub fn dual_scale_factors(mut self, coarse: f32, fine: f32) -> Self {
        self.config.dual_scale_factors = [coarse, fine];
        self
    }

    /// Set the budget shares of the two dense pyramid levels
    pub fn dual_scale_split(mut self, coarse: f32, fine: f32) -> Self {
        self.config.dual_scale_split = [coarse, fine];
        self
    }

    pub fn fine_confidence(mut self, threshold: f32) -> Self {
        self.config.fine_confidence = threshold;
        self
    }

    pub fn fine_temperature(mut self, temperature: f32) -> Self {
        self.config.fine_temperature = temperature;
        self
    }

    pub fn min_cossim(mut self, min_cossim: f32) -> Self {
        self.config.min_cossim = min_cossim;
        self
    }

    /// Set the number of threads for parallel processing
    pub fn threads(mut self, n_threads: usize) -> Self {
        self.config.n_threads = n_threads;
        self
    }

    /// Run on an existing context instead of building a new pool
    pub fn context(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Apply the sparse fast preset
    pub fn preset_sparse_fast(mut self) -> Self {
        self.config = XFeatConfig::sparse_fast_preset();
        self
    }

    /// Apply the semi-dense preset
    pub fn preset_semi_dense(mut self) -> Self {
        self.config = XFeatConfig::semi_dense_preset();
        self
    }

    pub fn summary(&self) -> String {
        self.config.summary()
    }

    pub fn to_config(self) -> XFeatConfig {
        self.config
    }

    /// Build the detector around `backbone`
    pub fn build(self, backbone: Arc<dyn Backbone>) -> DetectResult<FeatureDetector> {
        match self.context {
            Some(ctx) => FeatureDetector::with_context(self.config, backbone, ctx),
            None => FeatureDetector::new(self.config, backbone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xfeat_core::{CoreResult, DenseFeatureTriple, Tensor4};

    fn unused_backbone(_: &Tensor4) -> CoreResult<DenseFeatureTriple> {
        Err(xfeat_core::CoreError::Collaborator("not expected to run".into()))
    }

    #[test]
    fn test_fluent_settings() {
        let cfg = PipelineBuilder::new()
            .top_k(512)
            .detection_threshold(0.1)
            .dual_scale_factors(0.5, 1.5)
            .min_cossim(0.8)
            .name("custom")
            .to_config();
        assert_eq!(cfg.top_k, 512);
        assert_eq!(cfg.detection_threshold, 0.1);
        assert_eq!(cfg.dual_scale_factors, [0.5, 1.5]);
        assert_eq!(cfg.min_cossim, 0.8);
        assert_eq!(cfg.name.as_deref(), Some("custom"));
    }

    #[test]
    fn test_presets_then_overrides() {
        let cfg = PipelineBuilder::new().preset_semi_dense().top_k(123).to_config();
        assert_eq!(cfg.top_k, 123);
        assert_eq!(cfg.name.as_deref(), Some("Semi Dense"));
        assert_eq!(PipelineBuilder::new().preset_sparse_fast().to_config().top_k, 1024);
    }

    #[test]
    fn test_build_with_context() {
        let ctx = ExecutionContext::new(2).unwrap();
        let det = PipelineBuilder::new()
            .context(ctx)
            .build(Arc::new(unused_backbone))
            .unwrap();
        assert_eq!(det.context().n_threads(), 2);
    }

    #[test]
    fn test_build_rejects_bad_kernel() {
        let result = PipelineBuilder::new()
            .nms_kernel_size(6)
            .threads(1)
            .build(Arc::new(unused_backbone));
        assert!(result.is_err());
    }
}
