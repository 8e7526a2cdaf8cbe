use crate::error::{CoreError, CoreResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Extraction and matching parameters shared by every pipeline stage
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct XFeatConfig {
    /// Maximum number of features kept per image
    pub top_k: usize,
    /// Heatmap value a keypoint candidate must exceed
    pub detection_threshold: f32,
    /// Window side of the heatmap non-maximum suppression (odd)
    pub nms_kernel_size: usize,
    /// Multiplier applied to keypoint logits before the softmax
    pub heatmap_temperature: f32,
    /// Resize factors of the two dense pyramid levels
    pub dual_scale_factors: [f32; 2],
    /// Share of `top_k` assigned to each dense pyramid level
    pub dual_scale_split: [f32; 2],
    /// Fine-matcher confidence a refined match must exceed
    pub fine_confidence: f32,
    /// Softmax temperature of the refinement confidence and soft-argmax
    pub fine_temperature: f32,
    /// Cosine similarity a mutual match must exceed (ignored when <= 0)
    pub min_cossim: f32,
    /// Worker threads of the execution context (0 = all cores)
    pub n_threads: usize,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
}

impl Default for XFeatConfig {
    fn default() -> Self {
        Self {
            top_k: 4096,
            detection_threshold: 0.05,
            nms_kernel_size: 5,
            heatmap_temperature: 1.0,
            dual_scale_factors: [0.6, 1.3],
            dual_scale_split: [0.2, 0.8],
            fine_confidence: 0.25,
            fine_temperature: 3.0,
            min_cossim: -1.0,
            n_threads: num_cpus::get().max(1),
            name: None,
        }
    }
}

impl XFeatConfig {
    /// Fewer, stronger sparse features for tracking-style workloads
    pub fn sparse_fast_preset() -> Self {
        Self {
            top_k: 1024,
            detection_threshold: 0.1,
            name: Some("Sparse Fast".to_string()),
            ..Self::default()
        }
    }

    /// Dense budget for coarse-to-fine matching
    pub fn semi_dense_preset() -> Self {
        Self {
            top_k: 10_000,
            name: Some("Semi Dense".to_string()),
            ..Self::default()
        }
    }

    /// Feature budgets of the two dense pyramid levels.
    pub fn dual_scale_budgets(&self, top_k: usize) -> [usize; 2] {
        let split = |share: f32| (top_k as f64 * share as f64) as usize;
        [split(self.dual_scale_split[0]), split(self.dual_scale_split[1])]
    }

    pub fn summary(&self) -> String {
        format!(
            "XFeatConfig: top_k={}, threshold={:.3}, nms_kernel={}, scales={:?}, split={:?}, fine_conf={:.2}, min_cossim={:.2}, threads={}",
            self.top_k,
            self.detection_threshold,
            self.nms_kernel_size,
            self.dual_scale_factors,
            self.dual_scale_split,
            self.fine_confidence,
            self.min_cossim,
            self.n_threads
        )
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.nms_kernel_size == 0 || self.nms_kernel_size % 2 == 0 {
            return Err(CoreError::InvalidConfig(format!(
                "nms_kernel_size must be odd, got {}",
                self.nms_kernel_size
            )));
        }
        if !self.detection_threshold.is_finite() || self.detection_threshold < 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "detection_threshold must be finite and >= 0, got {}",
                self.detection_threshold
            )));
        }
        if !(self.heatmap_temperature > 0.0) || !(self.fine_temperature > 0.0) {
            return Err(CoreError::InvalidConfig(
                "softmax temperatures must be positive".to_string(),
            ));
        }
        if self.dual_scale_factors.iter().any(|s| !(*s > 0.0) || !s.is_finite()) {
            return Err(CoreError::InvalidConfig(format!(
                "dual_scale_factors must be positive, got {:?}",
                self.dual_scale_factors
            )));
        }
        if self.dual_scale_split.iter().any(|s| !(0.0..=1.0).contains(s)) {
            return Err(CoreError::InvalidConfig(format!(
                "dual_scale_split shares must lie in [0, 1], got {:?}",
                self.dual_scale_split
            )));
        }
        Ok(())
    }

    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CoreError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "serde")]
    pub fn to_toml(&self) -> CoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> CoreResult<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| CoreError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "serde")]
    pub fn save_json<P: AsRef<std::path::Path>>(&self, path: P) -> CoreResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    #[cfg(feature = "serde")]
    pub fn load_json<P: AsRef<std::path::Path>>(path: P) -> CoreResult<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    #[cfg(feature = "serde")]
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> CoreResult<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    #[cfg(feature = "serde")]
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> CoreResult<Self> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }
}
