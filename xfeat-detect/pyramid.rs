use xfeat_core::{Tensor4, XFeatConfig};

use crate::error::DetectResult;
use crate::preprocessing::ImagePreprocessing;
use crate::types::ScaleLevel;

/// Image pyramid for dual-scale dense extraction
pub struct ImagePyramid;

impl ImagePyramid {
    /// Scale levels with their share of the `top_k` budget.
    pub fn generate_scale_levels(cfg: &XFeatConfig, top_k: usize) -> Vec<ScaleLevel> {
        let budgets = cfg.dual_scale_budgets(top_k);
        cfg.dual_scale_factors
            .iter()
            .zip(budgets)
            .enumerate()
            .map(|(level, (&factor, top_k))| ScaleLevel { level, factor, top_k })
            .collect()
    }

    /// Resized copy of the batch for every level.
    pub fn build_image_pyramid(images: &Tensor4, levels: &[ScaleLevel]) -> DetectResult<Vec<Tensor4>> {
        levels
            .iter()
            .map(|level| {
                let resized = ImagePreprocessing::resize_by_factor(images, level.factor)?;
                log::debug!(
                    "pyramid level {} (x{}): {}x{}, budget {}",
                    level.level,
                    level.factor,
                    resized.width(),
                    resized.height(),
                    level.top_k
                );
                Ok(resized)
            })
            .collect()
    }
}
