//! Keypoint detection and description on top of a learned backbone.
//!
//! The sparse path decodes keypoint logits into a heatmap, keeps local maxima
//! and samples descriptors at the survivors. The dense path ranks every
//! coarse cell by reliability, optionally at two pyramid levels.

pub mod builder;
pub mod dense;
pub mod detector;
pub mod error;
pub mod heatmap;
pub mod nms;
pub mod preprocessing;
pub mod pyramid;
pub mod sampler;
pub mod sparse;
pub mod types;

pub use builder::PipelineBuilder;
pub use dense::DensePipeline;
pub use detector::FeatureDetector;
pub use error::{DetectError, DetectResult};
pub use heatmap::HeatmapDecoder;
pub use nms::KeypointSelector;
pub use preprocessing::ImagePreprocessing;
pub use pyramid::ImagePyramid;
pub use sampler::{DescriptorSampler, InterpolationMode};
pub use sparse::{DescribedKeypoints, SparsePipeline};
pub use types::{ImageFrame, KeypointSlot, PixelCoord, ScaleLevel, ScoredCandidate};
