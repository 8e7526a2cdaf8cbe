pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod features;
pub mod tensor;

pub use collaborators::{run_fine_matcher, Backbone, DenseFeatureTriple, FineMatcher};
pub use config::XFeatConfig;
pub use context::ExecutionContext;
pub use error::{CoreError, CoreResult};
pub use features::{
    concat_descriptors, cosine_similarity, descriptor_from_slice, l2_normalize,
    BatchCorrespondence, Correspondence, DenseFeature, DenseFeatures, Descriptor, DescriptorPair,
    Keypoint, OffsetLogits, RefinedMatch, SparseFeatures, CELL_SIZE, DESCRIPTOR_DIM, OFFSET_BINS,
};
pub use tensor::Tensor4;
