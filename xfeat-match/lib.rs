//! Descriptor matching and coarse-to-fine refinement.

pub mod error;
pub mod matcher;
pub mod refiner;

pub use error::{MatchError, MatchResult};
pub use matcher::{batch_match, match_descriptors, MutualMatcher};
pub use refiner::{fine_confidence, subpixel_soft_argmax, Refiner};
