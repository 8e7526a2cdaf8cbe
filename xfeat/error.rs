use thiserror::Error;
use xfeat_core::CoreError;
use xfeat_detect::DetectError;
use xfeat_match::MatchError;

#[derive(Debug, Error)]
pub enum XFeatError {
    #[error("detection error: {0}")]
    Detect(#[from] DetectError),
    #[error("matching error: {0}")]
    Match(#[from] MatchError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("expected a batch of {expected} image(s), got {actual}")]
    BatchSize { expected: usize, actual: usize },
    #[error("image {index} is {actual:?}, batch images must all be {expected:?}")]
    InputSizeMismatch {
        index: usize,
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

pub type XFeatResult<T> = Result<T, XFeatError>;
