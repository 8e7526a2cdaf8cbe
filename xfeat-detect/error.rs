use thiserror::Error;
use xfeat_core::CoreError;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("invalid image dimensions: {width}x{height} (must be > 0)")]
    InvalidImageSize { width: usize, height: usize },
    #[error("image {width}x{height} too small (minimum {min_size}x{min_size})")]
    ImageTooSmall {
        width: usize,
        height: usize,
        min_size: usize,
    },
    #[error("invalid NMS kernel size {0} (must be odd and > 0)")]
    InvalidKernelSize(usize),
    #[error("map has {actual} channels, {expected} required")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("{what}: got {actual} entries for a batch of {expected}")]
    BatchMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

pub type DetectResult<T> = Result<T, DetectError>;
