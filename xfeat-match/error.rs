use thiserror::Error;
use xfeat_core::CoreError;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("{what}: left side has {left} batch elements, right side {right}")]
    BatchMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },
    #[error("correspondence ({batch}, {left}, {right}) is out of range")]
    IndexOutOfRange {
        batch: usize,
        left: usize,
        right: usize,
    },
}

pub type MatchResult<T> = Result<T, MatchError>;
