use thiserror::Error;

/// Errors raised while preparing a capture stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CdcError {
    #[error("since index {0} given without since version")]
    IndexWithoutVersion(u32),
}

pub type CdcResult<T> = Result<T, CdcError>;
