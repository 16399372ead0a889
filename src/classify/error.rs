use std::path::PathBuf;

use thiserror::Error;

use super::result::FailureCause;

/// Failure inside the classification boundary.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("cannot read image {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot decode image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),
    #[error("invalid model output: {0}")]
    Output(String),
    #[error("classifier backend panicked: {0}")]
    Panic(String),
}

impl ClassifyError {
    pub fn cause(&self) -> FailureCause {
        match self {
            ClassifyError::Unreadable { .. } => FailureCause::Unreadable,
            ClassifyError::Decode { .. } => FailureCause::Decode,
            ClassifyError::Inference(_) => FailureCause::Inference,
            ClassifyError::Output(_) => FailureCause::Output,
            ClassifyError::Panic(_) => FailureCause::Panic,
        }
    }
}
