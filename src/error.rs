use thiserror::Error;

use crate::session::Stage;

/// Errors produced while reading, analyzing or repackaging an archive.
#[derive(Debug, Error)]
pub enum Error {
    /// The source archive could not be decoded (corrupt, truncated or not a ZIP).
    #[error("cannot decode archive: {0}")]
    Decode(String),

    /// The output archive could not be generated.
    #[error("cannot build output archive: {0}")]
    Output(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A workflow step was requested from a stage that does not allow it.
    #[error("cannot {action} while {stage}")]
    InvalidTransition { action: &'static str, stage: Stage },
}

impl Error {
    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }

    pub(crate) fn output(msg: impl Into<String>) -> Self {
        Error::Output(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
