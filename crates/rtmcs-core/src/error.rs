use thiserror::Error;

use crate::ports::BlobError;

#[derive(Debug, Error)]
pub enum RtmcsError {
    /// Blob store に届かなかった（ネットワーク / IO）
    #[error("blob store transport failure: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed payload: {0}")]
    Parse(String),
}

impl From<BlobError> for RtmcsError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound { key } => RtmcsError::NotFound(key),
            BlobError::Transport(msg) => RtmcsError::Transport(msg),
        }
    }
}

impl From<serde_json::Error> for RtmcsError {
    fn from(err: serde_json::Error) -> Self {
        RtmcsError::Parse(err.to_string())
    }
}
