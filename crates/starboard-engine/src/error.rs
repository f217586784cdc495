use thiserror::Error;

use crate::platform::PlatformError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl EngineError {
    pub fn is_integrity_violation(&self) -> bool {
        match self {
            EngineError::Store(e) => starboard_db::is_integrity_violation(e),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
