use crate::services::ranking::RankingError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// A required table or model is not loaded. Callers may retry later.
    #[error("Service not ready: {0}")]
    NotReady(String),

    #[error("Model loading error: {0}")]
    ModelLoad(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cold-start error: {0}")]
    ColdStart(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::NotReady(_))
    }
}

impl From<RankingError> for AppError {
    fn from(err: RankingError) -> Self {
        match err {
            RankingError::ModelLoadError(msg) => AppError::ModelLoad(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Artifact(format!("JSON decode failed: {}", err))
    }
}

impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        AppError::Artifact(format!("Bincode decode failed: {}", err))
    }
}
