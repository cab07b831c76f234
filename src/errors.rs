use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("sign-in required before using this feature")]
    Unauthenticated,
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Keychain(#[from] keyring::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("map provider unavailable")]
    MapUnavailable,
    #[error("{0}")]
    Config(String),
}

impl AppError {
    /// Transport and non-2xx failures. The session absorbs these for
    /// recommendation and history fetches instead of surfacing them.
    pub fn is_request_failure(&self) -> bool {
        matches!(self, AppError::Request(_))
    }
}
