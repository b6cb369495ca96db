use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required: please sign in to save listings")]
    AuthenticationRequired,

    #[error("Remote store returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Remote operation failed: {0}")]
    RemoteOperationFailed(String),

    #[error("Remote operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AppError {
    /// True for every failure that originated at (or on the way to) the remote store.
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            AppError::Remote { .. }
                | AppError::Http(_)
                | AppError::Decode(_)
                | AppError::RemoteOperationFailed(_)
                | AppError::Timeout(_)
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_failure_grouping() {
        assert!(AppError::Remote { status: 500, message: "boom".into() }.is_remote_failure());
        assert!(AppError::Timeout(Duration::from_secs(1)).is_remote_failure());
        assert!(!AppError::AuthenticationRequired.is_remote_failure());
        assert!(!AppError::Config("x".into()).is_remote_failure());
    }
}
