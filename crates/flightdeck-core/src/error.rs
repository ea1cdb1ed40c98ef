use thiserror::Error;

/// Errors produced by the core domain types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid flight status: {0}")]
    InvalidStatus(String),
}

impl CoreError {
    pub fn invalid_status(status: impl Into<String>) -> Self {
        Self::InvalidStatus(status.into())
    }
}
