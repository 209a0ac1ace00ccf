//! Error types for the secrets crate

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Secret has no usable value: {0}")]
    Empty(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Malformed item: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// The store answered that `name` does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::NotFound(_))
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Parse(e.to_string())
    }
}
