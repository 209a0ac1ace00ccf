//! Error types for provider adapters

use accessaudit::{AuditError, LookupError};
use accessaudit_vault::VaultError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Secret error: {0}")]
    Secret(#[from] VaultError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProviderError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        ProviderError::Configuration(msg.into())
    }
}

impl From<ProviderError> for AuditError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Configuration(msg) => AuditError::Configuration(msg),
            ProviderError::Secret(e) => AuditError::Secret(e.to_string()),
            ProviderError::Http(e) => AuditError::Transport(e.to_string()),
        }
    }
}

/// Map a secrets failure met during a lookup onto the lookup taxonomy
pub fn lookup_error_from_vault(e: VaultError) -> LookupError {
    match e {
        VaultError::NotFound(_) => LookupError::NotFound,
        VaultError::Session(msg) => LookupError::Denied(msg),
        VaultError::Parse(msg) | VaultError::Empty(msg) => LookupError::Data(msg),
        VaultError::Command(msg) => LookupError::Transport(msg),
        VaultError::Io(e) => LookupError::Transport(e.to_string()),
    }
}
