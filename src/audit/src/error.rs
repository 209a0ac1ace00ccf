//! Error types for the reconciliation engine

use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;

/// Reconciliation errors
#[derive(Debug, Error)]
pub enum AuditError {
    /// Invalid configuration or departure window (fatal, pre-flight)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No offboarding record closed inside the window
    #[error("No offboarding issues closed between {start} and {end}")]
    NoDepartures { start: NaiveDate, end: NaiveDate },

    /// SSH-level failure reaching a host
    #[error("Host unreachable: {host}: {reason}")]
    HostUnreachable { host: String, reason: String },

    /// Network or authentication failure reaching a collaborator
    #[error("Transport error: {0}")]
    Transport(String),

    /// Collaborator answered with an unexpected shape
    #[error("Malformed response: {0}")]
    Data(String),

    /// Secret retrieval failure
    #[error("Secret error: {0}")]
    Secret(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuditError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        AuditError::Configuration(msg.into())
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        AuditError::Transport(msg.into())
    }

    /// Create a malformed-response error
    pub fn data<S: Into<String>>(msg: S) -> Self {
        AuditError::Data(msg.into())
    }

    /// Create a host unreachable error
    pub fn host_unreachable<H: Into<String>, S: Into<String>>(host: H, reason: S) -> Self {
        AuditError::HostUnreachable {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Errors that must stop the run before any report is emitted
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AuditError::Configuration(_)
                | AuditError::NoDepartures { .. }
                | AuditError::Secret(_)
                | AuditError::Internal(_)
        )
    }
}

/// Per-subject lookup failure at a provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// Provider confirms the account does not exist
    #[error("account not found")]
    NotFound,

    /// Provider refused the query
    #[error("access denied: {0}")]
    Denied(String),

    /// Network or authentication failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Response had an unexpected shape
    #[error("malformed response: {0}")]
    Data(String),

    /// No answer within the configured bound
    #[error("lookup timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl LookupError {
    /// Only a provider's explicit "not found" is a confirmed absence
    pub fn is_confirmed_absence(&self) -> bool {
        matches!(self, LookupError::NotFound)
    }

    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            LookupError::NotFound => "not_found",
            LookupError::Denied(_) => "denied",
            LookupError::Transport(_) => "transport",
            LookupError::Data(_) => "data",
            LookupError::Timeout(_) => "timeout",
        }
    }
}

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, AuditError>;
