//! Shared HTTP plumbing for API-backed providers

use crate::error::Result;
use accessaudit::{AuditError, LookupError};
use accessaudit_vault::SecretStore;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Default per-request timeout
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the client shared by every API provider in a run
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("accessaudit/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Map a failed request onto the lookup taxonomy
pub fn request_error(e: reqwest::Error) -> LookupError {
    if e.is_timeout() {
        LookupError::Transport(format!("request timed out: {}", e))
    } else if e.is_decode() {
        LookupError::Data(e.to_string())
    } else {
        LookupError::Transport(e.to_string())
    }
}

/// Map a non-success HTTP status onto the lookup taxonomy
pub fn status_error(status: StatusCode, body: &str) -> LookupError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.chars().take(200).collect::<String>())
    };

    match status {
        StatusCode::NOT_FOUND => LookupError::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LookupError::Denied(detail),
        StatusCode::TOO_MANY_REQUESTS => LookupError::Transport(format!("rate limited: {}", detail)),
        s if s.is_server_error() => LookupError::Transport(detail),
        _ => LookupError::Data(detail),
    }
}

/// API token fetched from the secret store for the duration of a run
///
/// Loaded in the provider's `prepare` and dropped in `release`.
pub struct BearerToken {
    store: Arc<dyn SecretStore>,
    secret: String,
    token: RwLock<Option<String>>,
}

impl BearerToken {
    pub fn new(store: Arc<dyn SecretStore>, secret: impl Into<String>) -> Self {
        Self {
            store,
            secret: secret.into(),
            token: RwLock::new(None),
        }
    }

    /// Name of the secret holding the token
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Fetch the token
    pub async fn load(&self) -> accessaudit::Result<()> {
        let token = self
            .store
            .get_secret(&self.secret)
            .await
            .map_err(|e| AuditError::Secret(format!("{}: {}", self.secret, e)))?;

        debug!("Loaded token {}", self.secret);
        *self.token.write().await = Some(token);
        Ok(())
    }

    /// Current token; lookups before `load` are denied
    pub async fn get(&self) -> std::result::Result<String, LookupError> {
        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| LookupError::Denied(format!("token {} not loaded", self.secret)))
    }

    /// Forget the token
    pub async fn clear(&self) {
        *self.token.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accessaudit_vault::InMemorySecretStore;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_error(StatusCode::NOT_FOUND, ""), LookupError::NotFound);
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "Not Authorized to access this resource/api"),
            LookupError::Denied(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, ""),
            LookupError::Transport(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            LookupError::Transport(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "invalid"),
            LookupError::Data(_)
        ));
    }

    #[tokio::test]
    async fn test_token_lifecycle() {
        let store = Arc::new(InMemorySecretStore::new().with_secret("slackToken", "xoxb-1"));
        let token = BearerToken::new(store, "slackToken");

        assert!(matches!(token.get().await, Err(LookupError::Denied(_))));
        token.load().await.unwrap();
        assert_eq!(token.get().await.unwrap(), "xoxb-1");
        token.clear().await;
        assert!(token.get().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_token_is_secret_error() {
        let token = BearerToken::new(Arc::new(InMemorySecretStore::new()), "kolideToken");
        assert!(matches!(token.load().await, Err(AuditError::Secret(_))));
    }
}
