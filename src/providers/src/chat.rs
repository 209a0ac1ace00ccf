//! Chat service provider (Slack `users.lookupByEmail`)

use crate::http::{request_error, status_error, BearerToken};
use accessaudit::provider::{LookupResult, ACTIVE_DELETED};
use accessaudit::{AccountStatusProvider, LookupError, StatusBucket, Subject, SubjectStatus};
use accessaudit_vault::SecretStore;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub const DEFAULT_CHAT_URL: &str = "https://slack.com";
pub const DEFAULT_CHAT_SECRET: &str = "slackToken";

#[derive(Debug, Deserialize)]
struct LookupResponse {
    ok: bool,

    #[serde(default)]
    error: Option<String>,

    #[serde(default)]
    user: Option<ChatUser>,
}

#[derive(Debug, Deserialize)]
struct ChatUser {
    #[serde(default)]
    deleted: bool,
}

fn classify(response: LookupResponse) -> LookupResult {
    if response.ok {
        let deactivated = response.user.map(|u| u.deleted).unwrap_or(false);
        return Ok(if deactivated {
            SubjectStatus::Deleted
        } else {
            SubjectStatus::active()
        });
    }

    let error = response.error.unwrap_or_else(|| "unknown_error".to_string());
    Err(match error.as_str() {
        "users_not_found" => LookupError::NotFound,
        "not_authed" | "invalid_auth" | "account_inactive" | "token_revoked"
        | "token_expired" | "missing_scope" | "no_permission" => LookupError::Denied(error),
        "ratelimited" | "request_timeout" | "service_unavailable" | "fatal_error"
        | "internal_error" => LookupError::Transport(error),
        _ => LookupError::Data(error),
    })
}

pub struct ChatProvider {
    client: reqwest::Client,
    base_url: String,
    token: BearerToken,
}

impl ChatProvider {
    pub fn new(client: reqwest::Client, store: Arc<dyn SecretStore>, secret: &str) -> Self {
        Self {
            client,
            base_url: DEFAULT_CHAT_URL.to_string(),
            token: BearerToken::new(store, secret),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl AccountStatusProvider for ChatProvider {
    fn name(&self) -> &str {
        "chat"
    }

    fn vocabulary(&self) -> &'static [StatusBucket] {
        ACTIVE_DELETED
    }

    async fn prepare(&self) -> accessaudit::Result<()> {
        self.token.load().await
    }

    async fn lookup(&self, subject: &Subject) -> LookupResult {
        let token = self.token.get().await?;

        let response = self
            .client
            .get(format!("{}/api/users.lookupByEmail", self.base_url))
            .bearer_auth(token)
            .query(&[("email", subject.identity())])
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Data(e.to_string()))?;

        classify(body)
    }

    async fn release(&self) {
        self.token.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> LookupResult {
        classify(serde_json::from_str(raw).unwrap())
    }

    #[test]
    fn test_classify_responses() {
        assert_eq!(
            parse(r#"{"ok":true,"user":{"id":"U1","deleted":false}}"#),
            Ok(SubjectStatus::active())
        );
        assert_eq!(
            parse(r#"{"ok":true,"user":{"id":"U1","deleted":true}}"#),
            Ok(SubjectStatus::Deleted)
        );
        assert_eq!(
            parse(r#"{"ok":false,"error":"users_not_found"}"#),
            Err(LookupError::NotFound)
        );
        assert!(matches!(
            parse(r#"{"ok":false,"error":"invalid_auth"}"#),
            Err(LookupError::Denied(_))
        ));
        assert!(matches!(
            parse(r#"{"ok":false,"error":"ratelimited"}"#),
            Err(LookupError::Transport(_))
        ));
        assert!(matches!(parse(r#"{"ok":false}"#), Err(LookupError::Data(_))));
    }
}
