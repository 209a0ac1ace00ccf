//! Directory service provider (Google Workspace Admin SDK)
//!
//! `GET /admin/directory/v1/users/{userKey}`: a `suspended` flag decides
//! between active and suspended, `lastLoginTime` is carried on active
//! accounts, and 404 is a confirmed absence.

use crate::http::{request_error, status_error, BearerToken};
use accessaudit::provider::{LookupResult, ACTIVE_SUSPENDED_DELETED};
use accessaudit::{AccountStatusProvider, LookupError, StatusBucket, Subject, SubjectStatus};
use accessaudit_vault::SecretStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

pub const DEFAULT_DIRECTORY_URL: &str = "https://admin.googleapis.com";

/// Default secret holding an OAuth access token for the directory API
pub const DEFAULT_DIRECTORY_SECRET: &str = "googleToken";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryUser {
    #[serde(default)]
    suspended: bool,

    #[serde(default)]
    last_login_time: Option<String>,
}

/// Parse `lastLoginTime`; the epoch means the account never signed in
fn parse_last_login(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw?).ok()?.with_timezone(&Utc);
    (parsed.timestamp() > 0).then_some(parsed)
}

pub struct DirectoryProvider {
    client: reqwest::Client,
    base_url: String,
    token: BearerToken,
}

impl DirectoryProvider {
    pub fn new(client: reqwest::Client, store: Arc<dyn SecretStore>, secret: &str) -> Self {
        Self {
            client,
            base_url: DEFAULT_DIRECTORY_URL.to_string(),
            token: BearerToken::new(store, secret),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl AccountStatusProvider for DirectoryProvider {
    fn name(&self) -> &str {
        "directory"
    }

    fn vocabulary(&self) -> &'static [StatusBucket] {
        ACTIVE_SUSPENDED_DELETED
    }

    async fn prepare(&self) -> accessaudit::Result<()> {
        self.token.load().await
    }

    async fn lookup(&self, subject: &Subject) -> LookupResult {
        let token = self.token.get().await?;
        let url = format!(
            "{}/admin/directory/v1/users/{}",
            self.base_url,
            subject.identity()
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let user: DirectoryUser = response
            .json()
            .await
            .map_err(|e| LookupError::Data(e.to_string()))?;

        if user.suspended {
            Ok(SubjectStatus::Suspended)
        } else {
            Ok(SubjectStatus::active_since(parse_last_login(
                user.last_login_time.as_deref(),
            )))
        }
    }

    async fn release(&self) {
        self.token.clear().await;
    }
}
