//! GitHub issue tracker
//!
//! Lists closed issues of one repository through the REST API, following
//! pagination. Pull requests come back from the same endpoint and are
//! flagged so the extractor can skip them.

use crate::error::{ProviderError, Result as ProviderResult};
use accessaudit::{AuditError, Issue, IssueTracker};
use accessaudit_vault::SecretStore;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_GITHUB_URL: &str = "https://api.github.com";
pub const DEFAULT_GITHUB_SECRET: &str = "githubToken";

const PER_PAGE: usize = 100;
const MAX_PAGES: u32 = 50;

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: u64,

    #[serde(default)]
    body: Option<String>,

    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl From<RawIssue> for Issue {
    fn from(raw: RawIssue) -> Self {
        Issue {
            number: raw.number,
            body: raw.body,
            closed_at: raw.closed_at,
            is_pull_request: raw.pull_request.is_some(),
        }
    }
}

pub struct GitHubIssueTracker {
    client: reqwest::Client,
    base_url: String,
    repository: String,
    store: Arc<dyn SecretStore>,
    secret: String,
}

impl GitHubIssueTracker {
    /// Tracker for `owner/repo`
    pub fn new(
        client: reqwest::Client,
        repository: &str,
        store: Arc<dyn SecretStore>,
        secret: &str,
    ) -> ProviderResult<Self> {
        let repository = repository.trim().trim_matches('/');
        match repository.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {}
            _ => {
                return Err(ProviderError::configuration(format!(
                    "repository '{}' must be owner/repo",
                    repository
                )))
            }
        }

        Ok(Self {
            client,
            base_url: DEFAULT_GITHUB_URL.to_string(),
            repository: repository.to_string(),
            store,
            secret: secret.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_page(
        &self,
        token: &str,
        label: &str,
        since: &str,
        page: u32,
    ) -> accessaudit::Result<Vec<RawIssue>> {
        let url = format!("{}/repos/{}/issues", self.base_url, self.repository);
        let page = page.to_string();
        let per_page = PER_PAGE.to_string();

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
            .header(reqwest::header::AUTHORIZATION, format!("token {}", token))
            .query(&[
                ("state", "closed"),
                ("labels", label),
                ("since", since),
                ("per_page", per_page.as_str()),
                ("page", page.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuditError::transport(format!("{}: {}", self.repository, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuditError::transport(format!(
                "{}: {} {}",
                self.repository,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuditError::data(format!("{}: {}", self.repository, e)))
    }
}

#[async_trait]
impl IssueTracker for GitHubIssueTracker {
    async fn list_closed_issues(
        &self,
        label: &str,
        since: DateTime<Utc>,
    ) -> accessaudit::Result<Vec<Issue>> {
        let token = self
            .store
            .get_secret(&self.secret)
            .await
            .map_err(|e| AuditError::Secret(format!("{}: {}", self.secret, e)))?;

        let since = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut issues = Vec::new();

        for page in 1..=MAX_PAGES {
            let batch = self.fetch_page(&token, label, &since, page).await?;
            let count = batch.len();
            debug!("{}: page {} returned {} issues", self.repository, page, count);

            issues.extend(batch.into_iter().map(Issue::from));
            if count < PER_PAGE {
                break;
            }
        }

        Ok(issues)
    }
}
