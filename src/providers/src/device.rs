//! Device-management provider (Kolide `people?search=`)
//!
//! The search is fuzzy, so only profiles whose email equals the subject
//! count. No such profile is a confirmed absence; several profiles that
//! disagree on status are malformed data.

use crate::http::{request_error, status_error, BearerToken};
use accessaudit::provider::{LookupResult, ACTIVE_ARCHIVED_DELETED};
use accessaudit::{AccountStatusProvider, LookupError, StatusBucket, Subject, SubjectStatus};
use accessaudit_vault::SecretStore;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub const DEFAULT_DEVICE_URL: &str = "https://k2.kolide.com";
pub const DEFAULT_DEVICE_SECRET: &str = "kolideToken";

#[derive(Debug, Deserialize)]
struct PeopleResponse {
    #[serde(default)]
    data: Vec<Person>,
}

#[derive(Debug, Deserialize)]
struct Person {
    #[serde(default)]
    email: String,

    #[serde(default)]
    status: String,
}

fn same_identity(email: &str, subject: &Subject) -> bool {
    let candidate = Subject::new(email);
    match subject.domain() {
        Some(_) => candidate.identity() == subject.identity(),
        None => candidate == *subject,
    }
}

fn classify(subject: &Subject, response: PeopleResponse) -> LookupResult {
    let matches: Vec<&Person> = response
        .data
        .iter()
        .filter(|person| same_identity(&person.email, subject))
        .collect();

    let person = *matches.first().ok_or(LookupError::NotFound)?;
    if matches.iter().any(|other| other.status != person.status) {
        return Err(LookupError::Data(format!(
            "{} profiles for {} disagree on status",
            matches.len(),
            subject
        )));
    }

    match person.status.as_str() {
        "Active" => Ok(SubjectStatus::active()),
        "Archived" => Ok(SubjectStatus::Archived),
        other => Err(LookupError::Data(format!(
            "unknown profile status '{}' for {}",
            other, person.email
        ))),
    }
}

pub struct DeviceProvider {
    client: reqwest::Client,
    base_url: String,
    token: BearerToken,
}

impl DeviceProvider {
    pub fn new(client: reqwest::Client, store: Arc<dyn SecretStore>, secret: &str) -> Self {
        Self {
            client,
            base_url: DEFAULT_DEVICE_URL.to_string(),
            token: BearerToken::new(store, secret),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl AccountStatusProvider for DeviceProvider {
    fn name(&self) -> &str {
        "device"
    }

    fn vocabulary(&self) -> &'static [StatusBucket] {
        ACTIVE_ARCHIVED_DELETED
    }

    async fn prepare(&self) -> accessaudit::Result<()> {
        self.token.load().await
    }

    async fn lookup(&self, subject: &Subject) -> LookupResult {
        let token = self.token.get().await?;

        let response = self
            .client
            .get(format!("{}/api/v0/people", self.base_url))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("search", subject.identity())])
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let people: PeopleResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Data(e.to_string()))?;

        classify(subject, people)
    }

    async fn release(&self) {
        self.token.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(subject: &str, raw: &str) -> LookupResult {
        classify(&Subject::new(subject), serde_json::from_str(raw).unwrap())
    }

    #[test]
    fn test_classify_profiles() {
        assert_eq!(
            parse("a@example.com", r#"{"data":[{"email":"a@example.com","status":"Active"}]}"#),
            Ok(SubjectStatus::active())
        );
        assert_eq!(
            parse("a@example.com", r#"{"data":[{"email":"a@example.com","status":"Archived"}]}"#),
            Ok(SubjectStatus::Archived)
        );
        assert_eq!(parse("a@example.com", r#"{"data":[]}"#), Err(LookupError::NotFound));
        assert!(matches!(
            parse("a@example.com", r#"{"data":[{"email":"a@example.com","status":"Pending"}]}"#),
            Err(LookupError::Data(_))
        ));
    }

    #[test]
    fn test_only_exact_profile_counts() {
        let raw = r#"{"data":[
            {"email":"anna@example.com","status":"Active"},
            {"email":"ann@example.com","status":"Archived"}
        ]}"#;
        assert_eq!(parse("ann@example.com", raw), Ok(SubjectStatus::Archived));
    }

    #[test]
    fn test_fuzzy_match_is_not_the_subject() {
        let raw = r#"{"data":[{"email":"val@example.com","status":"Active"}]}"#;
        assert_eq!(parse("al@example.com", raw), Err(LookupError::NotFound));

        let raw = r#"{"data":[{"email":"al@contractor.example","status":"Active"}]}"#;
        assert_eq!(parse("al@example.com", raw), Err(LookupError::NotFound));
    }

    #[test]
    fn test_conflicting_profiles() {
        let raw = r#"{"data":[
            {"email":"al@example.com","status":"Active"},
            {"email":"AL@example.com","status":"Archived"}
        ]}"#;
        assert!(matches!(parse("al@example.com", raw), Err(LookupError::Data(_))));

        let raw = r#"{"data":[
            {"email":"al@example.com","status":"Archived"},
            {"email":"al@example.com","status":"Archived"}
        ]}"#;
        assert_eq!(parse("al@example.com", raw), Ok(SubjectStatus::Archived));
    }
}
