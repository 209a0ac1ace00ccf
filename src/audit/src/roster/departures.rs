//! Departure extraction from an issue tracker

use super::window::DepartureWindow;
use crate::error::{AuditError, Result};
use crate::types::Subject;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Default label carried by offboarding issues
pub const DEFAULT_OFFBOARDING_LABEL: &str = "offboarding";

/// Closed issue as returned by the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue number
    pub number: u64,

    /// Free-text body, searched for the departing identity
    #[serde(default)]
    pub body: Option<String>,

    /// When the issue was closed
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,

    /// Trackers that list pull requests alongside issues flag them here
    #[serde(default)]
    pub is_pull_request: bool,
}

impl Issue {
    pub fn new(number: u64, body: impl Into<String>, closed_at: DateTime<Utc>) -> Self {
        Self {
            number,
            body: Some(body.into()),
            closed_at: Some(closed_at),
            is_pull_request: false,
        }
    }
}

/// Issue tracker collaborator
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// List closed issues carrying `label`, updated since `since`
    async fn list_closed_issues(&self, label: &str, since: DateTime<Utc>) -> Result<Vec<Issue>>;
}

/// Departed subject and the offboarding record that closed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Departure {
    pub subject: Subject,
    pub closed_at: DateTime<Utc>,
    pub issue: u64,
}

/// Departures keyed by subject
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepartureSet {
    departures: BTreeMap<Subject, Departure>,
}

impl DepartureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a departure; a later record for the same subject replaces the earlier one
    pub fn record(&mut self, departure: Departure) -> Option<Departure> {
        self.departures.insert(departure.subject.clone(), departure)
    }

    pub fn get(&self, subject: &Subject) -> Option<&Departure> {
        self.departures.get(subject)
    }

    pub fn len(&self) -> usize {
        self.departures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.departures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Departure> {
        self.departures.values()
    }

    /// Subjects in stable order
    pub fn subjects(&self) -> impl Iterator<Item = &Subject> {
        self.departures.keys()
    }
}

/// Extracts departed subjects from offboarding issues
#[derive(Debug, Clone)]
pub struct DepartureExtractor {
    pattern: Regex,
    label: String,
}

impl DepartureExtractor {
    /// Create an extractor matching `<local>@<domain>` in issue bodies
    pub fn new(domain: &str, label: impl Into<String>) -> Result<Self> {
        let domain = domain.trim();
        if domain.is_empty() {
            return Err(AuditError::configuration("email domain cannot be empty"));
        }

        let pattern = Regex::new(&format!(
            r"(?i)(?:[a-z]{{1,30}}|\.){{1,7}}@{}",
            regex::escape(domain)
        ))
        .map_err(|e| AuditError::configuration(format!("invalid identity pattern: {}", e)))?;

        Ok(Self {
            pattern,
            label: label.into(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// First domain-qualified identity in `body`
    pub fn extract_subject(&self, body: &str) -> Option<Subject> {
        self.pattern.find(body).map(|m| Subject::new(m.as_str()))
    }

    /// Build the departure set for `window`
    ///
    /// # Errors
    ///
    /// - Tracker failures are propagated
    /// - [`AuditError::NoDepartures`] when no issue closed inside the window
    pub async fn extract(
        &self,
        window: &DepartureWindow,
        tracker: &dyn IssueTracker,
    ) -> Result<DepartureSet> {
        let issues = tracker
            .list_closed_issues(&self.label, window.since())
            .await?;

        debug!("Issue tracker returned {} closed '{}' issues", issues.len(), self.label);

        let mut departures = DepartureSet::new();
        let mut in_window = 0usize;

        for issue in issues {
            if issue.is_pull_request {
                continue;
            }

            let Some(closed_at) = issue.closed_at else {
                continue;
            };

            if !window.contains(closed_at.date_naive()) {
                continue;
            }

            in_window += 1;

            match issue.body.as_deref().and_then(|body| self.extract_subject(body)) {
                Some(subject) => {
                    if let Some(previous) = departures.record(Departure {
                        subject,
                        closed_at,
                        issue: issue.number,
                    }) {
                        debug!(
                            "Issue #{} supersedes #{} for {}",
                            issue.number, previous.issue, previous.subject
                        );
                    }
                }
                None => warn!("No email found in issue #{}", issue.number),
            }
        }

        if in_window == 0 {
            return Err(AuditError::NoDepartures {
                start: window.start(),
                end: window.effective_end(),
            });
        }

        info!(
            "Extracted {} departures from {} offboarding issues between {} and {}",
            departures.len(),
            in_window,
            window.start(),
            window.effective_end()
        );

        Ok(departures)
    }
}

/// Extract departures with the default offboarding label
pub async fn extract_departures(
    window: &DepartureWindow,
    tracker: &dyn IssueTracker,
    domain: &str,
) -> Result<DepartureSet> {
    DepartureExtractor::new(domain, DEFAULT_OFFBOARDING_LABEL)?
        .extract(window, tracker)
        .await
}
