//! Provider adapter capability and an in-memory implementation

use crate::error::{LookupError, Result};
use crate::types::{StatusBucket, Subject, SubjectStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Lookup outcome for one subject at one provider
pub type LookupResult = std::result::Result<SubjectStatus, LookupError>;

/// Account status provider
///
/// One implementation per external system. Each maps its own status
/// vocabulary onto [`SubjectStatus`]; authentication is internal to the
/// adapter.
#[async_trait]
pub trait AccountStatusProvider: Send + Sync {
    /// Provider name used in reports (e.g., "directory")
    fn name(&self) -> &str;

    /// Closed set of buckets this provider can report
    fn vocabulary(&self) -> &'static [StatusBucket];

    /// One-time setup before lookups fan out (credential acquisition etc.)
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Look up the current account state of `subject`
    async fn lookup(&self, subject: &Subject) -> LookupResult;

    /// Teardown after all lookups completed
    async fn release(&self) {}
}

/// Vocabulary of providers that report active, suspended or deleted
pub const ACTIVE_SUSPENDED_DELETED: &[StatusBucket] = &[
    StatusBucket::Active,
    StatusBucket::Suspended,
    StatusBucket::Deleted,
];

/// Vocabulary of providers that only know whether an account exists
pub const ACTIVE_DELETED: &[StatusBucket] = &[StatusBucket::Active, StatusBucket::Deleted];

/// Vocabulary of device-management providers
pub const ACTIVE_ARCHIVED_DELETED: &[StatusBucket] = &[
    StatusBucket::Active,
    StatusBucket::Archived,
    StatusBucket::Deleted,
];

/// In-memory provider with fixed answers
///
/// Subjects without an answer are reported as not found.
pub struct StaticStatusProvider {
    name: String,
    vocabulary: &'static [StatusBucket],
    answers: HashMap<Subject, LookupResult>,
    delays: HashMap<Subject, Duration>,
    lookups: AtomicUsize,
}

impl StaticStatusProvider {
    /// Create a provider with the active/suspended/deleted vocabulary
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vocabulary: ACTIVE_SUSPENDED_DELETED,
            answers: HashMap::new(),
            delays: HashMap::new(),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Replace the vocabulary
    pub fn with_vocabulary(mut self, vocabulary: &'static [StatusBucket]) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Answer `status` for `subject`
    pub fn with_status(mut self, subject: impl Into<Subject>, status: SubjectStatus) -> Self {
        self.answers.insert(subject.into(), Ok(status));
        self
    }

    /// Fail lookups of `subject` with `error`
    pub fn with_failure(mut self, subject: impl Into<Subject>, error: LookupError) -> Self {
        self.answers.insert(subject.into(), Err(error));
        self
    }

    /// Delay the answer for `subject`
    pub fn with_delay(mut self, subject: impl Into<Subject>, delay: Duration) -> Self {
        self.delays.insert(subject.into(), delay);
        self
    }

    /// Number of lookups served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountStatusProvider for StaticStatusProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn vocabulary(&self) -> &'static [StatusBucket] {
        self.vocabulary
    }

    async fn lookup(&self, subject: &Subject) -> LookupResult {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(subject) {
            tokio::time::sleep(*delay).await;
        }

        self.answers
            .get(subject)
            .cloned()
            .unwrap_or(Err(LookupError::NotFound))
    }
}
