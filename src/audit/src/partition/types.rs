//! Status partition types

use crate::error::LookupError;
use crate::types::{StatusBucket, Subject, SubjectStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Where failed lookups are placed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    /// Failed lookups land in `deleted` alongside confirmed absences
    #[default]
    FoldIntoDeleted,

    /// Failed lookups get their own `unresolved` bucket
    Separate,
}

/// Recorded lookup failure for one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupFailure {
    /// Machine-readable kind (denied, transport, data, timeout, setup)
    pub kind: String,

    /// Human-readable reason
    pub reason: String,
}

impl From<&LookupError> for LookupFailure {
    fn from(error: &LookupError) -> Self {
        Self {
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }
}

/// Classification of a subject set into one provider's status buckets
///
/// Buckets are pairwise disjoint and their union is exactly the input set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPartition {
    /// Provider that answered
    pub provider: String,

    /// Subjects per bucket; every bucket of the provider's vocabulary is present
    pub buckets: BTreeMap<StatusBucket, BTreeSet<Subject>>,

    /// Confirmed statuses (with last sign-in or evidence where available)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub statuses: BTreeMap<Subject, SubjectStatus>,

    /// Subjects whose state could not be confirmed, whatever bucket they landed in
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<Subject, LookupFailure>,
}

impl StatusPartition {
    /// Empty partition with one bucket per vocabulary entry
    pub fn empty(
        provider: impl Into<String>,
        vocabulary: &[StatusBucket],
        policy: UnresolvedPolicy,
    ) -> Self {
        let mut buckets: BTreeMap<StatusBucket, BTreeSet<Subject>> = vocabulary
            .iter()
            .map(|bucket| (*bucket, BTreeSet::new()))
            .collect();

        buckets.entry(StatusBucket::Deleted).or_default();
        if policy == UnresolvedPolicy::Separate {
            buckets.entry(StatusBucket::Unresolved).or_default();
        }

        Self {
            provider: provider.into(),
            buckets,
            statuses: BTreeMap::new(),
            failures: BTreeMap::new(),
        }
    }

    /// Subjects in `bucket` (empty when the bucket is not in the vocabulary)
    pub fn bucket(&self, bucket: StatusBucket) -> impl Iterator<Item = &Subject> {
        self.buckets.get(&bucket).into_iter().flatten()
    }

    /// Check whether `subject` landed in `bucket`
    pub fn contains(&self, bucket: StatusBucket, subject: &Subject) -> bool {
        self.buckets
            .get(&bucket)
            .map(|subjects| subjects.contains(subject))
            .unwrap_or(false)
    }

    /// Bucket holding `subject`
    pub fn bucket_of(&self, subject: &Subject) -> Option<StatusBucket> {
        self.buckets
            .iter()
            .find(|(_, subjects)| subjects.contains(subject))
            .map(|(bucket, _)| *bucket)
    }

    /// Total number of classified subjects
    pub fn len(&self) -> usize {
        self.buckets.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether `subject`'s lookup failed (as opposed to confirmed absence)
    pub fn is_unconfirmed(&self, subject: &Subject) -> bool {
        self.failures.contains_key(subject)
    }

    /// Subjects in `deleted` that the provider actually confirmed absent
    pub fn confirmed_deleted(&self) -> impl Iterator<Item = &Subject> {
        self.bucket(StatusBucket::Deleted)
            .filter(move |subject| !self.failures.contains_key(*subject))
    }

    pub(crate) fn place(&mut self, bucket: StatusBucket, subject: Subject) {
        self.buckets.entry(bucket).or_default().insert(subject);
    }
}
