//! Status partition engine
//!
//! Fans lookups for a subject set out to one provider with bounded
//! concurrency, waits for every lookup to finish, then classifies each
//! subject into exactly one bucket.

use super::types::{LookupFailure, StatusPartition, UnresolvedPolicy};
use crate::engine::metrics::MetricsCollector;
use crate::error::{AuditError, LookupError, Result};
use crate::provider::{AccountStatusProvider, LookupResult};
use crate::types::{StatusBucket, Subject, SubjectStatus};
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Partition engine configuration
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Maximum lookups in flight per provider
    pub concurrency: usize,

    /// Upper bound for a single lookup, and for the provider's setup
    pub lookup_timeout: Duration,

    /// Where failed lookups are placed
    pub unresolved: UnresolvedPolicy,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            lookup_timeout: Duration::from_secs(30),
            unresolved: UnresolvedPolicy::default(),
        }
    }
}

/// Status partition engine
#[derive(Debug, Clone, Default)]
pub struct PartitionEngine {
    config: PartitionConfig,
}

impl PartitionEngine {
    pub fn new(config: PartitionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Classify `subjects` by their state at `provider`
    ///
    /// Lookup failures never escape: each one is recorded against its
    /// subject and the subject lands in `deleted` or `unresolved` depending
    /// on [`UnresolvedPolicy`]. A transient setup failure is recorded the
    /// same way for every subject.
    ///
    /// # Errors
    ///
    /// A fatal setup failure (missing credentials, bad configuration) is
    /// returned instead of a partition, so an unreadable provider is never
    /// reported as "everyone deleted".
    pub async fn partition(
        &self,
        provider: &dyn AccountStatusProvider,
        subjects: &BTreeSet<Subject>,
        metrics: Option<&MetricsCollector>,
    ) -> Result<StatusPartition> {
        let name = provider.name().to_string();
        let mut partition =
            StatusPartition::empty(&name, provider.vocabulary(), self.config.unresolved);

        if subjects.is_empty() {
            debug!("{}: nothing to look up", name);
            return Ok(partition);
        }

        let timeout = self.config.lookup_timeout;

        let prepared = match tokio::time::timeout(timeout, provider.prepare()).await {
            Ok(prepared) => prepared,
            Err(_) => Err(AuditError::transport(format!(
                "setup timed out after {}ms",
                timeout.as_millis()
            ))),
        };

        if let Err(e) = prepared {
            if e.is_fatal() {
                warn!("{}: setup failed: {}", name, e);
                return Err(e);
            }

            warn!("{}: setup failed, {} subjects unresolved: {}", name, subjects.len(), e);
            let failure = LookupFailure {
                kind: "setup".to_string(),
                reason: format!("provider setup failed: {}", e),
            };
            for subject in subjects {
                self.place_failure(&mut partition, subject.clone(), failure.clone());
            }
            return Ok(partition);
        }

        let concurrency = self.config.concurrency.max(1);

        let outcomes: Vec<(Subject, LookupResult)> = stream::iter(subjects.iter().cloned())
            .map(|subject| async move {
                let started = Instant::now();
                let outcome = match tokio::time::timeout(timeout, provider.lookup(&subject)).await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(LookupError::Timeout(timeout)),
                };

                if let Some(metrics) = metrics {
                    metrics.record_lookup(&outcome, started.elapsed()).await;
                }

                (subject, outcome)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        provider.release().await;

        let vocabulary = provider.vocabulary();
        for (subject, outcome) in outcomes {
            match outcome {
                Ok(SubjectStatus::Unresolved { reason }) => {
                    let failure = LookupFailure {
                        kind: "unresolved".to_string(),
                        reason,
                    };
                    self.place_failure(&mut partition, subject, failure);
                }
                Ok(status) if !vocabulary.contains(&status.bucket()) => {
                    let error = LookupError::Data(format!(
                        "status {} outside provider vocabulary",
                        status.bucket()
                    ));
                    self.place_failure(&mut partition, subject, LookupFailure::from(&error));
                }
                Ok(status) => {
                    partition.place(status.bucket(), subject.clone());
                    partition.statuses.insert(subject, status);
                }
                Err(LookupError::NotFound) => {
                    partition.place(StatusBucket::Deleted, subject);
                }
                Err(error) => {
                    debug!("{}: lookup of {} failed: {}", name, subject, error);
                    self.place_failure(&mut partition, subject, LookupFailure::from(&error));
                }
            }
        }

        info!(
            "{}: partitioned {} subjects ({} lookup failures)",
            name,
            partition.len(),
            partition.failures.len()
        );

        Ok(partition)
    }

    fn place_failure(&self, partition: &mut StatusPartition, subject: Subject, failure: LookupFailure) {
        let bucket = match self.config.unresolved {
            UnresolvedPolicy::FoldIntoDeleted => StatusBucket::Deleted,
            UnresolvedPolicy::Separate => StatusBucket::Unresolved,
        };
        partition.place(bucket, subject.clone());
        partition.failures.insert(subject, failure);
    }
}
