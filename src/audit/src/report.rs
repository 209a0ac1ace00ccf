//! Reconciliation report
//!
//! Pure aggregation of roster diffs and status partitions for one run. The
//! report never feeds back into either engine.

use crate::diff::RosterDiff;
use crate::engine::metrics::ProviderStats;
use crate::partition::StatusPartition;
use crate::roster::{DepartureSet, DepartureWindow};
use crate::types::{StatusBucket, Subject};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Outcome of reconciling one host
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HostReport {
    /// Host was reachable and fully listed
    Reconciled(RosterDiff),

    /// Host could not be reconciled; nothing about its access is known
    Failed { host: String, error: String },
}

impl HostReport {
    pub fn host(&self) -> &str {
        match self {
            HostReport::Reconciled(diff) => &diff.host,
            HostReport::Failed { host, .. } => host,
        }
    }

    pub fn diff(&self) -> Option<&RosterDiff> {
        match self {
            HostReport::Reconciled(diff) => Some(diff),
            HostReport::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, HostReport::Failed { .. })
    }
}

/// Partition of one provider plus lookup statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderReport {
    #[serde(flatten)]
    pub partition: StatusPartition,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ProviderStats>,
}

/// Structured result of one reconciliation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    /// Unique run identifier
    pub run_id: Uuid,

    /// When the report was assembled
    pub generated_at: DateTime<Utc>,

    /// Departure window, for offboarding runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<DepartureWindow>,

    /// Departures extracted from the issue tracker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departures: Option<DepartureSet>,

    /// Per-host roster diffs, in host order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<HostReport>,

    /// Per-provider partitions, in provider order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<ProviderReport>,
}

impl ReconciliationReport {
    pub fn builder() -> ReportBuilder {
        ReportBuilder::new()
    }

    /// Report for `host`
    pub fn host(&self, host: &str) -> Option<&HostReport> {
        self.hosts.iter().find(|report| report.host() == host)
    }

    /// Report for the provider called `name`
    pub fn provider(&self, name: &str) -> Option<&ProviderReport> {
        self.providers
            .iter()
            .find(|report| report.partition.provider == name)
    }

    /// Providers still reporting `subject` as active
    pub fn active_at(&self, subject: &Subject) -> Vec<&str> {
        self.providers
            .iter()
            .filter(|report| report.partition.contains(StatusBucket::Active, subject))
            .map(|report| report.partition.provider.as_str())
            .collect()
    }

    /// Nothing to act on: every host clean and reachable, no lookup failures
    pub fn is_clean(&self) -> bool {
        self.hosts
            .iter()
            .all(|report| report.diff().map(RosterDiff::is_clean).unwrap_or(false))
            && self
                .providers
                .iter()
                .all(|report| report.partition.failures.is_empty())
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Assembles a [`ReconciliationReport`]
#[derive(Debug, Default)]
pub struct ReportBuilder {
    window: Option<DepartureWindow>,
    departures: Option<DepartureSet>,
    hosts: Vec<HostReport>,
    providers: Vec<ProviderReport>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(mut self, window: DepartureWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn departures(mut self, departures: DepartureSet) -> Self {
        self.departures = Some(departures);
        self
    }

    pub fn host(mut self, report: HostReport) -> Self {
        self.hosts.push(report);
        self
    }

    pub fn hosts(mut self, reports: impl IntoIterator<Item = HostReport>) -> Self {
        self.hosts.extend(reports);
        self
    }

    pub fn provider(mut self, partition: StatusPartition, stats: Option<ProviderStats>) -> Self {
        self.providers.push(ProviderReport { partition, stats });
        self
    }

    pub fn providers(mut self, reports: impl IntoIterator<Item = ProviderReport>) -> Self {
        self.providers.extend(reports);
        self
    }

    pub fn build(self) -> ReconciliationReport {
        ReconciliationReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            window: self.window,
            departures: self.departures,
            hosts: self.hosts,
            providers: self.providers,
        }
    }
}
