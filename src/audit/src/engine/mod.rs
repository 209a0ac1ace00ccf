//! Run orchestration
//!
//! The [`Auditor`] wires roster, diff and partition together for one run:
//! hosts are reconciled one after another, providers are partitioned
//! concurrently, and the results are handed to the report builder.

pub mod metrics;

use crate::diff::{GrantListing, GrantSource, HostConnector, RosterDiffEngine};
use crate::error::{AuditError, Result};
use crate::partition::{PartitionConfig, PartitionEngine};
use crate::provider::AccountStatusProvider;
use crate::report::{HostReport, ProviderReport, ReconciliationReport, ReportBuilder};
use crate::roster::{DepartureExtractor, DepartureWindow, IssueTracker};
use crate::types::{Location, SourceOfTruth, Subject, DEFAULT_HOME_ROOT};
use async_trait::async_trait;
use futures::future::join_all;
use metrics::MetricsCollector;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use metrics::ProviderStats;

/// Run configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Partition engine settings shared by every provider
    pub partition: PartitionConfig,

    /// Root under which default user and role locations are derived
    pub home_root: String,

    /// Collect per-provider lookup statistics
    pub enable_metrics: bool,

    /// Upper bound for connecting to a host and for each command on it
    pub host_timeout: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            partition: PartitionConfig::default(),
            home_root: DEFAULT_HOME_ROOT.to_string(),
            enable_metrics: true,
            host_timeout: Duration::from_secs(60),
        }
    }
}

/// Reconciliation run orchestrator
pub struct Auditor {
    config: AuditConfig,
    diff_engine: RosterDiffEngine,
    partition_engine: PartitionEngine,
}

impl Auditor {
    pub fn new(config: AuditConfig) -> Self {
        let diff_engine = RosterDiffEngine::with_home_root(config.home_root.clone());
        let partition_engine = PartitionEngine::new(config.partition.clone());

        Self {
            config,
            diff_engine,
            partition_engine,
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Reconcile `truth` against one host
    ///
    /// Connection and listing failures are captured in the returned report;
    /// they never abort the run. Every call to the host is bounded by
    /// `host_timeout`; running over is a transport failure.
    pub async fn audit_host(
        &self,
        truth: &SourceOfTruth,
        connector: &dyn HostConnector,
        host: &str,
    ) -> HostReport {
        let timeout = self.config.host_timeout;
        let connected = match tokio::time::timeout(timeout, connector.connect(host)).await {
            Ok(connected) => connected,
            Err(_) => Err(AuditError::host_unreachable(
                host,
                format!("connect timed out after {}ms", timeout.as_millis()),
            )),
        };

        let source = match connected {
            Ok(source) => source,
            Err(e) => {
                warn!("{}: skipped: {}", host, e);
                return HostReport::Failed {
                    host: host.to_string(),
                    error: e.to_string(),
                };
            }
        };

        let bounded = BoundedSource {
            inner: source.as_ref(),
            timeout,
        };
        let outcome = self.diff_engine.diff(truth, &bounded).await;
        bounded.close().await;

        match outcome {
            Ok(diff) => HostReport::Reconciled(diff),
            Err(e) => {
                warn!("{}: reconciliation aborted: {}", host, e);
                HostReport::Failed {
                    host: host.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Reconcile `truth` against every host, one host at a time
    pub async fn audit_hosts(
        &self,
        truth: &SourceOfTruth,
        connector: &dyn HostConnector,
        hosts: &[String],
    ) -> Vec<HostReport> {
        let mut reports = Vec::with_capacity(hosts.len());
        for host in hosts {
            reports.push(self.audit_host(truth, connector, host).await);
        }
        reports
    }

    /// Partition `subjects` at every provider concurrently
    ///
    /// Reports come back in provider order.
    ///
    /// # Errors
    ///
    /// The first fatal provider setup failure, such as a credential that
    /// cannot be loaded.
    pub async fn audit_providers(
        &self,
        providers: &[Arc<dyn AccountStatusProvider>],
        subjects: &BTreeSet<Subject>,
    ) -> Result<Vec<ProviderReport>> {
        let runs = providers.iter().map(|provider| async move {
            let metrics = self.config.enable_metrics.then(MetricsCollector::new);
            let partition = self
                .partition_engine
                .partition(provider.as_ref(), subjects, metrics.as_ref())
                .await?;

            let stats = match metrics {
                Some(metrics) => Some(metrics.snapshot().await),
                None => None,
            };

            Ok(ProviderReport { partition, stats })
        });

        join_all(runs).await.into_iter().collect()
    }

    /// Execute a complete run
    ///
    /// # Errors
    ///
    /// Only fatal failures are returned: no departures in the window, an
    /// issue tracker that cannot be read, or a provider whose credentials
    /// cannot be loaded. Everything else is captured in the report.
    pub async fn run(&self, plan: AuditPlan<'_>) -> Result<ReconciliationReport> {
        let mut builder = ReportBuilder::new();

        let (truth, departures) = match plan.roster {
            RosterInput::Static(truth) => (truth, None),
            RosterInput::Departures {
                window,
                tracker,
                extractor,
            } => {
                let departures = extractor.extract(&window, tracker).await?;
                let truth = SourceOfTruth::from_subjects(departures.subjects().cloned());
                builder = builder.window(window);
                (truth, Some(departures))
            }
        };

        info!(
            "Run: {} users, {} roles, {} hosts, {} providers",
            truth.users.len(),
            truth.roles.len(),
            plan.hosts.len(),
            plan.providers.len()
        );

        if let Some(connector) = plan.connector {
            builder = builder.hosts(self.audit_hosts(&truth, connector, &plan.hosts).await);
        }

        let providers = self.audit_providers(&plan.providers, &truth.users).await?;
        builder = builder.providers(providers);

        if let Some(departures) = departures {
            builder = builder.departures(departures);
        }

        Ok(builder.build())
    }
}

impl Default for Auditor {
    fn default() -> Self {
        Self::new(AuditConfig::default())
    }
}

/// Grant source with every call bounded by `timeout`
struct BoundedSource<'a> {
    inner: &'a dyn GrantSource,
    timeout: Duration,
}

impl BoundedSource<'_> {
    async fn within<T, F>(&self, call: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AuditError::transport(format!(
                "{} timed out after {}ms",
                call,
                self.timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl<'a> GrantSource for BoundedSource<'a> {
    fn host(&self) -> &str {
        self.inner.host()
    }

    async fn list_home_identities(&self) -> Result<Vec<Subject>> {
        self.within("listing homes", self.inner.list_home_identities())
            .await
    }

    async fn list_grants(&self, location: &Location) -> Result<GrantListing> {
        let call = format!("reading {}", location.authorized_keys());
        self.within(&call, self.inner.list_grants(location)).await
    }

    async fn close(&self) {
        if tokio::time::timeout(self.timeout, self.inner.close()).await.is_err() {
            warn!("{}: close timed out", self.inner.host());
        }
    }
}

/// Where the expected roster for a run comes from
pub enum RosterInput<'a> {
    /// Roster resolved from static configuration
    Static(SourceOfTruth),

    /// Roster derived from offboarding issues closed inside `window`
    Departures {
        window: DepartureWindow,
        tracker: &'a dyn IssueTracker,
        extractor: DepartureExtractor,
    },
}

/// Everything one run needs
pub struct AuditPlan<'a> {
    pub roster: RosterInput<'a>,
    pub hosts: Vec<String>,
    pub connector: Option<&'a dyn HostConnector>,
    pub providers: Vec<Arc<dyn AccountStatusProvider>>,
}

impl<'a> AuditPlan<'a> {
    pub fn new(roster: RosterInput<'a>) -> Self {
        Self {
            roster,
            hosts: Vec::new(),
            connector: None,
            providers: Vec::new(),
        }
    }

    /// Reconcile `hosts` through `connector`
    pub fn with_hosts(mut self, connector: &'a dyn HostConnector, hosts: Vec<String>) -> Self {
        self.connector = Some(connector);
        self.hosts = hosts;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn AccountStatusProvider>) -> Self {
        self.providers.push(provider);
        self
    }
}

