//! End-to-End Reconciliation Tests
//!
//! Full runs through the auditor: static roster against hosts and
//! providers, and offboarding runs driven by an issue tracker.

use accessaudit::provider::{ACTIVE_ARCHIVED_DELETED, ACTIVE_DELETED};
use accessaudit::{
    AccountStatusProvider, AuditConfig, AuditError, AuditPlan, Auditor, DepartureExtractor,
    DepartureWindow, GrantListing, GrantSource, HostConnector, HostReport, InMemoryConnector,
    InMemoryHost, Issue, IssueTracker, Location, LookupError, LookupResult, PartitionConfig,
    Role, RosterInput, SourceOfTruth, StaticStatusProvider, StatusBucket, Subject, SubjectStatus,
    UnresolvedPolicy,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

struct Offboardings(Vec<Issue>);

#[async_trait]
impl IssueTracker for Offboardings {
    async fn list_closed_issues(
        &self,
        _label: &str,
        _since: DateTime<Utc>,
    ) -> accessaudit::Result<Vec<Issue>> {
        Ok(self.0.clone())
    }
}

/// Host whose key files never finish reading
struct StalledHost;

#[async_trait]
impl GrantSource for StalledHost {
    fn host(&self) -> &str {
        "stalled"
    }

    async fn list_home_identities(&self) -> accessaudit::Result<Vec<Subject>> {
        Ok(vec![Subject::new("a")])
    }

    async fn list_grants(&self, _location: &Location) -> accessaudit::Result<GrantListing> {
        std::future::pending().await
    }
}

struct StalledConnector;

#[async_trait]
impl HostConnector for StalledConnector {
    async fn connect(&self, _host: &str) -> accessaudit::Result<Box<dyn GrantSource>> {
        Ok(Box::new(StalledHost))
    }
}

/// Provider whose credential is missing from the vault
struct Unauthorized;

#[async_trait]
impl AccountStatusProvider for Unauthorized {
    fn name(&self) -> &str {
        "chat"
    }

    fn vocabulary(&self) -> &'static [StatusBucket] {
        ACTIVE_DELETED
    }

    async fn prepare(&self) -> accessaudit::Result<()> {
        Err(AuditError::Secret("slackToken: not found".into()))
    }

    async fn lookup(&self, _subject: &Subject) -> LookupResult {
        Ok(SubjectStatus::active())
    }
}

fn truth() -> SourceOfTruth {
    SourceOfTruth::new()
        .with_user("a")
        .with_user("b")
        .with_role(Role::new("r1", ["a"]))
}

fn bastion() -> InMemoryHost {
    InMemoryHost::new("bastion")
        .with_home("a")
        .with_home("b")
        .with_home("c")
        .with_home("r1")
        .with_keys("/home/a", ["a@example.com"])
        .with_keys("/home/b", ["b@example.com"])
        .with_keys("/home/r1", ["a@example.com", "d@example.com"])
}

// ============================================================================
// HOSTS
// ============================================================================

#[tokio::test]
async fn test_static_run_across_hosts() {
    let connector = InMemoryConnector::new().with_host(bastion());

    let plan = AuditPlan::new(RosterInput::Static(truth()))
        .with_hosts(&connector, vec!["bastion".to_string(), "db1".to_string()]);

    let report = Auditor::default().run(plan).await.unwrap();

    assert_eq!(report.hosts.len(), 2);
    assert_eq!(report.hosts[0].host(), "bastion");

    let diff = report.host("bastion").and_then(HostReport::diff).unwrap();
    assert!(diff.source_only.is_empty());
    assert_eq!(diff.host_only.len(), 1);
    assert!(diff.host_only.contains(&Subject::new("c")));
    assert_eq!(diff.excess_members["r1"], vec![Subject::new("d")]);

    match report.host("db1").unwrap() {
        HostReport::Failed { error, .. } => assert!(error.contains("connection refused")),
        other => panic!("Expected failed host, got {:?}", other),
    }
    assert!(!report.is_clean());
}

#[tokio::test]
async fn test_broken_host_does_not_stop_the_run() {
    let connector = InMemoryConnector::new()
        .with_host(InMemoryHost::new("web").with_broken("/home/a"))
        .with_host(bastion());

    let plan = AuditPlan::new(RosterInput::Static(truth()))
        .with_hosts(&connector, vec!["web".to_string(), "bastion".to_string()]);

    let report = Auditor::default().run(plan).await.unwrap();

    assert!(report.hosts[0].is_failed());
    assert!(!report.hosts[1].is_failed());
}

#[tokio::test]
async fn test_stalled_host_times_out() {
    let auditor = Auditor::new(AuditConfig {
        host_timeout: Duration::from_millis(100),
        ..Default::default()
    });
    let connector = InMemoryConnector::new().with_host(bastion());

    let plan = AuditPlan::new(RosterInput::Static(truth()))
        .with_hosts(&StalledConnector, vec!["stalled".to_string()]);
    let report = tokio::time::timeout(Duration::from_secs(5), auditor.run(plan))
        .await
        .expect("run should finish")
        .unwrap();

    match &report.hosts[0] {
        HostReport::Failed { error, .. } => assert!(error.contains("timed out")),
        other => panic!("Expected failed host, got {:?}", other),
    }

    let plan = AuditPlan::new(RosterInput::Static(truth()))
        .with_hosts(&connector, vec!["bastion".to_string()]);
    let report = auditor.run(plan).await.unwrap();
    assert!(!report.hosts[0].is_failed());
}

#[tokio::test]
async fn test_custom_home_root() {
    let connector = InMemoryConnector::new().with_host(
        InMemoryHost::new("nas")
            .with_home("a")
            .with_keys("/export/home/a", ["a"]),
    );

    let auditor = Auditor::new(AuditConfig {
        home_root: "/export/home".to_string(),
        ..Default::default()
    });

    let plan = AuditPlan::new(RosterInput::Static(SourceOfTruth::new().with_user("a")))
        .with_hosts(&connector, vec!["nas".to_string()]);

    let report = auditor.run(plan).await.unwrap();
    assert!(report.host("nas").and_then(HostReport::diff).unwrap().is_clean());
}

// ============================================================================
// PROVIDERS
// ============================================================================

#[tokio::test]
async fn test_providers_partition_same_subjects() {
    let directory = StaticStatusProvider::new("directory")
        .with_status("a", SubjectStatus::active())
        .with_status("b", SubjectStatus::Suspended);
    let chat = StaticStatusProvider::new("chat")
        .with_vocabulary(ACTIVE_DELETED)
        .with_status("b", SubjectStatus::active());
    let device = StaticStatusProvider::new("device")
        .with_vocabulary(ACTIVE_ARCHIVED_DELETED)
        .with_status("a", SubjectStatus::Archived);

    let plan = AuditPlan::new(RosterInput::Static(truth()))
        .with_provider(Arc::new(directory))
        .with_provider(Arc::new(chat))
        .with_provider(Arc::new(device));

    let report = Auditor::default().run(plan).await.unwrap();

    let names: Vec<&str> = report
        .providers
        .iter()
        .map(|p| p.partition.provider.as_str())
        .collect();
    assert_eq!(names, vec!["directory", "chat", "device"]);

    for provider in &report.providers {
        assert_eq!(provider.partition.len(), 2);
        assert_eq!(provider.stats.as_ref().unwrap().lookups, 2);
    }

    assert_eq!(report.active_at(&Subject::new("a")), vec!["directory"]);
    assert_eq!(report.active_at(&Subject::new("b")), vec!["chat"]);
    assert!(report
        .provider("device")
        .unwrap()
        .partition
        .contains(StatusBucket::Archived, &Subject::new("a")));
}

#[tokio::test]
async fn test_providers_run_concurrently() {
    let slow = |name: &str| {
        Arc::new(
            StaticStatusProvider::new(name)
                .with_status("a", SubjectStatus::active())
                .with_delay("a", Duration::from_millis(200)),
        )
    };

    let plan = AuditPlan::new(RosterInput::Static(SourceOfTruth::new().with_user("a")))
        .with_provider(slow("directory"))
        .with_provider(slow("chat"))
        .with_provider(slow("device"));

    let started = std::time::Instant::now();
    let report = Auditor::default().run(plan).await.unwrap();

    assert_eq!(report.providers.len(), 3);
    assert!(started.elapsed() < Duration::from_millis(550));
}

#[tokio::test]
async fn test_strict_mode_reports_unresolved() {
    let directory = StaticStatusProvider::new("directory")
        .with_status("a", SubjectStatus::active())
        .with_failure("b", LookupError::Transport("503 Service Unavailable".into()));

    let auditor = Auditor::new(AuditConfig {
        partition: PartitionConfig {
            unresolved: UnresolvedPolicy::Separate,
            ..Default::default()
        },
        enable_metrics: false,
        ..Default::default()
    });

    let plan = AuditPlan::new(RosterInput::Static(truth())).with_provider(Arc::new(directory));
    let report = auditor.run(plan).await.unwrap();

    let provider = report.provider("directory").unwrap();
    assert!(provider.stats.is_none());
    assert!(provider
        .partition
        .contains(StatusBucket::Unresolved, &Subject::new("b")));
    assert!(!report.is_clean());
}

#[tokio::test]
async fn test_missing_credential_aborts_run() {
    let directory = Arc::new(StaticStatusProvider::new("directory"));

    let plan = AuditPlan::new(RosterInput::Static(truth()))
        .with_provider(directory)
        .with_provider(Arc::new(Unauthorized));

    let result = Auditor::default().run(plan).await;

    assert!(matches!(result, Err(AuditError::Secret(_))));
}

// ============================================================================
// OFFBOARDING
// ============================================================================

#[tokio::test]
async fn test_offboarding_run() {
    let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let window = DepartureWindow::parse("20240501", None, today).unwrap();
    let tracker = Offboardings(vec![
        Issue::new(
            7,
            "Please offboard alice@example.com",
            Utc.with_ymd_and_hms(2024, 5, 20, 9, 0, 0).unwrap(),
        ),
        Issue::new(
            8,
            "Please offboard bob@example.com",
            Utc.with_ymd_and_hms(2024, 5, 21, 9, 0, 0).unwrap(),
        ),
    ]);

    let directory = StaticStatusProvider::new("directory")
        .with_status("alice@example.com", SubjectStatus::Suspended);

    let plan = AuditPlan::new(RosterInput::Departures {
        window,
        tracker: &tracker,
        extractor: DepartureExtractor::new("example.com", "offboarding").unwrap(),
    })
    .with_provider(Arc::new(directory));

    let report = Auditor::default().run(plan).await.unwrap();

    assert_eq!(report.window, Some(window));
    assert_eq!(report.departures.as_ref().unwrap().len(), 2);

    let partition = &report.provider("directory").unwrap().partition;
    assert!(partition.contains(StatusBucket::Suspended, &Subject::new("alice")));
    assert!(partition.contains(StatusBucket::Deleted, &Subject::new("bob")));
    assert!(report.active_at(&Subject::new("alice")).is_empty());
}

#[tokio::test]
async fn test_offboarding_without_departures_queries_nothing() {
    let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let window = DepartureWindow::parse("20240501", None, today).unwrap();
    let tracker = Offboardings(Vec::new());

    let directory = Arc::new(StaticStatusProvider::new("directory"));

    let plan = AuditPlan::new(RosterInput::Departures {
        window,
        tracker: &tracker,
        extractor: DepartureExtractor::new("example.com", "offboarding").unwrap(),
    })
    .with_provider(directory.clone());

    let result = Auditor::default().run(plan).await;

    assert!(matches!(result, Err(AuditError::NoDepartures { .. })));
    assert_eq!(directory.lookup_count(), 0);
}
