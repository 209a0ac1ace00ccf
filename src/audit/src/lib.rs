//! # Access Audit Reconciliation Engine
//!
//! Checks whether account access across SSH hosts and identity providers
//! matches an independently maintained source of truth.
//!
//! ## Features
//!
//! - **Roster source** from static configuration or offboarding issues
//!   closed inside a departure window
//! - **Roster diff** of expected users and roles against a host's
//!   authorized keys, with excess role members
//! - **Status partition** of any subject set at any provider into disjoint
//!   buckets, with bounded concurrency and per-lookup timeouts
//! - **Structured report** serializable with serde
//!
//! ## Example
//!
//! ```rust
//! use accessaudit::{
//!     AuditPlan, Auditor, InMemoryConnector, InMemoryHost, RosterInput, SourceOfTruth,
//!     StaticStatusProvider, StatusBucket, Subject, SubjectStatus,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let truth = SourceOfTruth::new().with_user("alice").with_user("bob");
//!
//!     let connector = InMemoryConnector::new().with_host(
//!         InMemoryHost::new("bastion")
//!             .with_home("alice")
//!             .with_home("mallory")
//!             .with_keys("/home/alice", ["alice"]),
//!     );
//!
//!     let directory = StaticStatusProvider::new("directory")
//!         .with_status("alice", SubjectStatus::active());
//!
//!     let plan = AuditPlan::new(RosterInput::Static(truth))
//!         .with_hosts(&connector, vec!["bastion".to_string()])
//!         .with_provider(Arc::new(directory));
//!
//!     let report = Auditor::default().run(plan).await?;
//!
//!     let diff = report.host("bastion").and_then(|h| h.diff()).unwrap();
//!     assert!(diff.host_only.contains(&Subject::new("mallory")));
//!
//!     let partition = &report.provider("directory").unwrap().partition;
//!     assert!(partition.contains(StatusBucket::Deleted, &Subject::new("bob")));
//!
//!     Ok(())
//! }
//! ```

pub mod diff;
pub mod engine;
pub mod error;
pub mod partition;
pub mod provider;
pub mod report;
pub mod roster;
pub mod types;

// Re-export commonly used types
pub use diff::{
    GrantListing, GrantSource, HostConnector, InMemoryConnector, InMemoryHost, RosterDiff,
    RosterDiffEngine,
};
pub use engine::{AuditConfig, AuditPlan, Auditor, ProviderStats, RosterInput};
pub use error::{AuditError, LookupError, Result};
pub use partition::{PartitionConfig, PartitionEngine, StatusPartition, UnresolvedPolicy};
pub use provider::{AccountStatusProvider, LookupResult, StaticStatusProvider};
pub use report::{HostReport, ReconciliationReport};
pub use roster::{DepartureExtractor, DepartureSet, DepartureWindow, Issue, IssueTracker};
pub use types::{
    Grant, Location, Role, SourceOfTruth, StatusBucket, Subject, SubjectStatus, DEFAULT_HOME_ROOT,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
