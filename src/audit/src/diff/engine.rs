//! Roster diff engine
//!
//! Reconciles expected individual and role access against the authorized
//! keys actually present on one host. Every identity with a home directory
//! on the host is accounted for by exactly one of:
//!
//! 1. an expected individual whose keys file exists,
//! 2. a role account whose keys file exists,
//! 3. nothing (reported as host-only).
//!
//! The observed baseline is an immutable snapshot; explained identities are
//! collected separately and the host-only set is a final set difference.

use super::types::{GrantListing, RosterDiff, SourceOnly};
use crate::error::{AuditError, Result};
use crate::types::{Location, SourceOfTruth, Subject, DEFAULT_HOME_ROOT};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Read access to one host's authorized keys layout
///
/// Implementations hold a single session; the engine issues its calls
/// sequentially and in a stable order.
#[async_trait]
pub trait GrantSource: Send + Sync {
    /// Host name used in reports
    fn host(&self) -> &str;

    /// Every identity with a home directory on the host
    async fn list_home_identities(&self) -> Result<Vec<Subject>>;

    /// Grants at `location`
    ///
    /// A missing keys file is [`GrantListing::NotFound`]; any other failure
    /// (permission denied, broken session) must be an error.
    async fn list_grants(&self, location: &Location) -> Result<GrantListing>;

    /// Close the session
    async fn close(&self) {}
}

/// Opens a [`GrantSource`] for a host
#[async_trait]
pub trait HostConnector: Send + Sync {
    /// Connect to `host`; failures are [`AuditError::HostUnreachable`]
    async fn connect(&self, host: &str) -> Result<Box<dyn GrantSource>>;
}

/// Roster diff engine
#[derive(Debug, Clone)]
pub struct RosterDiffEngine {
    home_root: String,
}

impl RosterDiffEngine {
    /// Create an engine deriving default locations under `/home`
    pub fn new() -> Self {
        Self::with_home_root(DEFAULT_HOME_ROOT)
    }

    /// Create an engine deriving default locations under `home_root`
    pub fn with_home_root(home_root: impl Into<String>) -> Self {
        Self {
            home_root: home_root.into(),
        }
    }

    pub fn home_root(&self) -> &str {
        &self.home_root
    }

    /// Reconcile `truth` against the host behind `source`
    ///
    /// # Errors
    ///
    /// Any listing failure other than a missing keys file aborts the diff for
    /// this host; it is never treated as "no access".
    pub async fn diff(&self, truth: &SourceOfTruth, source: &dyn GrantSource) -> Result<RosterDiff> {
        let host = source.host().to_string();

        let observed: BTreeSet<Subject> = source
            .list_home_identities()
            .await
            .map_err(|e| with_host(&host, e))?
            .into_iter()
            .filter(|subject| !subject.is_empty())
            .collect();

        debug!("{}: {} identities under {}", host, observed.len(), self.home_root);

        let mut source_only = SourceOnly::default();
        let mut matched_users = BTreeSet::new();
        let mut matched_roles = BTreeSet::new();
        let mut excess_members: BTreeMap<String, Vec<Subject>> = BTreeMap::new();

        // Pass 1: individuals
        for user in &truth.users {
            let location = Location::under(&self.home_root, user.local_part());

            match source
                .list_grants(&location)
                .await
                .map_err(|e| with_host(&host, e))?
            {
                GrantListing::NotFound => {
                    debug!("{}: no keys for expected user {}", host, user);
                    source_only.users.insert(user.clone());
                }
                GrantListing::Found(grants) => {
                    debug!("{}: {} has {} keys", host, user, grants.len());
                    matched_users.insert(user.clone());
                }
            }
        }

        // Pass 2: roles
        for role in truth.roles.values() {
            let location = role.location(&self.home_root);

            match source
                .list_grants(&location)
                .await
                .map_err(|e| with_host(&host, e))?
            {
                GrantListing::NotFound => {
                    debug!("{}: no keys for role {} at {}", host, role.name, location);
                    source_only.roles.insert(role.name.clone());
                }
                GrantListing::Found(grants) => {
                    let account = role.as_subject();
                    if !matched_users.contains(&account) {
                        matched_roles.insert(account);
                    }

                    let mut excess: Vec<Subject> = Vec::new();
                    for grant in grants {
                        if !role.has_member(&grant.subject) && !excess.contains(&grant.subject) {
                            warn!(
                                "{}: {} can authenticate as role {} without being a member",
                                host, grant.subject, role.name
                            );
                            excess.push(grant.subject);
                        }
                    }
                    excess_members.insert(role.name.clone(), excess);
                }
            }
        }

        // Pass 3: whatever the first two passes did not explain
        let host_only: BTreeSet<Subject> = observed
            .iter()
            .filter(|identity| !matched_users.contains(*identity) && !matched_roles.contains(*identity))
            .cloned()
            .collect();

        let diff = RosterDiff {
            host,
            observed,
            source_only,
            host_only,
            excess_members,
            matched_users,
            matched_roles,
        };

        info!(
            "{}: {} source-only users, {} source-only roles, {} host-only identities, {} excess role grants",
            diff.host,
            diff.source_only.users.len(),
            diff.source_only.roles.len(),
            diff.host_only.len(),
            diff.excess_count()
        );

        Ok(diff)
    }
}

impl Default for RosterDiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn with_host(host: &str, error: AuditError) -> AuditError {
    match error {
        AuditError::Transport(reason) => AuditError::Transport(format!("{}: {}", host, reason)),
        other => other,
    }
}
