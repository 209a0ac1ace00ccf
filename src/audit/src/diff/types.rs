//! Roster diff result types

use crate::types::{Grant, Subject};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Result of reading one location's authorized keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantListing {
    /// Keys file exists; grants in file order
    Found(Vec<Grant>),

    /// No keys file at that location
    NotFound,
}

/// Entries the source of truth expects but the host does not have
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOnly {
    pub users: BTreeSet<Subject>,
    pub roles: BTreeSet<String>,
}

impl SourceOnly {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.roles.is_empty()
    }
}

/// Three-way reconciliation of one host against the source of truth
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterDiff {
    /// Host the grants were read from
    pub host: String,

    /// Identities with a home directory on the host (baseline snapshot)
    pub observed: BTreeSet<Subject>,

    /// Expected but absent on the host
    pub source_only: SourceOnly,

    /// Present on the host but unknown to the source of truth
    pub host_only: BTreeSet<Subject>,

    /// Per found role, grant holders that are not declared members
    pub excess_members: BTreeMap<String, Vec<Subject>>,

    /// Baseline identities explained by an expected individual
    pub matched_users: BTreeSet<Subject>,

    /// Baseline identities explained by a role account
    pub matched_roles: BTreeSet<Subject>,
}

impl RosterDiff {
    /// Number of excess role grants across all roles
    pub fn excess_count(&self) -> usize {
        self.excess_members.values().map(Vec::len).sum()
    }

    /// True when the host matches the source of truth exactly
    pub fn is_clean(&self) -> bool {
        self.source_only.is_empty() && self.host_only.is_empty() && self.excess_count() == 0
    }
}
