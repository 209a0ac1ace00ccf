//! Core reconciliation types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Default root under which per-identity home directories live
pub const DEFAULT_HOME_ROOT: &str = "/home";

/// An identity tracked for access review (user or role-scoped account)
///
/// The identity is kept lowercase and trimmed. Equality, ordering and hashing
/// use the local part only, so `alice` and `alice@example.com` are the same
/// subject; the full identity is kept for provider lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Subject {
    identity: String,
}

impl Subject {
    /// Create a subject from any identity string
    pub fn new(identity: impl AsRef<str>) -> Self {
        Self {
            identity: identity.as_ref().trim().to_lowercase(),
        }
    }

    /// Full identity as it should be sent to providers
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Local part (everything before the first `@`)
    pub fn local_part(&self) -> &str {
        self.identity
            .split_once('@')
            .map(|(local, _)| local)
            .unwrap_or(&self.identity)
    }

    /// Domain, if the identity is domain-qualified
    pub fn domain(&self) -> Option<&str> {
        self.identity.split_once('@').map(|(_, domain)| domain)
    }

    /// Qualify a bare identity with `domain`; qualified identities are kept as-is
    pub fn qualified(&self, domain: &str) -> Self {
        if self.domain().is_some() || domain.is_empty() {
            return self.clone();
        }
        Self::new(format!("{}@{}", self.identity, domain))
    }

    /// True when the identity is empty after trimming
    pub fn is_empty(&self) -> bool {
        self.local_part().is_empty()
    }
}

impl PartialEq for Subject {
    fn eq(&self, other: &Self) -> bool {
        self.local_part() == other.local_part()
    }
}

impl Eq for Subject {}

impl Hash for Subject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.local_part().hash(state);
    }
}

impl PartialOrd for Subject {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Subject {
    fn cmp(&self, other: &Self) -> Ordering {
        self.local_part().cmp(other.local_part())
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity)
    }
}

impl From<String> for Subject {
    fn from(identity: String) -> Self {
        Self::new(identity)
    }
}

impl From<&str> for Subject {
    fn from(identity: &str) -> Self {
        Self::new(identity)
    }
}

impl From<Subject> for String {
    fn from(subject: Subject) -> Self {
        subject.identity
    }
}

/// A directory on a host whose `.ssh/authorized_keys` grants access
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    /// Location from an explicit path (trailing slashes removed)
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            Self("/".to_string())
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Default location for `name` under `home_root`
    pub fn under(home_root: &str, name: &str) -> Self {
        Self::new(format!("{}/{}", home_root.trim_end_matches('/'), name))
    }

    /// Path of the authorized keys file for this location
    pub fn authorized_keys(&self) -> String {
        format!("{}/.ssh/authorized_keys", self.0.trim_end_matches('/'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role-scoped account with its declared members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role account name (e.g., "deploy")
    pub name: String,

    /// Subjects allowed to authenticate as this role
    pub members: BTreeSet<Subject>,

    /// Custom home; absent means the location derives from the role name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<Location>,
}

impl Role {
    /// Create a role with the given members
    pub fn new<I, S>(name: impl AsRef<str>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Subject>,
    {
        Self {
            name: name.as_ref().trim().to_lowercase(),
            members: members.into_iter().map(Into::into).collect(),
            home: None,
        }
    }

    /// Override the role's home location
    pub fn with_home(mut self, home: impl Into<String>) -> Self {
        self.home = Some(Location::new(home));
        self
    }

    /// Resolve where this role's grants live on a host
    pub fn location(&self, home_root: &str) -> Location {
        match &self.home {
            Some(home) => home.clone(),
            None => Location::under(home_root, &self.name),
        }
    }

    /// Check whether `subject` is a declared member
    pub fn has_member(&self, subject: &Subject) -> bool {
        self.members.contains(subject)
    }

    /// The role account itself, as it appears among host identities
    pub fn as_subject(&self) -> Subject {
        Subject::new(&self.name)
    }
}

/// Independently maintained record of who should have access
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOfTruth {
    /// Individuals expected to have direct access
    pub users: BTreeSet<Subject>,

    /// Role accounts keyed by role name
    pub roles: BTreeMap<String, Role>,
}

impl SourceOfTruth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roster of individuals only (no roles)
    pub fn from_subjects<I>(subjects: I) -> Self
    where
        I: IntoIterator<Item = Subject>,
    {
        Self {
            users: subjects.into_iter().collect(),
            roles: BTreeMap::new(),
        }
    }

    /// Add an individual
    pub fn with_user(mut self, user: impl Into<Subject>) -> Self {
        self.users.insert(user.into());
        self
    }

    /// Add a role (replaces a role of the same name)
    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.insert(role.name.clone(), role);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.roles.is_empty()
    }
}

/// Access right observed on a host, independent of whether it is expected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Identity attached to the key
    pub subject: Subject,

    /// Role account the key grants, if the location belongs to a role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Where the grant was read from
    pub location: Location,
}

impl Grant {
    pub fn new(subject: impl Into<Subject>, location: Location) -> Self {
        Self {
            subject: subject.into(),
            role: None,
            location,
        }
    }

    pub fn for_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// Account-state bucket shared by all providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBucket {
    Active,
    Suspended,
    Archived,
    Deleted,
    Unresolved,
}

impl StatusBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusBucket::Active => "active",
            StatusBucket::Suspended => "suspended",
            StatusBucket::Archived => "archived",
            StatusBucket::Deleted => "deleted",
            StatusBucket::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for StatusBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized account state of one subject at one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubjectStatus {
    /// Account exists and can be used
    Active {
        /// Last sign-in reported by the provider
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_login: Option<DateTime<Utc>>,

        /// Provider-specific evidence (e.g., file:line references)
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        detail: Vec<String>,
    },

    /// Account exists but is disabled
    Suspended,

    /// Profile retained but archived (device management)
    Archived,

    /// Confirmed absent
    Deleted,

    /// State could not be confirmed
    Unresolved { reason: String },
}

impl SubjectStatus {
    /// Plain active status
    pub fn active() -> Self {
        SubjectStatus::Active {
            last_login: None,
            detail: Vec::new(),
        }
    }

    /// Active status with a last sign-in time
    pub fn active_since(last_login: Option<DateTime<Utc>>) -> Self {
        SubjectStatus::Active {
            last_login,
            detail: Vec::new(),
        }
    }

    /// Active status with supporting evidence
    pub fn active_with_detail(detail: Vec<String>) -> Self {
        SubjectStatus::Active {
            last_login: None,
            detail,
        }
    }

    pub fn bucket(&self) -> StatusBucket {
        match self {
            SubjectStatus::Active { .. } => StatusBucket::Active,
            SubjectStatus::Suspended => StatusBucket::Suspended,
            SubjectStatus::Archived => StatusBucket::Archived,
            SubjectStatus::Deleted => StatusBucket::Deleted,
            SubjectStatus::Unresolved { .. } => StatusBucket::Unresolved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_canonical_form() {
        let subject = Subject::new("  Alice.Smith@Example.com ");
        assert_eq!(subject.identity(), "alice.smith@example.com");
        assert_eq!(subject.local_part(), "alice.smith");
        assert_eq!(subject.domain(), Some("example.com"));
    }

    #[test]
    fn test_subject_compares_on_local_part() {
        let bare = Subject::new("alice");
        let qualified = Subject::new("alice@example.com");
        assert_eq!(bare, qualified);

        let mut set = BTreeSet::new();
        set.insert(bare);
        assert!(set.contains(&qualified));
    }

    #[test]
    fn test_subject_qualification() {
        let subject = Subject::new("bob").qualified("example.com");
        assert_eq!(subject.identity(), "bob@example.com");

        let already = Subject::new("bob@other.org").qualified("example.com");
        assert_eq!(already.identity(), "bob@other.org");
    }

    #[test]
    fn test_subject_serde_is_a_plain_string() {
        let json = serde_json::to_string(&Subject::new("Carol@Example.com")).unwrap();
        assert_eq!(json, "\"carol@example.com\"");

        let back: Subject = serde_json::from_str("\"CAROL\"").unwrap();
        assert_eq!(back.identity(), "carol");
    }

    #[test]
    fn test_role_location() {
        let role = Role::new("deploy", ["alice", "bob"]);
        assert_eq!(role.location("/home").as_str(), "/home/deploy");
        assert_eq!(role.location("/home/").as_str(), "/home/deploy");

        let custom = Role::new("backup", ["alice"]).with_home("/var/lib/backup/");
        assert_eq!(custom.location("/home").as_str(), "/var/lib/backup");
        assert_eq!(
            custom.location("/home").authorized_keys(),
            "/var/lib/backup/.ssh/authorized_keys"
        );
    }

    #[test]
    fn test_role_membership() {
        let role = Role::new("deploy", ["alice@example.com"]);
        assert!(role.has_member(&Subject::new("alice")));
        assert!(!role.has_member(&Subject::new("mallory")));
    }

    #[test]
    fn test_status_buckets() {
        assert_eq!(SubjectStatus::active().bucket(), StatusBucket::Active);
        assert_eq!(SubjectStatus::Archived.bucket(), StatusBucket::Archived);
        let unresolved = SubjectStatus::Unresolved {
            reason: "denied".to_string(),
        };
        assert_eq!(unresolved.bucket(), StatusBucket::Unresolved);
    }

    #[test]
    fn test_status_serialization_is_tagged() {
        let json = serde_json::to_value(SubjectStatus::Suspended).unwrap();
        assert_eq!(json["state"], "suspended");

        let json = serde_json::to_value(SubjectStatus::active_with_detail(vec![
            "hosts.yml:12".to_string(),
        ]))
        .unwrap();
        assert_eq!(json["state"], "active");
        assert_eq!(json["detail"][0], "hosts.yml:12");
    }
}
