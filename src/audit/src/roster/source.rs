//! Static source of truth

use crate::error::{AuditError, Result};
use crate::types::{Role, SourceOfTruth, Subject};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Roster as written in configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterConfig {
    /// Individuals expected to have direct access
    #[serde(default)]
    pub users: Vec<String>,

    /// Role accounts keyed by name
    #[serde(default)]
    pub roles: BTreeMap<String, RoleConfig>,
}

/// One role account in configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Declared members
    #[serde(default)]
    pub members: Vec<String>,

    /// Custom home directory
    #[serde(default)]
    pub home: Option<String>,
}

/// Build the source of truth from configuration (no network access)
///
/// # Errors
///
/// Returns [`AuditError::Configuration`] for empty identities, empty role
/// names, or relative role homes.
pub fn resolve_roster(config: &RosterConfig) -> Result<SourceOfTruth> {
    let mut truth = SourceOfTruth::new();

    for user in &config.users {
        let subject = Subject::new(user);
        if subject.is_empty() {
            return Err(AuditError::configuration("roster contains an empty user"));
        }
        truth.users.insert(subject);
    }

    for (name, role_config) in &config.roles {
        if name.trim().is_empty() {
            return Err(AuditError::configuration("roster contains an unnamed role"));
        }

        let mut role = Role::new(name, role_config.members.iter().map(String::as_str));
        if role.members.iter().any(Subject::is_empty) {
            return Err(AuditError::configuration(format!(
                "role '{}' has an empty member",
                role.name
            )));
        }

        if let Some(home) = &role_config.home {
            if !home.starts_with('/') {
                return Err(AuditError::configuration(format!(
                    "role '{}' home '{}' must be an absolute path",
                    role.name, home
                )));
            }
            role = role.with_home(home.as_str());
        }

        if truth.roles.contains_key(&role.name) {
            return Err(AuditError::configuration(format!(
                "duplicate role '{}'",
                role.name
            )));
        }
        truth = truth.with_role(role);
    }

    Ok(truth)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RosterConfig {
        let mut roles = BTreeMap::new();
        roles.insert(
            "role1".to_string(),
            RoleConfig {
                members: vec!["user1".into(), "user3".into()],
                home: Some("/var/lib/role1".into()),
            },
        );
        roles.insert(
            "role2".to_string(),
            RoleConfig {
                members: vec!["user2".into(), "user3".into(), "user4".into()],
                home: None,
            },
        );

        RosterConfig {
            users: vec!["user1".into(), "user2".into(), "user7".into()],
            roles,
        }
    }

    #[test]
    fn test_resolve_roster() {
        let truth = resolve_roster(&config()).unwrap();

        assert_eq!(truth.users.len(), 3);
        assert_eq!(truth.roles.len(), 2);

        let role1 = &truth.roles["role1"];
        assert_eq!(role1.location("/home").as_str(), "/var/lib/role1");
        assert!(role1.has_member(&Subject::new("user3")));

        let role2 = &truth.roles["role2"];
        assert_eq!(role2.location("/home").as_str(), "/home/role2");
    }

    #[test]
    fn test_relative_home_rejected() {
        let mut config = config();
        config.roles.get_mut("role1").unwrap().home = Some("var/lib/role1".into());
        assert!(matches!(
            resolve_roster(&config),
            Err(AuditError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_user_rejected() {
        let mut config = config();
        config.users.push("   ".into());
        assert!(resolve_roster(&config).is_err());
    }

    #[test]
    fn test_case_folded_duplicate_role_rejected() {
        let mut config = config();
        config.roles.insert("ROLE2".into(), RoleConfig::default());
        assert!(resolve_roster(&config).is_err());
    }

    #[test]
    fn test_roster_deserialization_defaults() {
        let config: RosterConfig = serde_json::from_value(serde_json::json!({
            "users": ["alice", "bob"],
            "roles": { "deploy": { "members": ["alice"] } }
        }))
        .unwrap();

        let truth = resolve_roster(&config).unwrap();
        assert!(truth.roles["deploy"].has_member(&Subject::new("alice")));
        assert!(truth.roles["deploy"].home.is_none());
    }
}
