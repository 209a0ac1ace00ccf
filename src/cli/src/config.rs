//! Tool configuration loading and validation

use accessaudit::roster::{RosterConfig, DEFAULT_OFFBOARDING_LABEL};
use accessaudit::{AuditConfig, PartitionConfig, UnresolvedPolicy, DEFAULT_HOME_ROOT};
use accessaudit_providers::SshSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete tool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditToolConfig {
    /// Organisation email domain used to qualify bare roster names
    pub domain: String,

    #[serde(default = "default_home_root")]
    pub home_root: String,

    #[serde(default)]
    pub roster: RosterConfig,

    #[serde(default)]
    pub partition: PartitionSection,

    #[serde(default)]
    pub ssh: SshSection,

    #[serde(default)]
    pub offboarding: OffboardingSection,

    #[serde(default)]
    pub vault: VaultSection,

    #[serde(default)]
    pub http: HttpSection,

    #[serde(default)]
    pub providers: ProvidersSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PartitionSection {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
    /// Report failed lookups in their own bucket instead of under deleted
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_true")]
    pub metrics: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SshSection {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default = "default_ssh_user")]
    pub user: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Name of the vault document holding the private key
    #[serde(default)]
    pub key_secret: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Upper bound for connecting to a host and for each remote command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OffboardingSection {
    /// Issue tracker repository as `owner/repo`
    #[serde(default)]
    pub repository: String,
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_github_secret")]
    pub token_secret: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VaultSection {
    #[serde(default = "default_op_program")]
    pub program: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpSection {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProvidersSection {
    #[serde(default)]
    pub directory: ApiProviderSection,
    #[serde(default)]
    pub chat: ApiProviderSection,
    #[serde(default)]
    pub device: ApiProviderSection,
    #[serde(default)]
    pub password_manager: PasswordManagerSection,
    #[serde(default)]
    pub infrastructure: InfrastructureSection,
}

/// Token-authenticated HTTP provider
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ApiProviderSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Vault item holding the API token; each provider has its own default
    #[serde(default)]
    pub token_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PasswordManagerSection {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct InfrastructureSection {
    #[serde(default)]
    pub enabled: bool,
    /// Local checkout of the configuration-management repository
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for PartitionSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            lookup_timeout_secs: default_lookup_timeout(),
            strict: false,
            metrics: true,
        }
    }
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            user: default_ssh_user(),
            port: default_ssh_port(),
            key_secret: None,
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl Default for OffboardingSection {
    fn default() -> Self {
        Self {
            repository: String::new(),
            label: default_label(),
            token_secret: default_github_secret(),
            base_url: None,
        }
    }
}

impl Default for VaultSection {
    fn default() -> Self {
        Self { program: default_op_program() }
    }
}

impl Default for HttpSection {
    fn default() -> Self {
        Self { timeout_secs: default_http_timeout() }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_home_root() -> String { DEFAULT_HOME_ROOT.to_string() }
fn default_concurrency() -> usize { 8 }
fn default_lookup_timeout() -> u64 { 30 }
fn default_ssh_user() -> String { "root".to_string() }
fn default_ssh_port() -> u16 { 22 }
fn default_connect_timeout() -> u64 { 10 }
fn default_command_timeout() -> u64 { 60 }
fn default_label() -> String { DEFAULT_OFFBOARDING_LABEL.to_string() }
fn default_github_secret() -> String { "githubToken".to_string() }
fn default_op_program() -> String { "op".to_string() }
fn default_http_timeout() -> u64 { 30 }

/// Provider names accepted by `--provider`
pub const PROVIDER_NAMES: &[&str] = &[
    "directory",
    "chat",
    "device",
    "password_manager",
    "infrastructure",
];

impl AuditToolConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read configuration file {:?}", path.as_ref()))?;

        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse configuration file")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() || self.domain.contains('@') {
            anyhow::bail!("domain must be a bare email domain such as 'example.com'");
        }

        if !self.home_root.starts_with('/') {
            anyhow::bail!("home_root must be an absolute path");
        }

        if self.partition.concurrency == 0 {
            anyhow::bail!("partition.concurrency must be at least 1");
        }

        if self.partition.lookup_timeout_secs == 0 {
            anyhow::bail!("partition.lookup_timeout_secs must be at least 1");
        }

        if self.http.timeout_secs == 0 {
            anyhow::bail!("http.timeout_secs must be at least 1");
        }

        if self.ssh.port == 0 {
            anyhow::bail!("ssh.port must not be 0");
        }

        if self.ssh.command_timeout_secs == 0 {
            anyhow::bail!("ssh.command_timeout_secs must be at least 1");
        }

        if self.ssh.hosts.iter().any(|host| host.trim().is_empty()) {
            anyhow::bail!("ssh.hosts contains an empty host name");
        }

        if self.offboarding.label.trim().is_empty() {
            anyhow::bail!("offboarding.label must not be empty");
        }

        let infrastructure = &self.providers.infrastructure;
        if infrastructure.enabled && infrastructure.path.is_none() {
            anyhow::bail!("providers.infrastructure.path is required when the provider is enabled");
        }

        Ok(())
    }

    /// Names of every enabled provider, in a fixed order
    pub fn enabled_providers(&self) -> Vec<&'static str> {
        let providers = &self.providers;
        let flags = [
            providers.directory.enabled,
            providers.chat.enabled,
            providers.device.enabled,
            providers.password_manager.enabled,
            providers.infrastructure.enabled,
        ];

        PROVIDER_NAMES
            .iter()
            .zip(flags)
            .filter(|(_, enabled)| *enabled)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Engine settings for a run
    pub fn audit_config(&self) -> AuditConfig {
        let unresolved = if self.partition.strict {
            UnresolvedPolicy::Separate
        } else {
            UnresolvedPolicy::FoldIntoDeleted
        };

        AuditConfig {
            partition: PartitionConfig {
                concurrency: self.partition.concurrency,
                lookup_timeout: Duration::from_secs(self.partition.lookup_timeout_secs),
                unresolved,
            },
            home_root: self.home_root.clone(),
            enable_metrics: self.partition.metrics,
            host_timeout: Duration::from_secs(self.ssh.command_timeout_secs),
        }
    }

    /// OpenSSH settings, with the identity file filled in by the caller
    pub fn ssh_settings(&self, identity_file: Option<PathBuf>) -> SshSettings {
        SshSettings {
            user: self.ssh.user.clone(),
            port: self.ssh.port,
            identity_file,
            connect_timeout: Duration::from_secs(self.ssh.connect_timeout_secs),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"
domain = "example.com"
home_root = "/srv/home"

[roster]
users = ["alice", "bob@example.com"]

[roster.roles.deploy]
members = ["alice"]
home = "/opt/deploy"

[partition]
concurrency = 4
lookup_timeout_secs = 5
strict = true

[ssh]
hosts = ["bastion.example.com", "db1.example.com"]
user = "audit"
key_secret = "auditKey"
command_timeout_secs = 30

[offboarding]
repository = "acme/infrastructure"

[providers.directory]
enabled = true

[providers.chat]
enabled = true
token_secret = "slackBot"

[providers.infrastructure]
enabled = true
path = "/srv/infrastructure"
"#;

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = AuditToolConfig::load(file.path()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.roster.users.len(), 2);
        assert_eq!(config.roster.roles["deploy"].home.as_deref(), Some("/opt/deploy"));
        assert_eq!(config.ssh.hosts.len(), 2);
        assert_eq!(config.ssh.port, 22);
        assert_eq!(config.offboarding.label, "offboarding");
        assert_eq!(config.offboarding.token_secret, "githubToken");
        assert_eq!(config.providers.chat.token_secret.as_deref(), Some("slackBot"));
        assert_eq!(
            config.enabled_providers(),
            vec!["directory", "chat", "infrastructure"]
        );

        let audit = config.audit_config();
        assert_eq!(audit.home_root, "/srv/home");
        assert_eq!(audit.partition.concurrency, 4);
        assert_eq!(audit.partition.lookup_timeout, Duration::from_secs(5));
        assert_eq!(audit.partition.unresolved, UnresolvedPolicy::Separate);
        assert!(audit.enable_metrics);
        assert_eq!(audit.host_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = AuditToolConfig::parse("domain = \"example.com\"").unwrap();
        config.validate().unwrap();

        assert_eq!(config.home_root, "/home");
        assert!(config.roster.users.is_empty());
        assert!(config.enabled_providers().is_empty());
        assert_eq!(config.vault.program, "op");
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.audit_config().partition.unresolved,
            UnresolvedPolicy::FoldIntoDeleted
        );

        let settings = config.ssh_settings(None);
        assert_eq!(settings.user, "root");
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.audit_config().host_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_missing_domain_fails_to_parse() {
        assert!(AuditToolConfig::parse("home_root = \"/home\"").is_err());
    }

    #[test]
    fn test_validation_errors() {
        let invalid = [
            "domain = \"\"",
            "domain = \"alice@example.com\"",
            "domain = \"example.com\"\nhome_root = \"home\"",
            "domain = \"example.com\"\n[partition]\nconcurrency = 0",
            "domain = \"example.com\"\n[partition]\nlookup_timeout_secs = 0",
            "domain = \"example.com\"\n[ssh]\nhosts = [\" \"]",
            "domain = \"example.com\"\n[ssh]\ncommand_timeout_secs = 0",
            "domain = \"example.com\"\n[providers.infrastructure]\nenabled = true",
        ];

        for contents in invalid {
            let config = AuditToolConfig::parse(contents).unwrap();
            assert!(config.validate().is_err(), "accepted: {}", contents);
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AuditToolConfig::load(dir.path().join("absent.toml")).is_err());
    }
}
