//! 1Password CLI backend
//!
//! Shells out to `op` with an explicit session token on every call. Items
//! are read as JSON; text secrets come from the item's note, falling back
//! to its password field.

use crate::error::{Result, VaultError};
use crate::storage::SecretStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

/// Default CLI executable
pub const DEFAULT_OP_PROGRAM: &str = "op";

/// Account record returned by `op get user`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub uuid: String,

    #[serde(default)]
    pub email: String,

    /// `A` active, `S` suspended
    #[serde(default)]
    pub state: String,
}

impl UserRecord {
    pub fn is_active(&self) -> bool {
        self.state == "A"
    }

    pub fn is_suspended(&self) -> bool {
        self.state == "S"
    }
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    details: ItemDetails,
}

#[derive(Debug, Default, Deserialize)]
struct ItemDetails {
    #[serde(default, rename = "notesPlain")]
    notes_plain: Option<String>,

    #[serde(default)]
    password: Option<String>,
}

/// Text value of an `op get item` response
pub fn parse_item_secret(name: &str, raw: &[u8]) -> Result<String> {
    let item: Item = serde_json::from_slice(raw)?;

    [item.details.notes_plain, item.details.password]
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .ok_or_else(|| VaultError::Empty(name.to_string()))
}

/// Classify a failed `op` invocation from its stderr
pub fn classify_failure(subject: &str, stderr: &str) -> VaultError {
    let lower = stderr.to_lowercase();

    if lower.contains("doesn't seem to be")
        || lower.contains("not found")
        || lower.contains("no user")
    {
        VaultError::NotFound(subject.to_string())
    } else if lower.contains("session") || lower.contains("not currently signed in") {
        VaultError::Session(stderr.trim().to_string())
    } else {
        VaultError::Command(format!("op {}: {}", subject, stderr.trim()))
    }
}

/// Secret store backed by the 1Password CLI
#[derive(Clone)]
pub struct OnePasswordCli {
    program: String,
    session: String,
}

impl std::fmt::Debug for OnePasswordCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnePasswordCli")
            .field("program", &self.program)
            .field("session", &"<redacted>")
            .finish()
    }
}

impl OnePasswordCli {
    /// Create a backend using `session` for every call
    pub fn new(session: impl Into<String>) -> Result<Self> {
        let session = session.into();
        if session.trim().is_empty() {
            return Err(VaultError::Session("session token is empty".to_string()));
        }

        Ok(Self {
            program: DEFAULT_OP_PROGRAM.to_string(),
            session,
        })
    }

    /// Use a different executable
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Run `op <args> --session=<token>` and return stdout
    async fn run(&self, subject: &str, args: &[&str]) -> Result<Vec<u8>> {
        debug!("op {}", args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .arg(format!("--session={}", self.session))
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(subject, &stderr));
        }

        Ok(output.stdout)
    }

    /// Account record of `user`
    pub async fn get_user(&self, user: &str) -> Result<UserRecord> {
        let raw = self.run(user, &["get", "user", user]).await?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[async_trait]
impl SecretStore for OnePasswordCli {
    async fn get_secret(&self, name: &str) -> Result<String> {
        let raw = self.run(name, &["get", "item", name]).await?;
        parse_item_secret(name, &raw)
    }

    async fn get_file(&self, name: &str) -> Result<Vec<u8>> {
        let contents = self.run(name, &["get", "document", name]).await?;
        if contents.is_empty() {
            return Err(VaultError::Empty(name.to_string()));
        }
        Ok(contents)
    }
}
