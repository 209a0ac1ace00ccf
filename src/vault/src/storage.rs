//! Secret store capability and an in-memory backend

use crate::error::{Result, VaultError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Read access to named secrets
///
/// Providers receive a store explicitly; there is no process-wide session.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Text secret (API token, password, note)
    async fn get_secret(&self, name: &str) -> Result<String>;

    /// File secret (service account key, private key)
    async fn get_file(&self, name: &str) -> Result<Vec<u8>>;
}

/// Secret store held in memory
#[derive(Clone, Default)]
pub struct InMemorySecretStore {
    secrets: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text secret
    pub fn with_secret(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.put(name, value.into().into_bytes());
        self
    }

    /// Add a file secret
    pub fn with_file(self, name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.put(name, contents.into());
        self
    }

    /// Store or replace a secret
    pub fn put(&self, name: impl Into<String>, value: Vec<u8>) {
        if let Ok(mut secrets) = self.secrets.write() {
            secrets.insert(name.into(), value);
        }
    }

    /// Number of stored secrets
    pub fn len(&self) -> usize {
        self.secrets.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let secrets = self
            .secrets
            .read()
            .map_err(|e| VaultError::Session(format!("Lock error: {}", e)))?;

        secrets
            .get(name)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(name.to_string()))
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get_secret(&self, name: &str) -> Result<String> {
        let bytes = self.read(name)?;
        let value = String::from_utf8(bytes)
            .map_err(|_| VaultError::Parse(format!("{} is not valid UTF-8", name)))?;

        if value.trim().is_empty() {
            return Err(VaultError::Empty(name.to_string()));
        }
        Ok(value.trim().to_string())
    }

    async fn get_file(&self, name: &str) -> Result<Vec<u8>> {
        self.read(name)
    }
}
