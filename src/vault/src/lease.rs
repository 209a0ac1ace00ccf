//! Scoped on-disk credentials
//!
//! Some collaborators (the SSH client, service account libraries) only
//! accept a credential as a file path. A [`CredentialLease`] writes the
//! secret to a private temporary file and removes it when released or
//! dropped.

use crate::error::Result;
use crate::storage::SecretStore;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Credential materialized on disk for the lifetime of the lease
#[derive(Debug)]
pub struct CredentialLease {
    name: String,
    file: NamedTempFile,
}

impl CredentialLease {
    /// Write `contents` to a fresh owner-only file in the system temp dir
    pub fn create(name: impl Into<String>, contents: &[u8]) -> Result<Self> {
        Self::create_in(std::env::temp_dir(), name, contents)
    }

    /// Write `contents` to a fresh owner-only file in `dir`
    pub fn create_in(dir: impl AsRef<Path>, name: impl Into<String>, contents: &[u8]) -> Result<Self> {
        let name = name.into();
        let mut file = tempfile::Builder::new()
            .prefix("accessaudit-")
            .tempfile_in(dir)?;

        file.write_all(contents)?;
        file.flush()?;

        debug!("Leased credential {} at {}", name, file.path().display());
        Ok(Self { name, file })
    }

    /// Fetch the file secret `name` from `store` and lease it
    pub async fn acquire(store: &dyn SecretStore, name: &str) -> Result<Self> {
        let contents = store.get_file(name).await?;
        Self::create(name, &contents)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the materialized credential
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Remove the file now
    pub fn release(self) -> Result<()> {
        let path: PathBuf = self.file.path().to_path_buf();
        self.file.close()?;
        debug!("Released credential {} ({})", self.name, path.display());
        Ok(())
    }
}
