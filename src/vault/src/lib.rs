//! # Access Audit Secrets
//!
//! Narrow secrets collaborator for the reconciliation engine: API tokens,
//! SSH passwords and key files are fetched by name from a [`SecretStore`]
//! that callers pass around explicitly.
//!
//! ## Module Structure
//!
//! ```text
//! vault/
//! ├── storage      - SecretStore trait and in-memory backend
//! ├── onepassword  - 1Password CLI backend
//! └── lease        - Scoped on-disk credential files
//! ```

pub mod error;
pub mod lease;
pub mod onepassword;
pub mod storage;

pub use error::{Result, VaultError};
pub use lease::CredentialLease;
pub use onepassword::{OnePasswordCli, UserRecord};
pub use storage::{InMemorySecretStore, SecretStore};
