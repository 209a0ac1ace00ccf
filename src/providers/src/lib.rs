//! # Access Audit Providers
//!
//! Concrete collaborators for the reconciliation engine.
//!
//! ## Module Structure
//!
//! ```text
//! providers/
//! ├── directory         - Directory service (Google Admin SDK)
//! ├── chat              - Chat service (Slack)
//! ├── device            - Device management (Kolide)
//! ├── password_manager  - Password manager (1Password)
//! ├── infrastructure    - Configuration-management repository checkout
//! ├── github            - Offboarding issue tracker
//! ├── ssh               - OpenSSH grant source and host connector
//! └── http              - Shared HTTP client and response mapping
//! ```

pub mod chat;
pub mod device;
pub mod directory;
pub mod error;
pub mod github;
pub mod http;
pub mod infrastructure;
pub mod password_manager;
pub mod ssh;

pub use chat::ChatProvider;
pub use device::DeviceProvider;
pub use directory::DirectoryProvider;
pub use error::{ProviderError, Result};
pub use github::GitHubIssueTracker;
pub use http::build_client;
pub use infrastructure::InfrastructureRepoProvider;
pub use password_manager::{PasswordManagerProvider, UserDirectory};
pub use ssh::{OpenSshConnector, OpenSshSession, SshGrantSource, SshSession, SshSettings};
