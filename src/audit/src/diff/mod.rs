//! Roster diff module
//!
//! Three-way reconciliation between expected users, expected roles, and the
//! authorized keys observed on a host.
//!
//! # Example
//!
//! ```rust
//! use accessaudit::diff::{GrantListing, GrantSource, RosterDiffEngine};
//! use accessaudit::types::{Grant, Location, Role, SourceOfTruth, Subject};
//! use accessaudit::Result;
//! use async_trait::async_trait;
//!
//! struct OneHost;
//!
//! #[async_trait]
//! impl GrantSource for OneHost {
//!     fn host(&self) -> &str { "bastion" }
//!
//!     async fn list_home_identities(&self) -> Result<Vec<Subject>> {
//!         Ok(vec![Subject::new("alice"), Subject::new("deploy")])
//!     }
//!
//!     async fn list_grants(&self, location: &Location) -> Result<GrantListing> {
//!         Ok(GrantListing::Found(vec![Grant::new("mallory", location.clone())]))
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let truth = SourceOfTruth::new()
//!     .with_user("alice")
//!     .with_role(Role::new("deploy", ["alice"]));
//!
//! let diff = RosterDiffEngine::new().diff(&truth, &OneHost).await?;
//! assert_eq!(diff.excess_members["deploy"], vec![Subject::new("mallory")]);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod memory;
pub mod types;


pub use engine::{GrantSource, HostConnector, RosterDiffEngine};
pub use memory::{InMemoryConnector, InMemoryHost};
pub use types::{GrantListing, RosterDiff, SourceOnly};
