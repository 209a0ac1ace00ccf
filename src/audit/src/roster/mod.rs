//! Roster source
//!
//! Produces the canonical set of expected subjects, either from static
//! configuration or from offboarding issues closed inside a
//! [`DepartureWindow`].
//!
//! # Example
//!
//! ```rust
//! use accessaudit::roster::{resolve_roster, RosterConfig};
//!
//! let config = RosterConfig {
//!     users: vec!["alice".to_string()],
//!     ..Default::default()
//! };
//! let truth = resolve_roster(&config).unwrap();
//! assert_eq!(truth.users.len(), 1);
//! ```

pub mod departures;
pub mod source;
pub mod window;

pub use departures::{
    extract_departures, Departure, DepartureExtractor, DepartureSet, Issue, IssueTracker,
    DEFAULT_OFFBOARDING_LABEL,
};
pub use source::{resolve_roster, RoleConfig, RosterConfig};
pub use window::{parse_date, DepartureWindow};
