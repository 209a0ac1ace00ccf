//! Status partition module
//!
//! Classifies a subject set into one provider's mutually exclusive status
//! buckets. A provider's explicit "not found" is a confirmed absence; every
//! other lookup failure is recorded per subject so callers can tell the two
//! apart even when both land in `deleted`.

pub mod engine;
pub mod types;


pub use engine::{PartitionConfig, PartitionEngine};
pub use types::{LookupFailure, StatusPartition, UnresolvedPolicy};
