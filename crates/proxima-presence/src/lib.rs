//! Proxima Presence - Cluster-wide closest-node judgment
//!
//! This crate implements the Presence Aggregator:
//! - Per-identity room presence state (one reading per node)
//! - Sequence guard against out-of-order delivery
//! - Timeout eviction by a single global sweep
//! - Closest-node recomputation

pub mod aggregator;
pub mod room;

pub use aggregator::*;
pub use room::*;
