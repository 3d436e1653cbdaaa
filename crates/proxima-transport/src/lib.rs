//! Proxima Transport Layer - Cluster publish/subscribe
//!
//! This crate provides:
//! - The cluster transport interface
//! - In-process hub (tests, single-host clusters)
//! - UDP transport to a static peer list

pub mod cluster;
pub mod local;
pub mod udp;

pub use cluster::*;
pub use local::*;
pub use udp::*;
