//! Proxima Test Harness - Faulty links and cluster simulation
//!
//! This crate provides:
//! - Seeded one-way links (latency, jitter, burst loss, hold-back, duplication)
//! - A multi-node cluster simulator driving real routers over encoded frames

pub mod link;
pub mod simulator;

pub use link::*;
pub use simulator::*;
