//! Proxima Wire Protocol - Cluster frame format
//!
//! A cluster frame carries one distance event on a named channel:
//! - Fixed header (6 bytes: magic, version, channel length)
//! - Channel name (UTF-8)
//! - Payload length (u16 LE) and JSON payload

pub mod frame;
pub mod header;

pub use frame::*;
pub use header::*;
