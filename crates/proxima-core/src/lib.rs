//! Proxima Core - Fundamental types and primitives
//!
//! This crate defines the core types shared by every stage of the
//! beacon pipeline:
//! - Identifiers (BeaconId, NodeName)
//! - Time primitives (Timestamp)
//! - Sightings, classified beacons and distance events
//! - Configuration model and errors

pub mod id;
pub mod time;
pub mod beacon;
pub mod event;
pub mod config;
pub mod error;

pub use id::*;
pub use time::*;
pub use beacon::*;
pub use event::*;
pub use config::*;
pub use error::*;
