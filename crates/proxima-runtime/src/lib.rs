//! Proxima Runtime - Node orchestration
//!
//! This crate wires the pipeline stages into a running node:
//! 1. Scanner delivers sightings and adapter state changes
//! 2. Router classifies, filters, smooths and converts to distance
//! 3. Router applies the distance event locally and publishes it
//! 4. Remote events from the cluster are applied the same way
//! 5. A global sweep tick evicts expired readings and idle filters
//!
//! Everything for one node runs on a single actor, so the smoother and
//! the aggregator never see concurrent mutation.

pub mod node;
pub mod registry;
pub mod router;
pub mod scanner;
pub mod telemetry;

pub use node::*;
pub use registry::*;
pub use router::*;
pub use scanner::*;
pub use telemetry::*;
