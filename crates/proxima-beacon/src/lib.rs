//! Proxima Beacon - From radio packet to smoothed distance
//!
//! This crate implements the per-sighting stages of the pipeline:
//! - Beacon classification (generic vs structured beacon)
//! - Identity policy (admission, black/whitelist, overrides)
//! - Signal smoothing (one Kalman filter per identity)
//! - Distance estimation from smoothed signal strength

pub mod classifier;
pub mod distance;
pub mod policy;
pub mod smoother;

pub use classifier::*;
pub use distance::*;
pub use policy::*;
pub use smoother::*;
