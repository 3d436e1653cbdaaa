//! Signal smoothing
//!
//! One scalar Kalman filter per beacon identity. Each filter is created on
//! the first sighting of its identity and updated in arrival order; calls
//! for different identities never share state.

use std::collections::HashMap;
use std::time::Duration;

use proxima_core::{BeaconId, ProximaConfig, Timestamp};

/// Process noise
pub const PROCESS_NOISE: f64 = 0.065;

/// Measurement noise
pub const MEASUREMENT_NOISE: f64 = 1.4;

/// Scalar Kalman filter (A = 1, B = 0, C = 1)
#[derive(Clone, Debug)]
pub struct KalmanFilter {
    process_noise: f64,
    measurement_noise: f64,
    /// Current estimate, `None` until the first measurement
    estimate: Option<f64>,
    covariance: f64,
}

impl KalmanFilter {
    pub fn new(process_noise: f64, measurement_noise: f64) -> Self {
        KalmanFilter {
            process_noise,
            measurement_noise,
            estimate: None,
            covariance: 0.0,
        }
    }

    /// Feed one measurement and return the updated estimate
    pub fn update(&mut self, measurement: f64) -> f64 {
        let x = match self.estimate {
            None => {
                self.covariance = self.measurement_noise;
                measurement
            }
            Some(x) => {
                let predicted_cov = self.covariance + self.process_noise;
                let gain = predicted_cov / (predicted_cov + self.measurement_noise);
                self.covariance = predicted_cov - gain * predicted_cov;
                x + gain * (measurement - x)
            }
        };
        self.estimate = Some(x);
        x
    }

    pub fn estimate(&self) -> Option<f64> {
        self.estimate
    }

    pub fn covariance(&self) -> f64 {
        self.covariance
    }
}

impl Default for KalmanFilter {
    fn default() -> Self {
        KalmanFilter::new(PROCESS_NOISE, MEASUREMENT_NOISE)
    }
}

#[derive(Debug)]
struct FilterEntry {
    filter: KalmanFilter,
    last_used: Timestamp,
}

/// Identity-keyed filter store
#[derive(Debug)]
pub struct SignalSmoother {
    filters: HashMap<BeaconId, FilterEntry>,
    /// Filters held at most
    capacity: usize,
}

impl SignalSmoother {
    pub fn new(capacity: usize) -> Self {
        SignalSmoother {
            filters: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &ProximaConfig) -> Self {
        SignalSmoother::new(config.max_tracked_identities)
    }

    /// Update the identity's filter with a raw sample and return the
    /// smoothed value
    pub fn smooth(&mut self, id: &BeaconId, raw: f64, now: Timestamp) -> f64 {
        if !self.filters.contains_key(id) && self.filters.len() >= self.capacity {
            self.evict_least_recent();
        }

        let entry = self
            .filters
            .entry(id.clone())
            .or_insert_with(|| FilterEntry {
                filter: KalmanFilter::default(),
                last_used: now,
            });
        entry.last_used = now;
        entry.filter.update(raw)
    }

    /// Drop filters unused for longer than `idle`. Returns how many went.
    pub fn evict_idle(&mut self, now: Timestamp, idle: Duration) -> usize {
        let before = self.filters.len();
        self.filters.retain(|_, entry| now.since(entry.last_used) <= idle);
        let evicted = before - self.filters.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.filters.len(), "evicted idle filters");
        }
        evicted
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .filters
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            tracing::debug!(beacon = %id, "filter store full, evicting least recent");
            self.filters.remove(&id);
        }
    }

    pub fn contains(&self, id: &BeaconId) -> bool {
        self.filters.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Default for SignalSmoother {
    fn default() -> Self {
        SignalSmoother::from_config(&ProximaConfig::default())
    }
}
