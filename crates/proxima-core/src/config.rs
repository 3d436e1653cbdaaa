//! Configuration model
//!
//! Loaded from JSON with camelCase keys. Every option has a default, so an
//! empty object is a valid configuration.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{NodeName, ProximaError, ProximaResult};

/// Per-identity field overrides
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityOverride {
    /// Replaces the beacon's own calibration constant
    pub calibration_constant: Option<i8>,
    /// Replaces the beacon's display name
    pub name: Option<String>,
}

/// Proxima configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProximaConfig {
    /// Name this node stamps on its distance events
    pub node_name: NodeName,
    /// Cluster channel distance events are published on
    pub channel: String,
    /// Drop generic beacons before any further work
    pub only_structured_beacons: bool,
    /// Decode structured beacons; when off every sighting is generic
    pub process_structured_beacons: bool,
    pub whitelist: Vec<String>,
    pub whitelist_regex: bool,
    pub blacklist: Vec<String>,
    pub blacklist_regex: bool,
    pub identity_overrides: HashMap<String, IdentityOverride>,
    /// Age after which a node's reading no longer counts
    pub presence_timeout_seconds: f64,
    /// Period of the global eviction sweep
    pub sweep_interval_seconds: f64,
    pub major_mask: u16,
    pub minor_mask: u16,
    /// Calibration constant for generic beacons (dBm at 1 m)
    pub default_calibration_constant: i8,
    pub path_loss_exponent: f64,
    /// Readings further away than this are dropped
    pub max_distance: Option<f64>,
    /// Minimum spacing between two events for the same identity
    pub update_frequency_seconds: f64,
    /// Smoothing filters unused for this long are evicted
    pub filter_idle_seconds: f64,
    /// Upper bound on smoothing filters held at once
    pub max_tracked_identities: usize,
}

impl Default for ProximaConfig {
    fn default() -> Self {
        ProximaConfig {
            node_name: NodeName::new("proxima"),
            channel: "proxima.distance".to_string(),
            only_structured_beacons: false,
            process_structured_beacons: true,
            whitelist: Vec::new(),
            whitelist_regex: false,
            blacklist: Vec::new(),
            blacklist_regex: false,
            identity_overrides: HashMap::new(),
            presence_timeout_seconds: 60.0,
            sweep_interval_seconds: 1.0,
            major_mask: 0xFFFF,
            minor_mask: 0xFFFF,
            default_calibration_constant: -59,
            path_loss_exponent: 2.0,
            max_distance: None,
            update_frequency_seconds: 0.0,
            filter_idle_seconds: 3600.0,
            max_tracked_identities: 4096,
        }
    }
}

impl ProximaConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(s: &str) -> ProximaResult<Self> {
        let config: ProximaConfig = serde_json::from_str(s)
            .map_err(|e| ProximaError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> ProximaResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Check numeric ranges. Pattern syntax is checked when the identity
    /// policy compiles its lists.
    pub fn validate(&self) -> ProximaResult<()> {
        if self.node_name.as_str().is_empty() {
            return Err(ProximaError::InvalidConfig("nodeName must not be empty".into()));
        }
        if self.channel.is_empty() {
            return Err(ProximaError::InvalidConfig("channel must not be empty".into()));
        }
        positive("presenceTimeoutSeconds", self.presence_timeout_seconds)?;
        positive("sweepIntervalSeconds", self.sweep_interval_seconds)?;
        positive("pathLossExponent", self.path_loss_exponent)?;
        positive("filterIdleSeconds", self.filter_idle_seconds)?;
        if !self.update_frequency_seconds.is_finite() || self.update_frequency_seconds < 0.0 {
            return Err(ProximaError::InvalidConfig(
                "updateFrequencySeconds must be zero or positive".into(),
            ));
        }
        within_range("presenceTimeoutSeconds", self.presence_timeout_seconds)?;
        within_range("sweepIntervalSeconds", self.sweep_interval_seconds)?;
        within_range("updateFrequencySeconds", self.update_frequency_seconds)?;
        within_range("filterIdleSeconds", self.filter_idle_seconds)?;
        if let Some(max) = self.max_distance {
            positive("maxDistance", max)?;
        }
        if self.max_tracked_identities == 0 {
            return Err(ProximaError::InvalidConfig(
                "maxTrackedIdentities must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn presence_timeout(&self) -> Duration {
        seconds(self.presence_timeout_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        seconds(self.sweep_interval_seconds)
    }

    pub fn update_frequency(&self) -> Duration {
        seconds(self.update_frequency_seconds)
    }

    pub fn filter_idle(&self) -> Duration {
        seconds(self.filter_idle_seconds)
    }
}

/// Longest duration any setting may take (ten years)
pub const MAX_CONFIG_SECONDS: f64 = 315_360_000.0;

/// Clamp into `0..=MAX_CONFIG_SECONDS`; NaN reads as zero. Values outside
/// that range never pass `validate`.
fn seconds(value: f64) -> Duration {
    let clamped = if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, MAX_CONFIG_SECONDS)
    };
    Duration::try_from_secs_f64(clamped).unwrap_or(Duration::ZERO)
}

fn within_range(field: &str, value: f64) -> ProximaResult<()> {
    match Duration::try_from_secs_f64(value) {
        Ok(_) if value <= MAX_CONFIG_SECONDS => Ok(()),
        _ => Err(ProximaError::InvalidConfig(format!(
            "{field} must be at most {MAX_CONFIG_SECONDS} seconds, got {value}"
        ))),
    }
}

fn positive(field: &str, value: f64) -> ProximaResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ProximaError::InvalidConfig(format!(
            "{field} must be positive, got {value}"
        )))
    }
}
