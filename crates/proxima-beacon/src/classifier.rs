//! Beacon classification
//!
//! Structured beacons advertise a fixed vendor-data layout:
//!
//! | Bytes  | Field                          |
//! |--------|--------------------------------|
//! | 0-1    | Manufacturer code (LE) 0x004C  |
//! | 2      | Type code 0x02                 |
//! | 3      | Length code 0x15               |
//! | 4-19   | Proximity UUID                 |
//! | 20-21  | Major (BE)                     |
//! | 22-23  | Minor (BE)                     |
//! | 24     | Measured power at 1 m (i8)     |
//!
//! Anything else, including short or truncated payloads, is generic.

use proxima_core::{Beacon, BeaconId, BeaconSighting, ProximaConfig, StructuredFields};

/// Manufacturer code of the structured-beacon layout
pub const MANUFACTURER_CODE: u16 = 0x004C;

/// Type code at byte 2
pub const TYPE_CODE: u8 = 0x02;

/// Length code at byte 3
pub const LENGTH_CODE: u8 = 0x15;

/// Minimum vendor-data length of a structured beacon
pub const STRUCTURED_MIN_LEN: usize = 25;

const UUID_RANGE: std::ops::Range<usize> = 4..20;
const MAJOR_OFFSET: usize = 20;
const MINOR_OFFSET: usize = 22;
const POWER_OFFSET: usize = 24;

/// Turns sightings into typed beacons
#[derive(Clone, Debug)]
pub struct Classifier {
    major_mask: u16,
    minor_mask: u16,
    default_calibration: i8,
    process_structured: bool,
}

impl Classifier {
    pub fn new(major_mask: u16, minor_mask: u16, default_calibration: i8) -> Self {
        Classifier {
            major_mask,
            minor_mask,
            default_calibration,
            process_structured: true,
        }
    }

    pub fn from_config(config: &ProximaConfig) -> Self {
        Classifier {
            major_mask: config.major_mask,
            minor_mask: config.minor_mask,
            default_calibration: config.default_calibration_constant,
            process_structured: config.process_structured_beacons,
        }
    }

    /// Classify every sighting as generic
    pub fn with_structured_disabled(mut self) -> Self {
        self.process_structured = false;
        self
    }

    /// Classify a sighting. Pure function of its vendor data, identity and name.
    pub fn classify(&self, sighting: &BeaconSighting) -> Beacon {
        if self.process_structured {
            if let Some(fields) = self.decode_structured(&sighting.vendor_data) {
                let id = BeaconId::new(format!("{}-{}-{}", fields.uuid, fields.major, fields.minor));
                let name = display_name(sighting, &id);
                return Beacon::structured(id, name, fields);
            }
        }

        let id = BeaconId::new(sighting.id.clone());
        let name = display_name(sighting, &id);
        Beacon::generic(id, name, self.default_calibration)
    }

    fn decode_structured(&self, data: &[u8]) -> Option<StructuredFields> {
        if !is_structured_beacon(data) {
            return None;
        }

        let major = u16::from_be_bytes([data[MAJOR_OFFSET], data[MAJOR_OFFSET + 1]]);
        let minor = u16::from_be_bytes([data[MINOR_OFFSET], data[MINOR_OFFSET + 1]]);

        Some(StructuredFields {
            uuid: format_uuid(&data[UUID_RANGE]),
            major: major & self.major_mask,
            minor: minor & self.minor_mask,
            measured_power: data[POWER_OFFSET] as i8,
        })
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier::from_config(&ProximaConfig::default())
    }
}

/// Structured-beacon test: length and 4-byte magic prefix
pub fn is_structured_beacon(data: &[u8]) -> bool {
    data.len() >= STRUCTURED_MIN_LEN
        && u16::from_le_bytes([data[0], data[1]]) == MANUFACTURER_CODE
        && data[2] == TYPE_CODE
        && data[3] == LENGTH_CODE
}

fn display_name(sighting: &BeaconSighting, id: &BeaconId) -> String {
    let name = sighting.name.trim();
    if name.is_empty() {
        id.to_string()
    } else {
        name.to_string()
    }
}

/// Render 16 bytes as a lowercase 8-4-4-4-12 UUID
fn format_uuid(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(36);
    for (i, b) in bytes.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        out.push_str(&format!("{:02x}", b));
    }
    out
}
