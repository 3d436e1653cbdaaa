//! Beacon sightings and classified beacons
//!
//! A `BeaconSighting` is what the scanner hands over for every radio
//! packet. A `Beacon` is rebuilt from each sighting by the classifier and
//! carries no state between sightings.

use crate::BeaconId;

/// One radio packet as delivered by the scanner
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BeaconSighting {
    /// Hardware identity reported by the adapter
    pub id: String,
    /// Raw signal strength (dBm)
    pub rssi: i16,
    /// Manufacturer-specific advertisement data
    pub vendor_data: Vec<u8>,
    /// Advertised local name, may be empty
    pub name: String,
    /// Advertisement flags byte, carried as reported
    pub flags: u8,
}

impl BeaconSighting {
    pub fn new(id: impl Into<String>, rssi: i16) -> Self {
        BeaconSighting {
            id: id.into(),
            rssi,
            ..Default::default()
        }
    }

    pub fn with_vendor_data(mut self, data: Vec<u8>) -> Self {
        self.vendor_data = data;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }
}

/// Fields decoded from a structured-beacon advertisement
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructuredFields {
    /// Proximity UUID, lowercase and hyphenated
    pub uuid: String,
    pub major: u16,
    pub minor: u16,
    /// Advertised signal strength at 1 m (dBm)
    pub measured_power: i8,
}

/// Beacon variant
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BeaconKind {
    Generic,
    Structured(StructuredFields),
}

/// A classified beacon
#[derive(Clone, Debug, PartialEq)]
pub struct Beacon {
    pub id: BeaconId,
    /// Display name
    pub name: String,
    /// Expected signal strength at 1 m, used by the distance formula
    pub calibration: i8,
    pub kind: BeaconKind,
}

impl Beacon {
    pub fn generic(id: BeaconId, name: String, calibration: i8) -> Self {
        Beacon {
            id,
            name,
            calibration,
            kind: BeaconKind::Generic,
        }
    }

    pub fn structured(id: BeaconId, name: String, fields: StructuredFields) -> Self {
        Beacon {
            id,
            name,
            calibration: fields.measured_power,
            kind: BeaconKind::Structured(fields),
        }
    }

    #[inline]
    pub fn is_structured(&self) -> bool {
        matches!(self.kind, BeaconKind::Structured(_))
    }

    pub fn structured_fields(&self) -> Option<&StructuredFields> {
        match &self.kind {
            BeaconKind::Structured(fields) => Some(fields),
            BeaconKind::Generic => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sighting_builder() {
        let sighting = BeaconSighting::new("tag", -70)
            .with_name("Keys")
            .with_flags(0x06)
            .with_vendor_data(vec![0x4c, 0x00]);
        assert_eq!(sighting.flags, 0x06);
        assert_eq!(sighting.name, "Keys");
        assert_eq!(sighting.vendor_data, vec![0x4c, 0x00]);
        assert_eq!(BeaconSighting::new("tag", -70).flags, 0);
    }

    #[test]
    fn test_structured_beacon_takes_measured_power() {
        let fields = StructuredFields {
            uuid: "e2c56db5-dffb-48d2-b060-d0f5a71096e0".into(),
            major: 1,
            minor: 2,
            measured_power: -65,
        };
        let beacon = Beacon::structured(BeaconId::new("x"), "x".into(), fields);
        assert!(beacon.is_structured());
        assert_eq!(beacon.calibration, -65);
        assert_eq!(beacon.structured_fields().map(|f| f.minor), Some(2));
    }
}
