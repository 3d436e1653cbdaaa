//! Identity types for Proxima
//!
//! Beacons and nodes are identified by strings: a beacon by its hardware
//! address or structured-beacon triple, a node by its configured name.
//! Both are compared exactly; normalization happens where they are built.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Beacon identity - hardware address or `{uuid}-{major}-{minor}`
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BeaconId(String);

impl BeaconId {
    pub fn new(id: impl Into<String>) -> Self {
        BeaconId(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Entity-safe form of the identity: lowercase ASCII alphanumerics,
    /// every other run of characters collapsed into a single `-`.
    pub fn slug(&self) -> String {
        let mut out = String::with_capacity(self.0.len());
        let mut pending_dash = false;
        for c in self.0.chars() {
            if c.is_ascii_alphanumeric() {
                if pending_dash && !out.is_empty() {
                    out.push('-');
                }
                pending_dash = false;
                out.push(c.to_ascii_lowercase());
            } else {
                pending_dash = true;
            }
        }
        out
    }
}

impl fmt::Debug for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Beacon({})", self.0)
    }
}

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BeaconId {
    fn from(s: &str) -> Self {
        BeaconId::new(s)
    }
}

impl From<String> for BeaconId {
    fn from(s: String) -> Self {
        BeaconId(s)
    }
}

/// Node name - one participating instance of the service
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(name: impl Into<String>) -> Self {
        NodeName(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeName {
    fn from(s: &str) -> Self {
        NodeName::new(s)
    }
}

impl From<String> for NodeName {
    fn from(s: String) -> Self {
        NodeName(s)
    }
}
