//! Identity policy
//!
//! Applied in order after classification:
//! 1. Admission filter (structured beacons only)
//! 2. Blacklist
//! 3. Whitelist (empty list admits everything)
//! 4. Per-identity overrides

use std::collections::{HashMap, HashSet};

use regex::Regex;

use proxima_core::{Beacon, IdentityOverride, ProximaConfig, ProximaError, ProximaResult};

/// Why a beacon was dropped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// Generic beacon while only structured beacons are processed
    NotStructured,
    /// Identity matched the blacklist
    Blacklisted,
    /// Whitelist is active and the identity is not on it
    NotWhitelisted,
}

/// Policy outcome
#[derive(Clone, Debug, PartialEq)]
pub enum Admission {
    /// Admitted, overrides already applied
    Admitted(Beacon),
    Rejected(Rejection),
}

impl Admission {
    pub fn into_beacon(self) -> Option<Beacon> {
        match self {
            Admission::Admitted(beacon) => Some(beacon),
            Admission::Rejected(_) => None,
        }
    }
}

/// A compiled identity list
#[derive(Clone, Debug)]
pub enum PatternList {
    /// Exact string membership
    Exact(HashSet<String>),
    /// Any regular expression matches somewhere in the identity
    Regex(Vec<Regex>),
}

impl PatternList {
    /// Compile `patterns`; an invalid expression is a configuration error
    pub fn compile(patterns: &[String], regex_mode: bool) -> ProximaResult<Self> {
        if !regex_mode {
            return Ok(PatternList::Exact(patterns.iter().cloned().collect()));
        }

        let compiled = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ProximaError::InvalidPattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<ProximaResult<Vec<_>>>()?;
        Ok(PatternList::Regex(compiled))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PatternList::Exact(set) => set.is_empty(),
            PatternList::Regex(list) => list.is_empty(),
        }
    }

    pub fn matches(&self, identity: &str) -> bool {
        match self {
            PatternList::Exact(set) => set.contains(identity),
            PatternList::Regex(list) => list.iter().any(|re| re.is_match(identity)),
        }
    }
}

impl Default for PatternList {
    fn default() -> Self {
        PatternList::Exact(HashSet::new())
    }
}

/// Whitelist, blacklist and override rules
#[derive(Clone, Debug, Default)]
pub struct IdentityPolicy {
    only_structured: bool,
    whitelist: PatternList,
    blacklist: PatternList,
    overrides: HashMap<String, IdentityOverride>,
}

impl IdentityPolicy {
    /// Admit everything, override nothing
    pub fn permissive() -> Self {
        IdentityPolicy::default()
    }

    pub fn from_config(config: &ProximaConfig) -> ProximaResult<Self> {
        Ok(IdentityPolicy {
            only_structured: config.only_structured_beacons,
            whitelist: PatternList::compile(&config.whitelist, config.whitelist_regex)?,
            blacklist: PatternList::compile(&config.blacklist, config.blacklist_regex)?,
            overrides: config.identity_overrides.clone(),
        })
    }

    pub fn only_structured(mut self, value: bool) -> Self {
        self.only_structured = value;
        self
    }

    pub fn with_whitelist(mut self, list: PatternList) -> Self {
        self.whitelist = list;
        self
    }

    pub fn with_blacklist(mut self, list: PatternList) -> Self {
        self.blacklist = list;
        self
    }

    pub fn with_override(mut self, identity: impl Into<String>, rule: IdentityOverride) -> Self {
        self.overrides.insert(identity.into(), rule);
        self
    }

    /// Whitelist and blacklist check on a bare identity
    pub fn is_allowed(&self, identity: &str) -> bool {
        if !self.blacklist.is_empty() && self.blacklist.matches(identity) {
            return false;
        }
        self.whitelist.is_empty() || self.whitelist.matches(identity)
    }

    /// Run all checks and apply overrides to an admitted beacon
    pub fn admit(&self, mut beacon: Beacon) -> Admission {
        if self.only_structured && !beacon.is_structured() {
            return Admission::Rejected(Rejection::NotStructured);
        }

        let identity = beacon.id.as_str();
        if !self.blacklist.is_empty() && self.blacklist.matches(identity) {
            return Admission::Rejected(Rejection::Blacklisted);
        }
        if !self.whitelist.is_empty() && !self.whitelist.matches(identity) {
            return Admission::Rejected(Rejection::NotWhitelisted);
        }

        if let Some(rule) = self.overrides.get(identity) {
            if let Some(calibration) = rule.calibration_constant {
                tracing::trace!(beacon = %beacon.id, calibration, "calibration override");
                beacon.calibration = calibration;
            }
            if let Some(name) = &rule.name {
                beacon.name = name.clone();
            }
        }

        Admission::Admitted(beacon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxima_core::{BeaconId, StructuredFields};

    fn generic(id: &str) -> Beacon {
        Beacon::generic(BeaconId::new(id), id.to_string(), -59)
    }

    fn exact(patterns: &[&str]) -> PatternList {
        let owned: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        PatternList::compile(&owned, false).unwrap()
    }

    fn regex(patterns: &[&str]) -> PatternList {
        let owned: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        PatternList::compile(&owned, true).unwrap()
    }

    #[test]
    fn test_empty_whitelist_admits_all() {
        let policy = IdentityPolicy::permissive();
        for id in ["abc", "abcd", "", "anything"] {
            assert!(matches!(policy.admit(generic(id)), Admission::Admitted(_)));
        }
    }

    #[test]
    fn test_exact_whitelist() {
        let policy = IdentityPolicy::permissive().with_whitelist(exact(&["abc"]));
        assert!(matches!(policy.admit(generic("abc")), Admission::Admitted(_)));
        assert_eq!(
            policy.admit(generic("abcd")),
            Admission::Rejected(Rejection::NotWhitelisted)
        );
    }

    #[test]
    fn test_regex_whitelist() {
        let policy = IdentityPolicy::permissive().with_whitelist(regex(&["^abc"]));
        assert!(policy.is_allowed("abc"));
        assert!(policy.is_allowed("abcd"));
        assert!(!policy.is_allowed("xabc"));
    }

    #[test]
    fn test_blacklist_wins_over_whitelist() {
        let policy = IdentityPolicy::permissive()
            .with_whitelist(regex(&["^abc"]))
            .with_blacklist(exact(&["abcd"]));
        assert!(policy.is_allowed("abc"));
        assert_eq!(
            policy.admit(generic("abcd")),
            Admission::Rejected(Rejection::Blacklisted)
        );
    }

    #[test]
    fn test_only_structured_drops_generic() {
        let policy = IdentityPolicy::permissive().only_structured(true);
        assert_eq!(
            policy.admit(generic("abc")),
            Admission::Rejected(Rejection::NotStructured)
        );

        let fields = StructuredFields {
            uuid: "u".into(),
            major: 1,
            minor: 1,
            measured_power: -60,
        };
        let beacon = Beacon::structured(BeaconId::new("u-1-1"), "u".into(), fields);
        assert!(matches!(policy.admit(beacon), Admission::Admitted(_)));
    }

    #[test]
    fn test_override_replaces_calibration_and_name() {
        let policy = IdentityPolicy::permissive().with_override(
            "abc",
            IdentityOverride {
                calibration_constant: Some(-72),
                name: Some("Keys".into()),
            },
        );
        let beacon = policy.admit(generic("abc")).into_beacon().unwrap();
        assert_eq!(beacon.calibration, -72);
        assert_eq!(beacon.name, "Keys");

        let untouched = policy.admit(generic("abd")).into_beacon().unwrap();
        assert_eq!(untouched.calibration, -59);
    }

    #[test]
    fn test_override_not_applied_to_rejected() {
        let policy = IdentityPolicy::permissive()
            .with_whitelist(exact(&["other"]))
            .with_override("abc", IdentityOverride {
                calibration_constant: Some(-72),
                name: None,
            });
        assert!(policy.admit(generic("abc")).into_beacon().is_none());
    }

    #[test]
    fn test_invalid_regex_is_config_error() {
        let err = PatternList::compile(&["(unclosed".to_string()], true).unwrap_err();
        assert!(matches!(err, ProximaError::InvalidPattern { .. }));
    }

    #[test]
    fn test_from_config() {
        let config = ProximaConfig {
            whitelist: vec!["^tag-".into()],
            whitelist_regex: true,
            ..Default::default()
        };
        let policy = IdentityPolicy::from_config(&config).unwrap();
        assert!(policy.is_allowed("tag-1"));
        assert!(!policy.is_allowed("phone"));
    }
}
