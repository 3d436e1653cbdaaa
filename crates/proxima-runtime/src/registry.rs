//! Entity registry collaborator
//!
//! Every beacon identity gets up to two externally visible entities: a
//! distance entity for this node's own measurement and a presence entity
//! holding the closest node. The registry is injected into the router so
//! tests and embedders can swap it out.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde::Serialize;

use proxima_core::NodeName;

/// What an entity represents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Distance measured by this node
    Distance,
    /// Closest node across the cluster
    Presence,
}

/// Externally observed state of an entity
#[derive(Clone, Debug, PartialEq, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum EntityState {
    #[default]
    Unknown,
    /// Metres
    Distance(f64),
    /// Name of the closest node
    Room(NodeName),
    /// No live reading anywhere in the cluster
    Away,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::Unknown => f.write_str("unknown"),
            EntityState::Distance(d) => write!(f, "{d}"),
            EntityState::Room(node) => write!(f, "{node}"),
            EntityState::Away => f.write_str("not_home"),
        }
    }
}

/// Presentation hints attached when an entity is created
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize)]
pub struct Customizations {
    pub icon: Option<String>,
    pub unit_of_measurement: Option<String>,
}

impl Customizations {
    pub fn icon(icon: impl Into<String>) -> Self {
        Customizations {
            icon: Some(icon.into()),
            unit_of_measurement: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit_of_measurement = Some(unit.into());
        self
    }
}

/// One registered entity
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub state: EntityState,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: EntityKind) -> Self {
        Entity {
            id: id.into(),
            name: name.into(),
            kind,
            state: EntityState::Unknown,
        }
    }
}

/// Registry of externally visible entities
pub trait EntityRegistry: Send + Sync {
    fn has(&self, id: &str) -> bool;

    fn get(&self, id: &str) -> Option<Entity>;

    /// Register an entity. Adding an id that already exists returns the
    /// existing entity untouched.
    fn add(&self, entity: Entity, customizations: Customizations) -> Entity;

    /// Set an entity's state. Returns false when the id is unknown.
    fn update_state(&self, id: &str, state: EntityState) -> bool;
}

#[derive(Debug)]
struct Registered {
    entity: Entity,
    customizations: Customizations,
}

/// In-memory registry
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entities: RwLock<HashMap<String, Registered>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        MemoryRegistry::default()
    }

    pub fn customizations(&self, id: &str) -> Option<Customizations> {
        self.entities
            .read()
            .get(id)
            .map(|r| r.customizations.clone())
    }

    /// All entities, sorted by id
    pub fn snapshot(&self) -> Vec<Entity> {
        let mut all: Vec<Entity> = self
            .entities
            .read()
            .values()
            .map(|r| r.entity.clone())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}

impl EntityRegistry for MemoryRegistry {
    fn has(&self, id: &str) -> bool {
        self.entities.read().contains_key(id)
    }

    fn get(&self, id: &str) -> Option<Entity> {
        self.entities.read().get(id).map(|r| r.entity.clone())
    }

    fn add(&self, entity: Entity, customizations: Customizations) -> Entity {
        let mut entities = self.entities.write();
        entities
            .entry(entity.id.clone())
            .or_insert_with(|| {
                tracing::debug!(entity = %entity.id, kind = ?entity.kind, "entity registered");
                Registered {
                    entity,
                    customizations,
                }
            })
            .entity
            .clone()
    }

    fn update_state(&self, id: &str, state: EntityState) -> bool {
        match self.entities.write().get_mut(id) {
            Some(registered) => {
                registered.entity.state = state;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let registry = MemoryRegistry::new();
        registry.add(
            Entity::new("ble-tag", "Tag", EntityKind::Presence),
            Customizations::icon("mdi:account-location"),
        );
        registry.update_state("ble-tag", EntityState::Room(NodeName::new("kitchen")));

        let again = registry.add(
            Entity::new("ble-tag", "Other", EntityKind::Presence),
            Customizations::default(),
        );
        assert_eq!(again.name, "Tag");
        assert_eq!(again.state, EntityState::Room(NodeName::new("kitchen")));
        assert_eq!(
            registry.customizations("ble-tag").unwrap().icon.as_deref(),
            Some("mdi:account-location")
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_unknown_entity() {
        let registry = MemoryRegistry::new();
        assert!(!registry.update_state("missing", EntityState::Away));
        assert!(!registry.has("missing"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(EntityState::Distance(2.5).to_string(), "2.5");
        assert_eq!(EntityState::Room(NodeName::new("hall")).to_string(), "hall");
        assert_eq!(EntityState::Away.to_string(), "not_home");
    }

    #[test]
    fn test_entity_json() {
        let mut entity = Entity::new("ble-tag-distance", "Tag Distance", EntityKind::Distance);
        entity.state = EntityState::Distance(1.5);
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["kind"], "distance");
        assert_eq!(json["state"]["kind"], "distance");
        assert_eq!(json["state"]["value"], 1.5);
    }
}
