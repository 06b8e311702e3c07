//! Relationship implementation for the property graph

use super::property::{PropertyMap, PropertyValue};
use super::types::{NodeId, RelKey, RelType};
use serde::{Deserialize, Serialize};

/// A directed, typed relationship
///
/// The `(source, target, rel_type)` triple is the relationship's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// Source node (relationship goes FROM this node)
    pub source: NodeId,

    /// Target node (relationship goes TO this node)
    pub target: NodeId,

    /// Type of relationship (e.g., "KNOWS", "TREATS")
    #[serde(rename = "type")]
    pub rel_type: RelType,

    /// Properties associated with this relationship
    #[serde(default)]
    pub properties: PropertyMap,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl Relationship {
    pub fn new(
        source: NodeId,
        target: NodeId,
        rel_type: impl Into<RelType>,
        properties: PropertyMap,
    ) -> Self {
        Relationship {
            source,
            target,
            rel_type: rel_type.into(),
            properties,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// The identity triple of this relationship
    pub fn key(&self) -> RelKey {
        RelKey::new(self.source, self.target, self.rel_type.clone())
    }

    pub fn set_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        self.properties.insert(key.into(), value.into())
    }

    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn remove_property(&mut self, key: &str) -> Option<PropertyValue> {
        self.properties.remove(key)
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Check if this relationship touches a node as source or target
    pub fn touches(&self, node: NodeId) -> bool {
        self.source == node || self.target == node
    }
}

impl PartialEq for Relationship {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.target == other.target
            && self.rel_type == other.rel_type
    }
}

impl Eq for Relationship {}
