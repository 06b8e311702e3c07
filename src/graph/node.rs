//! Node implementation for the property graph

use super::property::{PropertyMap, PropertyValue};
use super::types::{Label, NodeId};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// A node in the property graph
///
/// Nodes have:
/// - A stable ID, immutable once assigned
/// - A display name (not unique)
/// - An ordered, duplicate-free set of labels; the first one is the node's category
/// - Properties (scalar key-value pairs)
/// - Creation and update timestamps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier for this node
    pub id: NodeId,

    /// Display name used by search and name resolution
    pub name: String,

    /// Labels in insertion order
    pub labels: IndexSet<Label>,

    /// Properties associated with this node
    #[serde(default)]
    pub properties: PropertyMap,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Node {
    /// Create a new node. Label validation is the store's job.
    pub fn new(
        id: NodeId,
        name: impl Into<String>,
        labels: IndexSet<Label>,
        properties: PropertyMap,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Node {
            id,
            name: name.into(),
            labels,
            properties,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rename this node
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    /// Add a label. Returns false if it was already present.
    pub fn add_label(&mut self, label: impl Into<Label>) -> bool {
        let added = self.labels.insert(label.into());
        if added {
            self.touch();
        }
        added
    }

    /// Remove a label, keeping the order of the remaining ones.
    pub fn remove_label(&mut self, label: &Label) -> bool {
        let removed = self.labels.shift_remove(label);
        if removed {
            self.touch();
        }
        removed
    }

    /// Check if node has a specific label
    pub fn has_label(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }

    /// The first label, shown as the node's category.
    pub fn category(&self) -> Option<&Label> {
        self.labels.first()
    }

    /// Set a property value, returning the previous one
    pub fn set_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        let old = self.properties.insert(key.into(), value.into());
        self.touch();
        old
    }

    /// Get a property value
    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Remove a property
    pub fn remove_property(&mut self, key: &str) -> Option<PropertyValue> {
        let removed = self.properties.remove(key);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
