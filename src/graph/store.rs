//! In-memory graph storage
//!
//! The store owns every node and relationship. The label index and the
//! identifier registry are secondary indices into the same arena and are
//! updated inside the same `&mut self` call as the primary data, so a caller
//! holding the store can never observe them disagreeing.

use super::edge::Relationship;
use super::label_index::LabelIndex;
use super::node::Node;
use super::property::{self, PropertyMap, PropertyValue};
use super::registry::IdRegistry;
use super::types::{EdgeId, Label, NodeId, RelKey, RelType};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during graph operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Relationship {0} not found")]
    RelationshipNotFound(RelKey),

    #[error("Node {0} already exists")]
    NodeAlreadyExists(NodeId),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type GraphResult<T> = Result<T, GraphError>;

fn invalid(msg: impl Into<String>) -> GraphError {
    GraphError::InvalidOperation(msg.into())
}

/// Reference to a property-bearing entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Node(NodeId),
    Relationship(RelKey),
}

/// Result of a cascading node delete
#[derive(Debug, Clone, Serialize)]
pub struct DeletedNode {
    pub node: Node,
    pub relationships: Vec<Relationship>,
}

/// Outcome of creating a relationship whose triple may already exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

/// Full copy of the graph: the "get graph" view and the snapshot body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
}

/// Graph-wide counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphStatistics {
    pub node_count: usize,
    pub relationship_count: usize,
    pub labels: BTreeMap<String, usize>,
    pub relationship_types: BTreeMap<String, usize>,
}

/// In-memory graph storage
///
/// - nodes: NodeId -> Node, ordered so listings come out by ascending id
/// - edges: arena of relationship slots, freed slots are reused
/// - rel_index: identity triple -> arena slot
/// - outgoing / incoming: adjacency lists per node
/// - labels: Label -> nodes
/// - registry: id allocation and name -> nodes
#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: BTreeMap<NodeId, Node>,
    edges: Vec<Option<Relationship>>,
    free_edge_ids: Vec<usize>,
    rel_index: HashMap<RelKey, EdgeId>,
    outgoing: HashMap<NodeId, Vec<EdgeId>>,
    incoming: HashMap<NodeId, Vec<EdgeId>>,
    labels: LabelIndex,
    registry: IdRegistry,
}

impl GraphStore {
    /// Create a new empty graph store
    pub fn new() -> Self {
        Self::default()
    }

    // ============================================================
    // Nodes
    // ============================================================

    /// Create a node with a freshly allocated id
    pub fn create_node<I, S>(
        &mut self,
        name: &str,
        labels: I,
        properties: PropertyMap,
    ) -> GraphResult<NodeId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (name, labels) = Self::validate_node(name, labels, &properties)?;
        let id = self
            .registry
            .allocate()
            .ok_or_else(|| invalid("node id space is exhausted"))?;
        self.insert_node(Node::new(id, name, labels, properties));
        Ok(id)
    }

    /// Create a node under a caller-chosen id (bulk import with an `id` column)
    pub fn create_node_with_id<I, S>(
        &mut self,
        id: NodeId,
        name: &str,
        labels: I,
        properties: PropertyMap,
    ) -> GraphResult<NodeId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.nodes.contains_key(&id) {
            return Err(GraphError::NodeAlreadyExists(id));
        }
        let (name, labels) = Self::validate_node(name, labels, &properties)?;
        if !self.registry.reserve(id) {
            return Err(invalid(format!("node id {} is out of range", id)));
        }
        self.insert_node(Node::new(id, name, labels, properties));
        Ok(id)
    }

    fn validate_node<I, S>(
        name: &str,
        labels: I,
        properties: &PropertyMap,
    ) -> GraphResult<(String, IndexSet<Label>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid("node name must not be empty"));
        }

        let mut set = IndexSet::new();
        for raw in labels {
            let label = Label::normalized(raw.as_ref())
                .ok_or_else(|| invalid("labels must not be blank"))?;
            if !set.insert(label.clone()) {
                return Err(invalid(format!("duplicate label '{}'", label)));
            }
        }
        if set.is_empty() {
            return Err(invalid("a node needs at least one label"));
        }

        for (key, value) in properties {
            property::validate_entry(key, value).map_err(invalid)?;
        }
        Ok((name.to_string(), set))
    }

    fn insert_node(&mut self, node: Node) {
        let id = node.id;
        for label in &node.labels {
            self.labels.insert(label, id);
        }
        self.registry.register(id, &node.name);
        debug!("Created node {} '{}'", id, node.name);
        self.nodes.insert(id, node);
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn require_node(&self, id: NodeId) -> GraphResult<&Node> {
        self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    fn node_mut(&mut self, id: NodeId) -> GraphResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))
    }

    /// Update a node's name. `None` leaves the node unchanged.
    pub fn update_node(&mut self, id: NodeId, name: Option<&str>) -> GraphResult<&Node> {
        self.require_node(id)?;
        if let Some(new_name) = name {
            let new_name = new_name.trim();
            if new_name.is_empty() {
                return Err(invalid("node name must not be empty"));
            }
            let node = self.node_mut(id)?;
            let old_name = node.name.clone();
            node.set_name(new_name);
            self.registry.rename(id, &old_name, new_name);
            debug!("Renamed node {} '{}' -> '{}'", id, old_name, new_name);
        }
        self.require_node(id)
    }

    /// Delete a node and every relationship where it is source or target
    pub fn delete_node(&mut self, id: NodeId) -> GraphResult<DeletedNode> {
        self.require_node(id)?;

        let mut edge_ids = self.outgoing.remove(&id).unwrap_or_default();
        edge_ids.extend(self.incoming.remove(&id).unwrap_or_default());
        edge_ids.sort_unstable();
        // self-loops sit in both lists
        edge_ids.dedup();

        let mut relationships: Vec<Relationship> = edge_ids
            .into_iter()
            .filter_map(|edge_id| self.remove_edge(edge_id))
            .collect();
        relationships.sort_by_key(|r| r.key());

        let node = self.nodes.remove(&id).ok_or(GraphError::NodeNotFound(id))?;
        for label in &node.labels {
            self.labels.remove(label, id);
        }
        self.registry.unregister(id, &node.name);

        debug!(
            "Deleted node {} and {} relationship(s)",
            id,
            relationships.len()
        );
        Ok(DeletedNode {
            node,
            relationships,
        })
    }

    // ============================================================
    // Labels
    // ============================================================

    /// Add a label; adding a label the node already has is a no-op
    pub fn add_label(&mut self, id: NodeId, label: &str) -> GraphResult<&Node> {
        let label = Label::normalized(label).ok_or_else(|| invalid("labels must not be blank"))?;
        let node = self.node_mut(id)?;
        if node.add_label(label.clone()) {
            self.labels.insert(&label, id);
            debug!("Added label {} to node {}", label, id);
        }
        self.require_node(id)
    }

    /// Remove a label; a node must keep at least one
    pub fn remove_label(&mut self, id: NodeId, label: &str) -> GraphResult<&Node> {
        let label = Label::normalized(label).ok_or_else(|| invalid("labels must not be blank"))?;
        let (present, count) = {
            let node = self.require_node(id)?;
            (node.has_label(&label), node.label_count())
        };
        if !present {
            return self.require_node(id);
        }
        if count == 1 {
            return Err(invalid(format!(
                "cannot remove '{}': node {} must keep at least one label",
                label, id
            )));
        }

        self.node_mut(id)?.remove_label(&label);
        self.labels.remove(&label, id);
        debug!("Removed label {} from node {}", label, id);
        self.require_node(id)
    }

    pub fn nodes_by_label(&self, label: &Label) -> Vec<&Node> {
        self.labels
            .nodes_with(label)
            .into_iter()
            .filter_map(|id| self.nodes.get(&id))
            .collect()
    }

    // ============================================================
    // Properties
    // ============================================================

    pub fn set_node_property(
        &mut self,
        id: NodeId,
        key: &str,
        value: PropertyValue,
    ) -> GraphResult<&Node> {
        property::validate_entry(key, &value).map_err(invalid)?;
        self.node_mut(id)?.set_property(key, value);
        self.require_node(id)
    }

    /// Remove a node property; a missing key is not an error
    pub fn delete_node_property(&mut self, id: NodeId, key: &str) -> GraphResult<&Node> {
        property::validate_key(key).map_err(invalid)?;
        self.node_mut(id)?.remove_property(key);
        self.require_node(id)
    }

    pub fn set_relationship_property(
        &mut self,
        rel: &RelKey,
        key: &str,
        value: PropertyValue,
    ) -> GraphResult<&Relationship> {
        property::validate_entry(key, &value).map_err(invalid)?;
        self.relationship_mut(rel)?.set_property(key, value);
        self.require_relationship(rel)
    }

    /// Remove a relationship property; a missing key is not an error
    pub fn delete_relationship_property(
        &mut self,
        rel: &RelKey,
        key: &str,
    ) -> GraphResult<&Relationship> {
        property::validate_key(key).map_err(invalid)?;
        self.relationship_mut(rel)?.remove_property(key);
        self.require_relationship(rel)
    }

    /// Set a property on either kind of entity
    pub fn set_property(
        &mut self,
        entity: &EntityRef,
        key: &str,
        value: PropertyValue,
    ) -> GraphResult<()> {
        match entity {
            EntityRef::Node(id) => self.set_node_property(*id, key, value).map(|_| ()),
            EntityRef::Relationship(rel) => {
                self.set_relationship_property(rel, key, value).map(|_| ())
            }
        }
    }

    /// Delete a property from either kind of entity
    pub fn delete_property(&mut self, entity: &EntityRef, key: &str) -> GraphResult<()> {
        match entity {
            EntityRef::Node(id) => self.delete_node_property(*id, key).map(|_| ()),
            EntityRef::Relationship(rel) => {
                self.delete_relationship_property(rel, key).map(|_| ())
            }
        }
    }

    // ============================================================
    // Relationships
    // ============================================================

    /// Create a relationship, or merge `properties` into the existing one
    /// with the same `(source, target, type)` triple.
    pub fn create_relationship(
        &mut self,
        source: NodeId,
        target: NodeId,
        rel_type: &str,
        properties: PropertyMap,
    ) -> GraphResult<(Upsert, &Relationship)> {
        self.require_node(source)?;
        self.require_node(target)?;
        let rel_type = RelType::normalized(rel_type)
            .ok_or_else(|| invalid("relationship type must not be blank"))?;
        for (key, value) in &properties {
            property::validate_entry(key, value).map_err(invalid)?;
        }

        let key = RelKey::new(source, target, rel_type.clone());
        if let Some(&edge_id) = self.rel_index.get(&key) {
            if let Some(existing) = self.edges[edge_id.index()].as_mut() {
                existing.properties.extend(properties);
            }
            debug!("Updated relationship {}", key);
            return Ok((Upsert::Updated, self.require_relationship(&key)?));
        }

        let edge_id = match self.free_edge_ids.pop() {
            Some(slot) => EdgeId::new(slot),
            None => {
                self.edges.push(None);
                EdgeId::new(self.edges.len() - 1)
            }
        };
        self.edges[edge_id.index()] = Some(Relationship::new(source, target, rel_type, properties));
        self.outgoing.entry(source).or_default().push(edge_id);
        self.incoming.entry(target).or_default().push(edge_id);
        self.rel_index.insert(key.clone(), edge_id);

        debug!("Created relationship {}", key);
        Ok((Upsert::Created, self.require_relationship(&key)?))
    }

    /// Arena slot for `key`, matching the type the way `create_relationship`
    /// stores it
    fn edge_for(&self, key: &RelKey) -> Option<EdgeId> {
        match self.rel_index.get(key) {
            Some(&edge_id) => Some(edge_id),
            None => self.rel_index.get(&key.normalized()).copied(),
        }
    }

    pub fn get_relationship(&self, key: &RelKey) -> Option<&Relationship> {
        self.edge_for(key)
            .and_then(|edge_id| self.edges[edge_id.index()].as_ref())
    }

    pub fn require_relationship(&self, key: &RelKey) -> GraphResult<&Relationship> {
        self.get_relationship(key)
            .ok_or_else(|| GraphError::RelationshipNotFound(key.clone()))
    }

    pub fn has_relationship(&self, key: &RelKey) -> bool {
        self.edge_for(key).is_some()
    }

    fn relationship_mut(&mut self, key: &RelKey) -> GraphResult<&mut Relationship> {
        let edge_id = self
            .edge_for(key)
            .ok_or_else(|| GraphError::RelationshipNotFound(key.clone()))?;
        self.edges[edge_id.index()]
            .as_mut()
            .ok_or_else(|| GraphError::RelationshipNotFound(key.clone()))
    }

    /// Delete one relationship by its triple. Returns false if it did not exist.
    pub fn delete_relationship(&mut self, key: &RelKey) -> bool {
        match self.edge_for(key) {
            Some(edge_id) => {
                self.remove_edge(edge_id);
                debug!("Deleted relationship {}", key);
                true
            }
            None => false,
        }
    }

    /// Delete every relationship from `source` to `target`, whatever its type
    pub fn delete_relationships_between(
        &mut self,
        source: NodeId,
        target: NodeId,
    ) -> Vec<Relationship> {
        let edge_ids: Vec<EdgeId> = self
            .outgoing
            .get(&source)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| {
                        self.edges[id.index()]
                            .as_ref()
                            .map_or(false, |r| r.target == target)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut removed: Vec<Relationship> = edge_ids
            .into_iter()
            .filter_map(|edge_id| self.remove_edge(edge_id))
            .collect();
        removed.sort_by_key(|r| r.key());
        removed
    }

    fn remove_edge(&mut self, edge_id: EdgeId) -> Option<Relationship> {
        let rel = self.edges.get_mut(edge_id.index())?.take()?;
        self.free_edge_ids.push(edge_id.index());
        self.rel_index.remove(&rel.key());
        if let Some(adj) = self.outgoing.get_mut(&rel.source) {
            adj.retain(|&id| id != edge_id);
        }
        if let Some(adj) = self.incoming.get_mut(&rel.target) {
            adj.retain(|&id| id != edge_id);
        }
        Some(rel)
    }

    /// Relationships leaving `node`
    pub fn outgoing(&self, node: NodeId) -> Vec<&Relationship> {
        self.adjacent(self.outgoing.get(&node))
    }

    /// Relationships arriving at `node`
    pub fn incoming(&self, node: NodeId) -> Vec<&Relationship> {
        self.adjacent(self.incoming.get(&node))
    }

    fn adjacent(&self, edge_ids: Option<&Vec<EdgeId>>) -> Vec<&Relationship> {
        edge_ids
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.edges[id.index()].as_ref())
                    .collect()
            })
            .unwrap_or_default()
    }

    // ============================================================
    // Whole-graph access
    // ============================================================

    /// Nodes whose name equals `name`, ignoring case
    pub fn nodes_named(&self, name: &str) -> Vec<NodeId> {
        self.registry.lookup_name(name)
    }

    /// All nodes in ascending id order
    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All relationships ordered by identity triple
    pub fn all_relationships(&self) -> Vec<&Relationship> {
        let mut rels: Vec<&Relationship> = self.edges.iter().flatten().collect();
        rels.sort_by(|a, b| {
            (a.source, a.target, &a.rel_type).cmp(&(b.source, b.target, &b.rel_type))
        });
        rels
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.rel_index.len()
    }

    pub fn statistics(&self) -> GraphStatistics {
        let mut relationship_types = BTreeMap::new();
        for rel in self.edges.iter().flatten() {
            *relationship_types
                .entry(rel.rel_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        GraphStatistics {
            node_count: self.node_count(),
            relationship_count: self.relationship_count(),
            labels: self
                .labels
                .counts()
                .into_iter()
                .map(|(label, count)| (label.as_str().to_string(), count))
                .collect(),
            relationship_types,
        }
    }

    /// Copy the whole graph out
    pub fn export(&self) -> GraphExport {
        GraphExport {
            nodes: self.nodes.values().cloned().collect(),
            relationships: self.all_relationships().into_iter().cloned().collect(),
        }
    }

    /// Rebuild a store from an export, re-deriving every index
    pub fn from_export(export: GraphExport) -> GraphResult<Self> {
        let mut store = GraphStore::new();
        for node in export.nodes {
            store.insert_recovered_node(node)?;
        }
        for rel in export.relationships {
            store.insert_recovered_relationship(rel)?;
        }
        Ok(store)
    }

    /// Insert a recovered node, keeping its id and timestamps
    pub fn insert_recovered_node(&mut self, node: Node) -> GraphResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::NodeAlreadyExists(node.id));
        }
        let properties = node.properties.clone();
        Self::validate_node(&node.name, node.labels.iter().map(|l| l.as_str()), &properties)?;
        if !self.registry.reserve(node.id) {
            return Err(invalid(format!("node id {} is out of range", node.id)));
        }
        self.insert_node(node);
        Ok(())
    }

    /// Insert a recovered relationship. Both endpoints must already exist.
    pub fn insert_recovered_relationship(&mut self, rel: Relationship) -> GraphResult<()> {
        let key = rel.key();
        if self.has_relationship(&key) {
            return Err(invalid(format!("duplicate relationship {}", key)));
        }
        let created_at = rel.created_at;
        self.create_relationship(rel.source, rel.target, rel.rel_type.as_str(), rel.properties)?;
        self.relationship_mut(&key)?.created_at = created_at;
        Ok(())
    }

    /// Clear all data from the graph
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.free_edge_ids.clear();
        self.rel_index.clear();
        self.outgoing.clear();
        self.incoming.clear();
        self.labels.clear();
        self.registry.clear();
    }
}
