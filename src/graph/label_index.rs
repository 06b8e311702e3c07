//! Inverted index from label to the nodes carrying it

use super::types::{Label, NodeId};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct LabelIndex {
    index: HashMap<Label, BTreeSet<NodeId>>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: &Label, node: NodeId) {
        self.index.entry(label.clone()).or_default().insert(node);
    }

    /// Remove `node` from `label`; the label disappears once no node carries it.
    pub fn remove(&mut self, label: &Label, node: NodeId) {
        if let Some(nodes) = self.index.get_mut(label) {
            nodes.remove(&node);
            if nodes.is_empty() {
                self.index.remove(label);
            }
        }
    }

    /// Nodes carrying `label`, in ascending id order.
    pub fn nodes_with(&self, label: &Label) -> Vec<NodeId> {
        self.index
            .get(label)
            .map(|nodes| nodes.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, label: &Label) -> bool {
        self.index.contains_key(label)
    }

    /// Node count per label, sorted by label
    pub fn counts(&self) -> BTreeMap<Label, usize> {
        self.index
            .iter()
            .map(|(label, nodes)| (label.clone(), nodes.len()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.index.clear();
    }
}
