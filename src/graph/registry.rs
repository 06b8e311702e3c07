//! Identifier registry
//!
//! Allocates node ids and maps names to the ids carrying them. Names are not
//! unique, so a lookup may return any number of ids.

use super::types::NodeId;
use std::collections::{BTreeSet, HashMap};

/// Case-insensitive key under which a name is indexed.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug)]
pub struct IdRegistry {
    /// Next id handed out by `allocate`; always greater than every known id
    next_id: u64,

    /// Lowercased name -> nodes with that name
    by_name: HashMap<String, BTreeSet<NodeId>>,
}

impl IdRegistry {
    pub fn new() -> Self {
        IdRegistry {
            next_id: 1,
            by_name: HashMap::new(),
        }
    }

    /// Hand out a fresh id. Ids are never reused within a registry's lifetime.
    ///
    /// `u64::MAX` is never handed out; `None` means the id space is spent.
    pub fn allocate(&mut self) -> Option<NodeId> {
        if self.next_id == u64::MAX {
            return None;
        }
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        Some(id)
    }

    /// Record an externally chosen id so later allocations skip past it.
    /// Returns false, leaving the registry untouched, for `u64::MAX`.
    pub fn reserve(&mut self, id: NodeId) -> bool {
        match id.as_u64().checked_add(1) {
            Some(next) => {
                if next > self.next_id {
                    self.next_id = next;
                }
                true
            }
            None => false,
        }
    }

    pub fn register(&mut self, id: NodeId, name: &str) {
        self.by_name.entry(name_key(name)).or_default().insert(id);
    }

    pub fn unregister(&mut self, id: NodeId, name: &str) {
        let key = name_key(name);
        if let Some(ids) = self.by_name.get_mut(&key) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_name.remove(&key);
            }
        }
    }

    pub fn rename(&mut self, id: NodeId, old_name: &str, new_name: &str) {
        self.unregister(id, old_name);
        self.register(id, new_name);
    }

    /// All nodes whose name equals `name`, ignoring case, in ascending id order.
    pub fn lookup_name(&self, name: &str) -> Vec<NodeId> {
        self.by_name
            .get(&name_key(name))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn peek_next(&self) -> NodeId {
        NodeId::new(self.next_id)
    }

    pub fn clear(&mut self) {
        self.next_id = 1;
        self.by_name.clear();
    }
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_monotonic() {
        let mut registry = IdRegistry::new();
        assert_eq!(registry.allocate(), Some(NodeId::new(1)));
        assert_eq!(registry.allocate(), Some(NodeId::new(2)));

        assert!(registry.reserve(NodeId::new(10)));
        assert_eq!(registry.allocate(), Some(NodeId::new(11)));

        assert!(registry.reserve(NodeId::new(5)));
        assert_eq!(registry.allocate(), Some(NodeId::new(12)));
    }

    #[test]
    fn test_reserve_at_the_top_of_the_id_space() {
        let mut registry = IdRegistry::new();
        assert!(!registry.reserve(NodeId::new(u64::MAX)));
        assert_eq!(registry.peek_next(), NodeId::new(1));

        assert!(registry.reserve(NodeId::new(u64::MAX - 1)));
        assert_eq!(registry.allocate(), None);
        assert_eq!(registry.peek_next(), NodeId::new(u64::MAX));
    }

    #[test]
    fn test_name_lookup_is_case_insensitive() {
        let mut registry = IdRegistry::new();
        registry.register(NodeId::new(3), "Aspirin");
        registry.register(NodeId::new(1), "aspirin ");
        registry.register(NodeId::new(2), "Ibuprofen");

        assert_eq!(registry.lookup_name("ASPIRIN"), vec![NodeId::new(1), NodeId::new(3)]);
        assert!(registry.lookup_name("paracetamol").is_empty());
    }

    #[test]
    fn test_rename_and_unregister() {
        let mut registry = IdRegistry::new();
        registry.register(NodeId::new(1), "Alice");
        registry.rename(NodeId::new(1), "Alice", "Alicia");

        assert!(registry.lookup_name("alice").is_empty());
        assert_eq!(registry.lookup_name("alicia"), vec![NodeId::new(1)]);

        registry.unregister(NodeId::new(1), "Alicia");
        assert!(registry.lookup_name("alicia").is_empty());
        assert!(registry.by_name.is_empty());
    }
}
