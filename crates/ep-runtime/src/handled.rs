//! Identity-keyed node sets that do not keep nodes alive.

use std::collections::HashMap;

use crate::dom::DomNode;

/// Nodes already acted on.
///
/// Entries hold weak handles, so a node dropped by the page does not linger
/// and a recycled identity key is never mistaken for the old node.
#[derive(Debug)]
pub struct HandledSet<N: DomNode> {
    entries: HashMap<usize, N::Weak>,
}

impl<N: DomNode> Default for HandledSet<N> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<N: DomNode> HandledSet<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the node was already present.
    pub fn insert(&mut self, node: &N) -> bool {
        if self.contains(node) {
            return false;
        }
        self.entries.insert(node.node_key(), node.downgrade());
        true
    }

    pub fn contains(&self, node: &N) -> bool {
        self.entries
            .get(&node.node_key())
            .and_then(N::upgrade)
            .is_some_and(|alive| alive.same_node(node))
    }

    pub fn remove(&mut self, node: &N) -> bool {
        if !self.contains(node) {
            return false;
        }
        self.entries.remove(&node.node_key()).is_some()
    }

    /// Live members.
    pub fn nodes(&self) -> Vec<N> {
        self.entries.values().filter_map(N::upgrade).collect()
    }

    /// Drop entries whose node is gone.
    pub fn prune(&mut self) {
        self.entries.retain(|_, weak| N::upgrade(weak).is_some());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::MemoryDocument;

    #[test]
    fn test_insert_is_idempotent() {
        let doc = MemoryDocument::new();
        let node = doc.element("div").build();
        let mut set = HandledSet::new();

        assert!(set.insert(&node));
        assert!(!set.insert(&node.clone()));
        assert!(set.contains(&node));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_does_not_keep_nodes_alive() {
        let doc = MemoryDocument::new();
        let mut set = HandledSet::new();
        {
            let node = doc.element("div").build();
            set.insert(&node);
            assert_eq!(set.nodes().len(), 1);
        }
        assert!(set.nodes().is_empty());

        set.prune();
        assert!(set.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let doc = MemoryDocument::new();
        let a = doc.element("div").build();
        let b = doc.element("div").build();
        let mut set = HandledSet::new();
        set.insert(&a);
        set.insert(&b);

        assert!(set.remove(&a));
        assert!(!set.contains(&a));
        assert!(set.contains(&b));

        set.clear();
        assert!(!set.contains(&b));
    }
}
