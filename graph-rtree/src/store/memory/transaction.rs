use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::store::{InMemoryGraphStoreInner, NodeRecord};
use crate::errors::{StoreError, StoreResult};
use crate::store::{Direction, GraphTransaction, NodeId, Value};

/// A transaction over an [`InMemoryGraphStore`](super::InMemoryGraphStore).
///
/// Records are copied into the overlay on first write; reads consult the
/// overlay first and fall back to committed state. `None` in the overlay
/// marks a deleted node.
pub struct InMemoryTransaction {
    store: Arc<InMemoryGraphStoreInner>,
    overlay: HashMap<NodeId, Option<NodeRecord>>,
}

impl InMemoryTransaction {
    pub(crate) fn new(store: Arc<InMemoryGraphStoreInner>) -> Self {
        InMemoryTransaction {
            store,
            overlay: HashMap::new(),
        }
    }

    fn read<R>(&self, id: NodeId, f: impl FnOnce(&NodeRecord) -> R) -> StoreResult<R> {
        match self.overlay.get(&id) {
            Some(Some(record)) => Ok(f(record)),
            Some(None) => Err(StoreError::NodeNotFound(id)),
            None => {
                let state = self.store.read_state();
                state
                    .nodes
                    .get(&id)
                    .map(f)
                    .ok_or(StoreError::NodeNotFound(id))
            }
        }
    }

    fn record_mut(&mut self, id: NodeId) -> StoreResult<&mut NodeRecord> {
        if !self.overlay.contains_key(&id) {
            let record = self
                .store
                .read_state()
                .nodes
                .get(&id)
                .cloned()
                .ok_or(StoreError::NodeNotFound(id))?;
            self.overlay.insert(id, Some(record));
        }
        match self.overlay.get_mut(&id) {
            Some(Some(record)) => Ok(record),
            _ => Err(StoreError::NodeNotFound(id)),
        }
    }
}

impl GraphTransaction for InMemoryTransaction {
    fn create_node(&mut self, label: &str) -> StoreResult<NodeId> {
        let id = self.store.allocate_id();
        self.overlay.insert(id, Some(NodeRecord::new(label)));
        Ok(id)
    }

    fn delete_node(&mut self, id: NodeId) -> StoreResult<()> {
        let (outgoing, incoming) =
            self.read(id, |record| (record.outgoing.clone(), record.incoming.clone()))?;

        for (edge_type, other) in outgoing {
            if other != id && self.node_exists(other)? {
                self.record_mut(other)?
                    .incoming
                    .retain(|(t, n)| !(*t == edge_type && *n == id));
            }
        }
        for (edge_type, other) in incoming {
            if other != id && self.node_exists(other)? {
                self.record_mut(other)?
                    .outgoing
                    .retain(|(t, n)| !(*t == edge_type && *n == id));
            }
        }
        self.overlay.insert(id, None);
        Ok(())
    }

    fn node_exists(&self, id: NodeId) -> StoreResult<bool> {
        Ok(match self.overlay.get(&id) {
            Some(entry) => entry.is_some(),
            None => self.store.read_state().nodes.contains_key(&id),
        })
    }

    fn label(&self, id: NodeId) -> StoreResult<String> {
        self.read(id, |record| record.label.clone())
    }

    fn nodes_with_label(&self, label: &str) -> StoreResult<Vec<NodeId>> {
        let mut ids: BTreeSet<NodeId> = self
            .store
            .read_state()
            .labels
            .get(label)
            .cloned()
            .unwrap_or_default();

        for (id, entry) in &self.overlay {
            match entry {
                Some(record) if record.label == label => {
                    ids.insert(*id);
                }
                _ => {
                    ids.remove(id);
                }
            }
        }
        Ok(ids.into_iter().collect())
    }

    fn get_property(&self, id: NodeId, key: &str) -> StoreResult<Option<Value>> {
        self.read(id, |record| record.properties.get(key).cloned())
    }

    fn set_property(&mut self, id: NodeId, key: &str, value: Value) -> StoreResult<()> {
        self.record_mut(id)?
            .properties
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove_property(&mut self, id: NodeId, key: &str) -> StoreResult<()> {
        self.record_mut(id)?.properties.remove(key);
        Ok(())
    }

    fn create_edge(&mut self, from: NodeId, to: NodeId, edge_type: &str) -> StoreResult<()> {
        if !self.node_exists(to)? {
            return Err(StoreError::NodeNotFound(to));
        }
        let exists = self.read(from, |record| {
            record
                .outgoing
                .iter()
                .any(|(t, n)| t == edge_type && *n == to)
        })?;
        if exists {
            return Ok(());
        }

        self.record_mut(from)?
            .outgoing
            .push((edge_type.to_string(), to));
        self.record_mut(to)?
            .incoming
            .push((edge_type.to_string(), from));
        Ok(())
    }

    fn delete_edge(&mut self, from: NodeId, to: NodeId, edge_type: &str) -> StoreResult<bool> {
        let exists = self.read(from, |record| {
            record
                .outgoing
                .iter()
                .any(|(t, n)| t == edge_type && *n == to)
        })?;
        if !exists {
            return Ok(false);
        }

        self.record_mut(from)?
            .outgoing
            .retain(|(t, n)| !(t == edge_type && *n == to));
        if self.node_exists(to)? {
            self.record_mut(to)?
                .incoming
                .retain(|(t, n)| !(t == edge_type && *n == from));
        }
        Ok(true)
    }

    fn neighbours(
        &self,
        id: NodeId,
        direction: Direction,
        edge_type: &str,
    ) -> StoreResult<Vec<NodeId>> {
        self.read(id, |record| {
            let edges = match direction {
                Direction::Outgoing => &record.outgoing,
                Direction::Incoming => &record.incoming,
            };
            edges
                .iter()
                .filter(|(t, _)| t == edge_type)
                .map(|(_, n)| *n)
                .collect()
        })
    }

    fn find_node(&self, label: &str, key: &str, value: &Value) -> StoreResult<Option<NodeId>> {
        for id in self.nodes_with_label(label)? {
            if self.get_property(id, key)?.as_ref() == Some(value) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTransaction { store, overlay } = *self;
        store.apply(overlay)
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
