//! Write-back cache entry for one tree node.

use super::define::*;
use super::node::{read_children, read_entries, read_mbr, read_size, NodeKind};
use super::rect::{Entry, RectNd};
use crate::errors::RTreeResult;
use crate::store::{GraphTransaction, NodeId, Value};

/// Cached view of one persisted tree node.
///
/// Bounds, children and entries are read from the store the first time they
/// are needed; afterwards reads and writes only touch the cache until
/// [`CacheNode::flush`] writes the mutated fields back. Child links are not
/// written here: relinking is tracked by the owning `TxCell` as pending
/// parent assignments.
#[derive(Debug)]
pub(crate) struct CacheNode {
    id: NodeId,
    kind: NodeKind,
    /// Number of entry slots present in the store, so stale ones can be removed.
    stored_size: usize,
    mbr: Option<Option<RectNd>>,
    children: Option<Vec<NodeId>>,
    entries: Option<Vec<Entry>>,
    mbr_changed: bool,
    items_changed: bool,
}

impl CacheNode {
    /// Wraps an existing node. Nothing but the kind is read yet.
    pub(crate) fn load(tx: &dyn GraphTransaction, id: NodeId, kind: NodeKind) -> RTreeResult<Self> {
        Ok(CacheNode {
            id,
            kind,
            stored_size: read_size(tx, id)?,
            mbr: None,
            children: None,
            entries: None,
            mbr_changed: false,
            items_changed: false,
        })
    }

    /// Wraps a node created in the current transaction.
    pub(crate) fn created(id: NodeId, kind: NodeKind) -> Self {
        let (children, entries) = match kind {
            NodeKind::Branch => (Some(Vec::new()), None),
            NodeKind::Leaf => (None, Some(Vec::new())),
        };
        CacheNode {
            id,
            kind,
            stored_size: 0,
            mbr: Some(None),
            children,
            entries,
            mbr_changed: true,
            items_changed: true,
        }
    }

    pub(crate) fn kind(&self) -> NodeKind {
        self.kind
    }

    pub(crate) fn mbr(&mut self, tx: &dyn GraphTransaction) -> RTreeResult<Option<&RectNd>> {
        if self.mbr.is_none() {
            self.mbr = Some(read_mbr(tx, self.id)?);
        }
        Ok(self.mbr.as_ref().and_then(|m| m.as_ref()))
    }

    pub(crate) fn set_mbr(&mut self, mbr: Option<RectNd>) {
        if self.mbr.as_ref() != Some(&mbr) {
            self.mbr = Some(mbr);
            self.mbr_changed = true;
        }
    }

    pub(crate) fn children(&mut self, tx: &dyn GraphTransaction) -> RTreeResult<&Vec<NodeId>> {
        if self.children.is_none() {
            self.children = Some(read_children(tx, self.id)?);
        }
        Ok(self.children.get_or_insert_with(Vec::new))
    }

    pub(crate) fn children_mut(
        &mut self,
        tx: &dyn GraphTransaction,
    ) -> RTreeResult<&mut Vec<NodeId>> {
        self.children(tx)?;
        self.items_changed = true;
        Ok(self.children.get_or_insert_with(Vec::new))
    }

    pub(crate) fn entries(&mut self, tx: &dyn GraphTransaction) -> RTreeResult<&Vec<Entry>> {
        if self.entries.is_none() {
            self.entries = Some(read_entries(tx, self.id, self.stored_size)?);
        }
        Ok(self.entries.get_or_insert_with(Vec::new))
    }

    pub(crate) fn entries_mut(&mut self, tx: &dyn GraphTransaction) -> RTreeResult<&mut Vec<Entry>> {
        self.entries(tx)?;
        self.items_changed = true;
        Ok(self.entries.get_or_insert_with(Vec::new))
    }

    /// Number of children or entries.
    pub(crate) fn len(&mut self, tx: &dyn GraphTransaction) -> RTreeResult<usize> {
        match self.kind {
            NodeKind::Branch => Ok(self.children(tx)?.len()),
            NodeKind::Leaf => match &self.entries {
                Some(entries) => Ok(entries.len()),
                None => Ok(self.stored_size),
            },
        }
    }

    /// Writes mutated fields back to the store.
    pub(crate) fn flush(&self, tx: &mut dyn GraphTransaction) -> RTreeResult<()> {
        if self.mbr_changed {
            match self.mbr.as_ref().and_then(|m| m.as_ref()) {
                Some(mbr) => {
                    tx.set_property(self.id, PROP_MBR_MIN, Value::from(mbr.min()))?;
                    tx.set_property(self.id, PROP_MBR_MAX, Value::from(mbr.max()))?;
                }
                None => {
                    tx.remove_property(self.id, PROP_MBR_MIN)?;
                    tx.remove_property(self.id, PROP_MBR_MAX)?;
                }
            }
        }

        if !self.items_changed {
            return Ok(());
        }
        match self.kind {
            NodeKind::Branch => {
                let size = self.children.as_ref().map_or(0, Vec::len);
                tx.set_property(self.id, PROP_SIZE, Value::from(size))?;
            }
            NodeKind::Leaf => {
                let entries = self.entries.as_deref().unwrap_or_default();
                tx.set_property(self.id, PROP_SIZE, Value::from(entries.len()))?;
                for (slot, entry) in entries.iter().enumerate() {
                    tx.set_property(self.id, &entry_min_key(slot), Value::from(entry.rect.min()))?;
                    tx.set_property(self.id, &entry_max_key(slot), Value::from(entry.rect.max()))?;
                    tx.set_property(
                        self.id,
                        &entry_data_key(slot),
                        Value::Str(entry.data.clone()),
                    )?;
                }
                for slot in entries.len()..self.stored_size {
                    tx.remove_property(self.id, &entry_min_key(slot))?;
                    tx.remove_property(self.id, &entry_max_key(slot))?;
                    tx.remove_property(self.id, &entry_data_key(slot))?;
                }
            }
        }
        Ok(())
    }
}
