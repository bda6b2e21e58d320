//! Transaction batcher behind a writer session.
//!
//! `TxCell` owns the current store transaction and every [`CacheNode`]
//! touched since the last commit. The mutation engine only reads and writes
//! through it; nothing reaches the store until [`TxCell::commit`], which:
//!
//! 1. flushes mutated node properties,
//! 2. deletes nodes the engine dropped,
//! 3. reconciles pending parent assignments into `PARENT_TO_CHILD` edges and
//!    the metadata's root edge,
//! 4. sweeps every touched node that no longer reaches a root,
//! 5. commits the store transaction and clears the cache.
//!
//! If any step fails the store transaction is rolled back, so a batch is
//! either fully applied or not visible at all.

use indexmap::map::Entry as MapEntry;
use indexmap::{IndexMap, IndexSet};
use log::{debug, error};

use super::cache::CacheNode;
use super::define::*;
use super::gc::sweep_untethered;
use super::node::{read_dimension, read_kind, read_parent, read_root, NodeKind};
use super::rect::{Entry, RectNd};
use crate::errors::{RTreeError, RTreeResult};
use crate::store::{Direction, GraphStore, GraphTransaction, NodeId, Value};

pub(crate) struct TxCell {
    store: GraphStore,
    tx: Option<Box<dyn GraphTransaction>>,
    metadata: NodeId,
    nodes: IndexMap<NodeId, CacheNode>,
    /// Desired parent of every relinked node; `None` means no parent.
    parents: IndexMap<NodeId, Option<NodeId>>,
    deleted: IndexSet<NodeId>,
    touched: IndexSet<NodeId>,
    root: Option<Option<NodeId>>,
    root_changed: bool,
    entry_count: Option<i64>,
    count_changed: bool,
    dimension: Option<Option<usize>>,
    dimension_changed: bool,
    changes: usize,
    limit: usize,
    commits: u64,
}

impl TxCell {
    pub(crate) fn new(store: GraphStore, metadata: NodeId, limit: usize) -> Self {
        TxCell {
            store,
            tx: None,
            metadata,
            nodes: IndexMap::new(),
            parents: IndexMap::new(),
            deleted: IndexSet::new(),
            touched: IndexSet::new(),
            root: None,
            root_changed: false,
            entry_count: None,
            count_changed: false,
            dimension: None,
            dimension_changed: false,
            changes: 0,
            limit: limit.max(1),
            commits: 0,
        }
    }

    fn ensure_tx(&mut self) -> RTreeResult<()> {
        if self.tx.is_none() {
            self.tx = Some(self.store.begin()?);
        }
        Ok(())
    }

    fn cached(&mut self, id: NodeId) -> RTreeResult<(&dyn GraphTransaction, &mut CacheNode)> {
        if self.deleted.contains(&id) {
            return Err(RTreeError::InvariantViolation(format!(
                "node {} was already deleted in this batch",
                id
            )));
        }
        self.ensure_tx()?;
        let tx = self.tx.as_deref().ok_or(RTreeError::SessionClosed)?;
        let node = match self.nodes.entry(id) {
            MapEntry::Occupied(slot) => slot.into_mut(),
            MapEntry::Vacant(slot) => {
                let kind = read_kind(tx, id)?;
                self.touched.insert(id);
                slot.insert(CacheNode::load(tx, id, kind)?)
            }
        };
        Ok((tx, node))
    }

    // ------------------------------------------------------------------
    // Node access
    // ------------------------------------------------------------------

    pub(crate) fn kind(&mut self, id: NodeId) -> RTreeResult<NodeKind> {
        Ok(self.cached(id)?.1.kind())
    }

    pub(crate) fn mbr(&mut self, id: NodeId) -> RTreeResult<Option<RectNd>> {
        let (tx, node) = self.cached(id)?;
        Ok(node.mbr(tx)?.cloned())
    }

    pub(crate) fn set_mbr(&mut self, id: NodeId, mbr: Option<RectNd>) -> RTreeResult<()> {
        self.cached(id)?.1.set_mbr(mbr);
        Ok(())
    }

    pub(crate) fn children(&mut self, id: NodeId) -> RTreeResult<Vec<NodeId>> {
        let (tx, node) = self.cached(id)?;
        Ok(node.children(tx)?.clone())
    }

    pub(crate) fn children_mut(&mut self, id: NodeId) -> RTreeResult<&mut Vec<NodeId>> {
        let (tx, node) = self.cached(id)?;
        node.children_mut(tx)
    }

    pub(crate) fn entries(&mut self, id: NodeId) -> RTreeResult<Vec<Entry>> {
        let (tx, node) = self.cached(id)?;
        Ok(node.entries(tx)?.clone())
    }

    pub(crate) fn entries_mut(&mut self, id: NodeId) -> RTreeResult<&mut Vec<Entry>> {
        let (tx, node) = self.cached(id)?;
        node.entries_mut(tx)
    }

    pub(crate) fn len(&mut self, id: NodeId) -> RTreeResult<usize> {
        let (tx, node) = self.cached(id)?;
        node.len(tx)
    }

    /// Creates an empty node in the store and caches it.
    pub(crate) fn create_node(&mut self, kind: NodeKind) -> RTreeResult<NodeId> {
        self.ensure_tx()?;
        let tx = self.tx.as_deref_mut().ok_or(RTreeError::SessionClosed)?;
        let id = tx.create_node(kind.label())?;
        self.nodes.insert(id, CacheNode::created(id, kind));
        self.touched.insert(id);
        Ok(id)
    }

    /// Marks a node for deletion at commit. Its edges go with it.
    pub(crate) fn delete_node(&mut self, id: NodeId) {
        self.nodes.shift_remove(&id);
        self.parents.shift_remove(&id);
        self.deleted.insert(id);
    }

    pub(crate) fn is_deleted(&self, id: NodeId) -> bool {
        self.deleted.contains(&id)
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Current parent of a node: the pending assignment if there is one,
    /// otherwise the parent edge in the store.
    pub(crate) fn parent_of(&mut self, id: NodeId) -> RTreeResult<Option<NodeId>> {
        if let Some(parent) = self.parents.get(&id) {
            return Ok(*parent);
        }
        self.ensure_tx()?;
        let tx = self.tx.as_deref().ok_or(RTreeError::SessionClosed)?;
        read_parent(tx, id)
    }

    pub(crate) fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) {
        self.parents.insert(child, parent);
        self.touched.insert(child);
    }

    pub(crate) fn root(&mut self) -> RTreeResult<Option<NodeId>> {
        if let Some(root) = self.root {
            return Ok(root);
        }
        self.ensure_tx()?;
        let tx = self.tx.as_deref().ok_or(RTreeError::SessionClosed)?;
        let root = read_root(tx, self.metadata)?;
        self.root = Some(root);
        Ok(root)
    }

    pub(crate) fn set_root(&mut self, root: Option<NodeId>) {
        if let Some(id) = root {
            self.set_parent(id, None);
        }
        self.root = Some(root);
        self.root_changed = true;
    }

    pub(crate) fn entry_count(&mut self) -> RTreeResult<i64> {
        if let Some(count) = self.entry_count {
            return Ok(count);
        }
        self.ensure_tx()?;
        let tx = self.tx.as_deref().ok_or(RTreeError::SessionClosed)?;
        let count = tx
            .get_property(self.metadata, PROP_ENTRY_COUNT)?
            .and_then(|v| v.as_int())
            .unwrap_or(0);
        self.entry_count = Some(count);
        Ok(count)
    }

    pub(crate) fn adjust_entry_count(&mut self, delta: i64) -> RTreeResult<()> {
        let count = self.entry_count()?;
        let adjusted = count + delta;
        if adjusted < 0 {
            return Err(RTreeError::InvariantViolation(format!(
                "entry count {} cannot drop by {}",
                count, -delta
            )));
        }
        self.entry_count = Some(adjusted);
        self.count_changed = true;
        Ok(())
    }

    /// Dimension every rect of the index must have, `None` until the first
    /// insert fixes it.
    pub(crate) fn dimension(&mut self) -> RTreeResult<Option<usize>> {
        if let Some(dimension) = self.dimension {
            return Ok(dimension);
        }
        self.ensure_tx()?;
        let tx = self.tx.as_deref().ok_or(RTreeError::SessionClosed)?;
        let dimension = read_dimension(tx, self.metadata)?;
        self.dimension = Some(dimension);
        Ok(dimension)
    }

    pub(crate) fn set_dimension(&mut self, dimension: usize) -> RTreeResult<()> {
        self.ensure_tx()?;
        self.dimension = Some(Some(dimension));
        self.dimension_changed = true;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Batching
    // ------------------------------------------------------------------

    /// Counts `n` caller-visible edits.
    pub(crate) fn add_change(&mut self, n: usize) {
        self.changes += n;
    }

    /// Commits once the batch has reached its size threshold.
    pub(crate) fn limit_commit(&mut self) -> RTreeResult<bool> {
        if self.changes >= self.limit {
            self.commit()?;
            return Ok(true);
        }
        Ok(false)
    }

    pub(crate) fn pending_changes(&self) -> usize {
        self.changes
    }

    pub(crate) fn commit_count(&self) -> u64 {
        self.commits
    }

    /// Writes the batch back, sweeps orphans and commits the transaction.
    pub(crate) fn commit(&mut self) -> RTreeResult<()> {
        let Some(mut tx) = self.tx.take() else {
            self.clear();
            return Ok(());
        };

        let outcome = match self.write_back(tx.as_mut()) {
            Ok(reclaimed) => tx.commit().map(|_| reclaimed).map_err(RTreeError::from),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    error!("Rollback after failed write-back also failed: {}", rollback_err);
                }
                Err(err)
            }
        };
        let touched = self.touched.len();
        let changes = self.changes;
        self.clear();

        match outcome {
            Ok(reclaimed) => {
                self.commits += 1;
                debug!(
                    "Committed batch of {} changes over {} nodes, reclaimed {} orphans",
                    changes, touched, reclaimed
                );
                Ok(())
            }
            Err(err) => {
                error!("Commit of batch with {} changes failed: {}", changes, err);
                Err(err)
            }
        }
    }

    /// Abandons the batch; none of its edits become visible.
    pub(crate) fn rollback(&mut self) -> RTreeResult<()> {
        let tx = self.tx.take();
        let changes = self.changes;
        self.clear();
        if let Some(tx) = tx {
            tx.rollback()?;
            debug!("Rolled back batch of {} changes", changes);
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.parents.clear();
        self.deleted.clear();
        self.touched.clear();
        self.root = None;
        self.root_changed = false;
        self.entry_count = None;
        self.count_changed = false;
        self.dimension = None;
        self.dimension_changed = false;
        self.changes = 0;
    }

    fn write_back(&self, tx: &mut dyn GraphTransaction) -> RTreeResult<usize> {
        for node in self.nodes.values() {
            node.flush(tx)?;
        }

        for &id in &self.deleted {
            if tx.node_exists(id)? {
                tx.delete_node(id)?;
            }
        }

        for (&child, &parent) in &self.parents {
            if self.deleted.contains(&child) || !tx.node_exists(child)? {
                continue;
            }
            let current = tx.neighbours(child, Direction::Incoming, EDGE_PARENT_TO_CHILD)?;
            for &stale in current.iter().filter(|&&p| Some(p) != parent) {
                tx.delete_edge(stale, child, EDGE_PARENT_TO_CHILD)?;
            }
            if let Some(parent) = parent {
                if !current.contains(&parent) {
                    tx.create_edge(parent, child, EDGE_PARENT_TO_CHILD)?;
                }
            }
        }

        if self.root_changed {
            let root = self.root.flatten();
            let current = tx.neighbours(self.metadata, Direction::Outgoing, EDGE_METADATA_TO_ROOT)?;
            for &stale in current.iter().filter(|&&r| Some(r) != root) {
                tx.delete_edge(self.metadata, stale, EDGE_METADATA_TO_ROOT)?;
            }
            if let Some(root) = root {
                if !current.contains(&root) {
                    tx.create_edge(self.metadata, root, EDGE_METADATA_TO_ROOT)?;
                }
            }
        }

        if self.count_changed {
            if let Some(count) = self.entry_count {
                tx.set_property(self.metadata, PROP_ENTRY_COUNT, Value::Int(count))?;
            }
        }

        if self.dimension_changed {
            if let Some(Some(dimension)) = self.dimension {
                tx.set_property(self.metadata, PROP_DIMENSION, Value::from(dimension))?;
            }
        }

        let candidates: Vec<NodeId> = self
            .touched
            .iter()
            .filter(|id| !self.deleted.contains(*id))
            .copied()
            .collect();
        sweep_untethered(tx, &candidates)
    }
}

impl Drop for TxCell {
    fn drop(&mut self) {
        if self.tx.is_some() && self.changes > 0 {
            debug!("Discarding uncommitted batch of {} changes", self.changes);
        }
    }
}
