use log::debug;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{InMemoryStoreConfig, InMemoryTransaction};
use crate::errors::{StoreError, StoreResult};
use crate::store::{GraphStoreProvider, GraphTransaction, NodeId, Value};

/// Committed state of one graph node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct NodeRecord {
    pub(crate) label: String,
    pub(crate) properties: BTreeMap<String, Value>,
    pub(crate) outgoing: Vec<(String, NodeId)>,
    pub(crate) incoming: Vec<(String, NodeId)>,
}

impl NodeRecord {
    pub(crate) fn new(label: &str) -> Self {
        NodeRecord {
            label: label.to_string(),
            ..Default::default()
        }
    }
}

/// Everything a snapshot file holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct GraphState {
    pub(crate) nodes: HashMap<NodeId, NodeRecord>,
    pub(crate) labels: HashMap<String, BTreeSet<NodeId>>,
    pub(crate) next_id: NodeId,
}

impl GraphState {
    /// Applies a transaction overlay: `Some` replaces a record, `None` deletes it.
    fn apply(&mut self, overlay: HashMap<NodeId, Option<NodeRecord>>) {
        for (id, change) in overlay {
            if let Some(old) = self.nodes.remove(&id) {
                if let Some(ids) = self.labels.get_mut(&old.label) {
                    ids.remove(&id);
                }
            }
            if let Some(record) = change {
                self.labels
                    .entry(record.label.clone())
                    .or_default()
                    .insert(id);
                self.nodes.insert(id, record);
            }
        }
    }
}

/// Transactional in-memory graph store.
///
/// # Purpose
/// `InMemoryGraphStore` implements the full graph store contract the index
/// consumes. It backs unit and integration tests, and with a snapshot file
/// configured it also persists the index across process restarts.
///
/// # Characteristics
/// - **Atomic**: a transaction buffers its writes in a private overlay and
///   applies them under one write lock at commit
/// - **Isolated reads**: readers only ever see committed state
/// - **Optional persistence**: every commit rewrites a `bincode` snapshot
///
/// # Usage
/// ```text
/// let store = InMemoryGraphStore::new();
/// let mut tx = store.begin()?;
/// let id = tx.create_node("Place")?;
/// tx.set_property(id, "name", Value::from("harbour"))?;
/// tx.commit()?;
/// ```
#[derive(Clone)]
pub struct InMemoryGraphStore {
    inner: Arc<InMemoryGraphStoreInner>,
}

impl InMemoryGraphStore {
    /// Creates an empty store that is never written to disk.
    pub fn new() -> InMemoryGraphStore {
        InMemoryGraphStore {
            inner: Arc::new(InMemoryGraphStoreInner::new(
                GraphState::default(),
                InMemoryStoreConfig::new(),
            )),
        }
    }

    /// Opens a store, loading the snapshot file named by `config` if it exists.
    pub fn open(config: InMemoryStoreConfig) -> StoreResult<InMemoryGraphStore> {
        let state = match config.file_path() {
            Some(path) if path.exists() => read_snapshot(path)?,
            _ => GraphState::default(),
        };
        debug!(
            "Opened in-memory graph store with {} nodes (snapshot: {:?})",
            state.nodes.len(),
            config.file_path()
        );
        Ok(InMemoryGraphStore {
            inner: Arc::new(InMemoryGraphStoreInner::new(state, config)),
        })
    }

    /// Number of committed nodes.
    pub fn node_count(&self) -> usize {
        self.inner.read_state().nodes.len()
    }

    /// Number of successful commits since the store was opened.
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStoreProvider for InMemoryGraphStore {
    fn begin(&self) -> StoreResult<Box<dyn GraphTransaction>> {
        Ok(Box::new(InMemoryTransaction::new(self.inner.clone())))
    }
}

pub(crate) struct InMemoryGraphStoreInner {
    state: RwLock<GraphState>,
    next_id: AtomicU64,
    commits: AtomicU64,
    config: InMemoryStoreConfig,
}

impl InMemoryGraphStoreInner {
    fn new(state: GraphState, config: InMemoryStoreConfig) -> Self {
        let next_id = state.next_id;
        InMemoryGraphStoreInner {
            state: RwLock::new(state),
            next_id: AtomicU64::new(next_id),
            commits: AtomicU64::new(0),
            config,
        }
    }

    pub(crate) fn allocate_id(&self) -> NodeId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, GraphState> {
        self.state.read()
    }

    /// Makes `overlay` the committed state. With a snapshot file the new
    /// state is built aside and only installed once the file is written, so
    /// a failed write leaves readers on the previous state.
    pub(crate) fn apply(&self, overlay: HashMap<NodeId, Option<NodeRecord>>) -> StoreResult<()> {
        let mut state = self.state.write();
        let changed = overlay.len();
        let next_id = self.next_id.load(Ordering::SeqCst);

        match self.config.file_path() {
            Some(path) => {
                let mut next = state.clone();
                next.apply(overlay);
                next.next_id = next_id;
                write_snapshot(path, &next)?;
                *state = next;
            }
            None => {
                state.apply(overlay);
                state.next_id = next_id;
            }
        }
        self.commits.fetch_add(1, Ordering::Relaxed);
        debug!("Committed {} node changes", changed);
        Ok(())
    }
}

fn read_snapshot(path: &Path) -> StoreResult<GraphState> {
    let bytes = fs::read(path)?;
    let (state, _): (GraphState, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::legacy())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(state)
}

fn write_snapshot(path: &Path, state: &GraphState) -> StoreResult<()> {
    let bytes = bincode::serde::encode_to_vec(state, bincode::config::legacy())
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
