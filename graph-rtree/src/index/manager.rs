use log::{debug, info};
use parking_lot::Mutex;
use std::ops::ControlFlow;
use std::sync::Arc;

use super::handle::IndexHandle;
use super::session::WriterSession;
use crate::common::LockRegistry;
use crate::config::{validate_fanout, RTreeConfig};
use crate::errors::{RTreeError, RTreeResult};
use crate::rtree::define::*;
use crate::rtree::gc::{collect_garbage, delete_subtree};
use crate::rtree::inspect::{check_integrity, collect_stats, IntegrityReport, TreeStats};
use crate::rtree::nearest::{nearest, point_distance, DistanceResult};
use crate::rtree::node::{read_dimension, read_mbr, read_root};
use crate::rtree::rect::{require_dimension, Entry, PointNd, RectNd};
use crate::rtree::search::{intersects, traverse, within};
use crate::store::{GraphStore, GraphTransaction, NodeId, Value};

/// Entry point for creating, opening, writing and querying R-tree indexes
/// stored in a graph store.
///
/// # Purpose
/// Each index is a tree of graph nodes anchored at a metadata node that
/// carries its unique name and fanout. The manager looks indexes up by
/// name, hands out [`WriterSession`]s for mutation and runs read queries
/// against the last committed state of a tree.
///
/// # Characteristics
/// - **Per-index locking**: every index name has its own reader/writer
///   lock; queries share it, a writer session holds it exclusively for
///   its whole lifetime
/// - **Cheap to clone**: clones share the store, the lock registry and the
///   configuration
/// - **Synchronous**: no background threads, every call runs on the
///   caller's thread
///
/// # Usage
/// ```
/// use graph_rtree::{Entry, GraphStore, InMemoryGraphStore, PointNd, RTreeConfig, RTreeIndexManager, RectNd};
/// use std::ops::ControlFlow;
///
/// let manager = RTreeIndexManager::new(
///     GraphStore::new(InMemoryGraphStore::new()),
///     RTreeConfig::default(),
/// ).unwrap();
/// let index = manager.create_index("parcels", 2, 6).unwrap();
///
/// let mut session = manager.open_session(&index, None).unwrap();
/// for i in 0..20 {
///     session.add(Entry::point(vec![i as f64, 0.0], format!("parcel-{}", i)).unwrap()).unwrap();
/// }
/// session.close().unwrap();
///
/// let window = RectNd::new(vec![2.5, -1.0], vec![5.5, 1.0]).unwrap();
/// let mut hits = Vec::new();
/// manager.intersects(&index, &window, |entry| {
///     hits.push(entry.data.clone());
///     ControlFlow::Continue(())
/// }).unwrap();
/// assert_eq!(hits.len(), 3);
///
/// let closest = manager.nearest(&index, &PointNd::new(vec![7.2, 0.0]), 1).unwrap();
/// assert_eq!(closest[0].entry.data, "parcel-7");
/// ```
#[derive(Clone)]
pub struct RTreeIndexManager {
    inner: Arc<RTreeIndexManagerInner>,
}

struct RTreeIndexManagerInner {
    store: GraphStore,
    locks: LockRegistry,
    /// Serialises creation and removal of metadata nodes.
    catalog: Mutex<()>,
    config: RTreeConfig,
}

impl RTreeIndexManager {
    /// Creates a manager over `store`.
    ///
    /// # Errors
    /// `InvalidConfig` if `config` fails validation.
    pub fn new(store: GraphStore, config: RTreeConfig) -> RTreeResult<Self> {
        config.validate()?;
        Ok(RTreeIndexManager {
            inner: Arc::new(RTreeIndexManagerInner {
                store,
                locks: LockRegistry::new(),
                catalog: Mutex::new(()),
                config,
            }),
        })
    }

    pub fn store(&self) -> &GraphStore {
        &self.inner.store
    }

    pub fn config(&self) -> &RTreeConfig {
        &self.inner.config
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    /// Creates a new, empty index.
    ///
    /// # Arguments
    /// * `name` - Unique index name
    /// * `m_min` - Minimum fanout of non-root nodes
    /// * `m_max` - Maximum fanout of every node
    ///
    /// # Errors
    /// * `InvalidConfig` - If the fanout bounds are unusable
    /// * `DuplicateIndex` - If an index with this name already exists
    pub fn create_index(&self, name: &str, m_min: usize, m_max: usize) -> RTreeResult<IndexHandle> {
        validate_fanout(m_min, m_max)?;
        let _catalog = self.inner.catalog.lock();
        let mut tx = self.inner.store.begin()?;
        if find_metadata(tx.as_ref(), name)?.is_some() {
            tx.rollback()?;
            return Err(RTreeError::DuplicateIndex(name.to_string()));
        }
        let handle = create_metadata(tx.as_mut(), name, m_min, m_max)?;
        tx.commit()?;
        info!("Created index {}", handle);
        Ok(handle)
    }

    /// Opens an existing index.
    ///
    /// # Errors
    /// `IndexNotFound` if no index has this name.
    pub fn get_index(&self, name: &str) -> RTreeResult<IndexHandle> {
        let tx = self.inner.store.begin()?;
        let handle = load_handle(tx.as_ref(), name)?;
        tx.rollback()?;
        handle.ok_or_else(|| RTreeError::IndexNotFound(name.to_string()))
    }

    /// Opens the index called `name`, creating it if needed. The fanout of
    /// an existing index wins over the arguments.
    pub fn get_or_create_index(
        &self,
        name: &str,
        m_min: usize,
        m_max: usize,
    ) -> RTreeResult<IndexHandle> {
        validate_fanout(m_min, m_max)?;
        let _catalog = self.inner.catalog.lock();
        let mut tx = self.inner.store.begin()?;
        if let Some(existing) = load_handle(tx.as_ref(), name)? {
            tx.rollback()?;
            if (existing.m_min(), existing.m_max()) != (m_min, m_max) {
                debug!(
                    "Index {} exists with fanout [{}..{}], ignoring requested [{}..{}]",
                    name,
                    existing.m_min(),
                    existing.m_max(),
                    m_min,
                    m_max
                );
            }
            return Ok(existing);
        }
        let handle = create_metadata(tx.as_mut(), name, m_min, m_max)?;
        tx.commit()?;
        info!("Created index {}", handle);
        Ok(handle)
    }

    /// Deletes an index with every node of its tree.
    ///
    /// Waits for the index's writer session, if any, to finish. `on_payload`
    /// is called once with the payload of every entry removed, so the caller
    /// can dispose of whatever the entries referred to.
    ///
    /// # Errors
    /// `IndexNotFound` if no index has this name.
    pub fn drop_index<F>(&self, name: &str, mut on_payload: F) -> RTreeResult<()>
    where
        F: FnMut(&str),
    {
        let lock = self.inner.locks.get_lock(name);
        let _guard = lock.write_owned();
        let _catalog = self.inner.catalog.lock();

        let mut tx = self.inner.store.begin()?;
        let Some(metadata) = find_metadata(tx.as_ref(), name)? else {
            tx.rollback()?;
            return Err(RTreeError::IndexNotFound(name.to_string()));
        };

        let mut deleted = 0;
        if let Some(root) = read_root(tx.as_ref(), metadata)? {
            let mut visit = |entry: &Entry| on_payload(&entry.data);
            deleted = delete_subtree(tx.as_mut(), root, Some(&mut visit))?;
        }
        tx.delete_node(metadata)?;
        tx.commit()?;
        self.inner.locks.remove_lock(name);

        info!("Dropped index {} with {} tree nodes", name, deleted);
        Ok(())
    }

    /// Names of every index in the store, sorted.
    pub fn index_names(&self) -> RTreeResult<Vec<String>> {
        let tx = self.inner.store.begin()?;
        let mut names = Vec::new();
        for id in tx.nodes_with_label(LABEL_METADATA)? {
            if let Some(Value::Str(name)) = tx.get_property(id, PROP_NAME)? {
                names.push(name);
            }
        }
        tx.rollback()?;
        names.sort();
        Ok(names)
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Opens the writer session of an index, blocking until no other
    /// session or query holds the index.
    ///
    /// # Arguments
    /// * `handle` - The index to write
    /// * `batch_size` - Edits per automatic commit; the configured
    ///   `commit_batch_size` when `None`
    ///
    /// # Errors
    /// * `InvalidConfig` - If `batch_size` is zero
    /// * `IndexNotFound` - If the index was dropped
    pub fn open_session(
        &self,
        handle: &IndexHandle,
        batch_size: Option<usize>,
    ) -> RTreeResult<WriterSession> {
        let batch_size = self.batch_size(batch_size)?;
        let guard = self.inner.locks.get_lock(handle.name()).write_owned();
        self.verify(handle)?;
        Ok(WriterSession::new(
            self.inner.store.clone(),
            handle.clone(),
            self.inner.config.clone(),
            batch_size,
            guard,
        ))
    }

    /// Like [`open_session`](Self::open_session) but returns `Ok(None)`
    /// instead of blocking when the index is busy.
    pub fn try_open_session(
        &self,
        handle: &IndexHandle,
        batch_size: Option<usize>,
    ) -> RTreeResult<Option<WriterSession>> {
        let batch_size = self.batch_size(batch_size)?;
        let Some(guard) = self.inner.locks.get_lock(handle.name()).try_write_owned() else {
            return Ok(None);
        };
        self.verify(handle)?;
        Ok(Some(WriterSession::new(
            self.inner.store.clone(),
            handle.clone(),
            self.inner.config.clone(),
            batch_size,
            guard,
        )))
    }

    fn batch_size(&self, requested: Option<usize>) -> RTreeResult<usize> {
        match requested {
            Some(0) => Err(RTreeError::InvalidConfig(
                "commit batch size must be positive".to_string(),
            )),
            Some(size) => Ok(size),
            None => Ok(self.inner.config.commit_batch_size),
        }
    }

    fn verify(&self, handle: &IndexHandle) -> RTreeResult<()> {
        let tx = self.inner.store.begin()?;
        let outcome = require_metadata(tx.as_ref(), handle);
        tx.rollback()?;
        outcome
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Runs `query` on a fresh transaction under the index's read lock.
    fn read<T, Q>(&self, handle: &IndexHandle, query: Q) -> RTreeResult<T>
    where
        Q: FnOnce(&dyn GraphTransaction, Option<NodeId>) -> RTreeResult<T>,
    {
        let lock = self.inner.locks.get_lock(handle.name());
        let _guard = lock.read();
        let tx = self.inner.store.begin()?;
        require_metadata(tx.as_ref(), handle)?;
        let root = read_root(tx.as_ref(), handle.metadata_id())?;
        let result = query(tx.as_ref(), root);
        tx.rollback()?;
        result
    }

    /// Visits every entry whose rect intersects `query`; the visitor may
    /// break to stop early.
    ///
    /// # Returns
    /// The number of entries passed to the visitor.
    pub fn intersects<F>(&self, handle: &IndexHandle, query: &RectNd, visitor: F) -> RTreeResult<usize>
    where
        F: FnMut(&Entry) -> ControlFlow<()>,
    {
        self.read(handle, |tx, root| {
            check_query_dimension(tx, handle, query.dimension())?;
            intersects(tx, root, query, visitor)
        })
    }

    /// Visits every entry whose rect lies entirely inside `query`.
    pub fn within<F>(&self, handle: &IndexHandle, query: &RectNd, visitor: F) -> RTreeResult<usize>
    where
        F: FnMut(&Entry) -> ControlFlow<()>,
    {
        self.read(handle, |tx, root| {
            check_query_dimension(tx, handle, query.dimension())?;
            within(tx, root, query, visitor)
        })
    }

    /// Walks the whole tree. `node_visitor` decides per node whether to
    /// descend; `entry_visitor` sees the entries of every leaf reached.
    pub fn traverse<N, E>(&self, handle: &IndexHandle, node_visitor: N, entry_visitor: E) -> RTreeResult<usize>
    where
        N: FnMut(NodeId, Option<&RectNd>) -> bool,
        E: FnMut(&Entry) -> ControlFlow<()>,
    {
        self.read(handle, |tx, root| traverse(tx, root, node_visitor, entry_visitor))
    }

    /// The `k` entries closest to `query`, nearest first, by Euclidean
    /// distance to their rects.
    pub fn nearest(&self, handle: &IndexHandle, query: &PointNd, k: usize) -> RTreeResult<Vec<DistanceResult>> {
        let distance = point_distance(query.clone());
        self.read(handle, |tx, root| {
            check_query_dimension(tx, handle, query.dimension())?;
            nearest(tx, root, query, k, |_| true, distance)
        })
    }

    /// The `k` closest entries accepted by `filter`, measured by `distance`.
    ///
    /// `distance` must never be smaller than the Euclidean distance from
    /// `query` to an entry's rect, or the search may miss closer entries.
    pub fn nearest_filtered<P, D>(
        &self,
        handle: &IndexHandle,
        query: &PointNd,
        k: usize,
        filter: P,
        distance: D,
    ) -> RTreeResult<Vec<DistanceResult>>
    where
        P: Fn(&Entry) -> bool,
        D: Fn(&Entry) -> f64,
    {
        self.read(handle, |tx, root| {
            check_query_dimension(tx, handle, query.dimension())?;
            nearest(tx, root, query, k, filter, distance)
        })
    }

    /// Number of entries in the index.
    pub fn count(&self, handle: &IndexHandle) -> RTreeResult<usize> {
        self.read(handle, |tx, _| {
            Ok(tx
                .get_property(handle.metadata_id(), PROP_ENTRY_COUNT)?
                .and_then(|v| v.as_int())
                .unwrap_or(0)
                .max(0) as usize)
        })
    }

    /// Bounds of everything in the index, `None` when it is empty.
    pub fn bounds(&self, handle: &IndexHandle) -> RTreeResult<Option<RectNd>> {
        self.read(handle, |tx, root| match root {
            Some(root) => read_mbr(tx, root),
            None => Ok(None),
        })
    }

    pub fn is_empty(&self, handle: &IndexHandle) -> RTreeResult<bool> {
        self.read(handle, |_, root| Ok(root.is_none()))
    }

    pub fn stats(&self, handle: &IndexHandle) -> RTreeResult<TreeStats> {
        self.read(handle, collect_stats)
    }

    /// Checks the structural rules of the tree. See
    /// [`check_integrity`](crate::rtree::check_integrity).
    pub fn check_integrity(&self, handle: &IndexHandle) -> RTreeResult<IntegrityReport> {
        self.read(handle, |tx, _| {
            check_integrity(tx, handle.metadata_id(), handle.m_min(), handle.m_max())
        })
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Deletes every tree node in the store, of any index, that is not
    /// reachable from an index's metadata node.
    ///
    /// Writer sessions reclaim what they detach on every commit, so this
    /// only finds nodes left behind by writes made outside the manager.
    ///
    /// # Returns
    /// The number of nodes deleted.
    pub fn collect_garbage(&self) -> RTreeResult<usize> {
        let _catalog = self.inner.catalog.lock();
        let mut tx = self.inner.store.begin()?;
        let reclaimed = collect_garbage(tx.as_mut())?;
        tx.commit()?;
        Ok(reclaimed)
    }
}

fn find_metadata(tx: &dyn GraphTransaction, name: &str) -> RTreeResult<Option<NodeId>> {
    Ok(tx.find_node(LABEL_METADATA, PROP_NAME, &Value::from(name))?)
}

fn create_metadata(
    tx: &mut dyn GraphTransaction,
    name: &str,
    m_min: usize,
    m_max: usize,
) -> RTreeResult<IndexHandle> {
    let id = tx.create_node(LABEL_METADATA)?;
    tx.set_property(id, PROP_NAME, Value::from(name))?;
    tx.set_property(id, PROP_M_MIN, Value::from(m_min))?;
    tx.set_property(id, PROP_M_MAX, Value::from(m_max))?;
    tx.set_property(id, PROP_ENTRY_COUNT, Value::Int(0))?;
    Ok(IndexHandle::new(name, id, m_min, m_max))
}

fn load_handle(tx: &dyn GraphTransaction, name: &str) -> RTreeResult<Option<IndexHandle>> {
    let Some(id) = find_metadata(tx, name)? else {
        return Ok(None);
    };
    let fanout = |key: &str| -> RTreeResult<usize> {
        tx.get_property(id, key)?
            .and_then(|v| v.as_int())
            .filter(|&v| v > 0)
            .map(|v| v as usize)
            .ok_or_else(|| {
                RTreeError::InvariantViolation(format!("index {} has no valid {}", name, key))
            })
    };
    Ok(Some(IndexHandle::new(name, id, fanout(PROP_M_MIN)?, fanout(PROP_M_MAX)?)))
}

/// Fails with `InvalidRect` when a query of `dimension` axes cannot match
/// the index. An index nothing was inserted into accepts any query.
fn check_query_dimension(
    tx: &dyn GraphTransaction,
    handle: &IndexHandle,
    dimension: usize,
) -> RTreeResult<()> {
    match read_dimension(tx, handle.metadata_id())? {
        Some(expected) => require_dimension(expected, dimension),
        None => Ok(()),
    }
}

/// Fails with `IndexNotFound` unless the handle's metadata node still
/// exists and still carries the handle's name.
fn require_metadata(tx: &dyn GraphTransaction, handle: &IndexHandle) -> RTreeResult<()> {
    let id = handle.metadata_id();
    let alive = tx.node_exists(id)?
        && tx.label(id)? == LABEL_METADATA
        && tx.get_property(id, PROP_NAME)?.as_ref().and_then(Value::as_str) == Some(handle.name());
    if alive {
        Ok(())
    } else {
        Err(RTreeError::IndexNotFound(handle.name().to_string()))
    }
}
