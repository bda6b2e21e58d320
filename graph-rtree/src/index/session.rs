use log::{debug, error, info, warn};
use uuid::Uuid;

use super::handle::IndexHandle;
use crate::common::OwnedWriteGuard;
use crate::config::RTreeConfig;
use crate::errors::{RTreeError, RTreeResult};
use crate::rtree::editor::Editor;
use crate::rtree::rect::Entry;
use crate::rtree::tx_cell::TxCell;
use crate::store::GraphStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Closed,
    Failed,
}

/// Exclusive writer on one index.
///
/// A session holds the index's write lock from
/// [`RTreeIndexManager::open_session`](super::RTreeIndexManager::open_session)
/// until it is closed or dropped, so at most one session per index exists at
/// any time while readers keep using the last committed tree.
///
/// Edits are buffered and committed in batches: once the number of edits
/// since the last commit reaches the batch size, the batch is committed
/// before the call returns. Each batch becomes visible atomically.
///
/// # Lifecycle
/// - [`close`](WriterSession::close) commits the current batch and releases
///   the lock.
/// - Dropping an open session rolls back the current batch; batches already
///   committed stay.
/// - A missing remove/update target and a rect of the wrong dimension
///   ([`RTreeError::InvalidRect`]) are reported without touching the tree,
///   and the session stays open.
/// - Any other failure rolls back the current batch and poisons the
///   session: every later call returns [`RTreeError::SessionClosed`].
///
/// # Example
/// ```
/// use graph_rtree::{Entry, InMemoryGraphStore, GraphStore, RTreeConfig, RTreeIndexManager};
///
/// let store = GraphStore::new(InMemoryGraphStore::new());
/// let manager = RTreeIndexManager::new(store, RTreeConfig::default()).unwrap();
/// let index = manager.create_index("cities", 2, 8).unwrap();
///
/// let mut session = manager.open_session(&index, None).unwrap();
/// session.add(Entry::point(vec![4.9, 52.4], "amsterdam").unwrap()).unwrap();
/// session.add(Entry::point(vec![2.3, 48.9], "paris").unwrap()).unwrap();
/// session.close().unwrap();
///
/// assert_eq!(manager.count(&index).unwrap(), 2);
/// ```
pub struct WriterSession {
    id: String,
    handle: IndexHandle,
    config: RTreeConfig,
    cell: TxCell,
    state: SessionState,
    _guard: OwnedWriteGuard,
}

impl WriterSession {
    pub(crate) fn new(
        store: GraphStore,
        handle: IndexHandle,
        config: RTreeConfig,
        batch_size: usize,
        guard: OwnedWriteGuard,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        debug!(
            "Opened writer session {} on index {} with batch size {}",
            id, handle, batch_size
        );
        WriterSession {
            cell: TxCell::new(store, handle.metadata_id(), batch_size),
            id,
            handle,
            config,
            state: SessionState::Open,
            _guard: guard,
        }
    }

    /// Unique id of this session, for correlating log lines.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handle(&self) -> &IndexHandle {
        &self.handle
    }

    /// Returns `true` until the session is closed or poisoned.
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Edits buffered since the last commit.
    pub fn pending_changes(&self) -> usize {
        self.cell.pending_changes()
    }

    /// Batches committed by this session so far.
    pub fn commit_count(&self) -> u64 {
        self.cell.commit_count()
    }

    /// Inserts one entry. The first entry ever inserted fixes the
    /// dimension of the index; later entries of another dimension fail
    /// with [`RTreeError::InvalidRect`].
    pub fn add(&mut self, entry: Entry) -> RTreeResult<()> {
        self.apply(1, |editor| editor.add(entry))
    }

    /// Removes every entry carrying the payload of `entry`, looking only in
    /// subtrees whose bounds intersect `entry.rect`.
    ///
    /// # Returns
    /// The number of entries removed. When nothing matches, the configured
    /// [`MissingEntryPolicy`](crate::config::MissingEntryPolicy) decides
    /// between `Ok(0)` and [`RTreeError::EntryNotFound`].
    pub fn remove(&mut self, entry: &Entry) -> RTreeResult<usize> {
        self.apply(1, |editor| editor.remove(entry))
    }

    /// Moves the entry matching `old` to `new.rect` in place. The entry
    /// keeps its payload; `new.data` is not used.
    ///
    /// # Returns
    /// `true` if an entry was replaced; a missing `old` is handled like a
    /// missing remove target.
    pub fn update(&mut self, old: &Entry, new: Entry) -> RTreeResult<bool> {
        self.apply(1, |editor| editor.update(old, new))
    }

    /// Inserts a batch through the bulk loader.
    ///
    /// A batch that is large next to the current tree rebuilds the tree
    /// from scratch; a smaller one is grafted in as whole subtrees where it
    /// fits and inserted entry by entry where it does not.
    pub fn add_all(&mut self, entries: Vec<Entry>) -> RTreeResult<()> {
        let count = entries.len();
        if count == 0 {
            return self.ensure_open();
        }
        self.apply(count, |editor| editor.add_all(entries))
    }

    /// Commits the current batch now, whatever its size.
    pub fn commit(&mut self) -> RTreeResult<()> {
        self.ensure_open()?;
        match self.cell.commit() {
            Ok(()) => Ok(()),
            Err(err) => self.fail(err),
        }
    }

    /// Commits the current batch and releases the index lock.
    pub fn close(mut self) -> RTreeResult<()> {
        self.commit()?;
        self.state = SessionState::Closed;
        info!(
            "Closed writer session {} on index {} after {} commits",
            self.id,
            self.handle.name(),
            self.cell.commit_count()
        );
        Ok(())
    }

    fn ensure_open(&self) -> RTreeResult<()> {
        match self.state {
            SessionState::Open => Ok(()),
            SessionState::Closed | SessionState::Failed => Err(RTreeError::SessionClosed),
        }
    }

    fn apply<T, F>(&mut self, changes: usize, op: F) -> RTreeResult<T>
    where
        F: FnOnce(&mut Editor<'_>) -> RTreeResult<T>,
    {
        self.ensure_open()?;
        let outcome = {
            let mut editor = Editor::new(
                &mut self.cell,
                self.handle.m_min(),
                self.handle.m_max(),
                &self.config,
            );
            op(&mut editor)
        };

        match outcome {
            Ok(value) => {
                self.cell.add_change(changes);
                match self.cell.limit_commit() {
                    Ok(_) => Ok(value),
                    Err(err) => self.fail(err),
                }
            }
            Err(err) if err.is_recoverable() => Err(err),
            Err(err) => self.fail(err),
        }
    }

    fn fail<T>(&mut self, err: RTreeError) -> RTreeResult<T> {
        error!(
            "Writer session {} on index {} failed: {}",
            self.id,
            self.handle.name(),
            err
        );
        self.state = SessionState::Failed;
        if let Err(rollback_err) = self.cell.rollback() {
            error!(
                "Rolling back session {} also failed: {}",
                self.id, rollback_err
            );
        }
        Err(err)
    }
}

impl Drop for WriterSession {
    fn drop(&mut self) {
        if self.state != SessionState::Open {
            return;
        }
        warn!(
            "Writer session {} on index {} dropped without close, rolling back {} pending changes",
            self.id,
            self.handle.name(),
            self.cell.pending_changes()
        );
        if let Err(err) = self.cell.rollback() {
            error!("Rollback of dropped session {} failed: {}", self.id, err);
        }
    }
}
