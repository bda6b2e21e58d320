use parking_lot::lock_api::ArcRwLockWriteGuard;
use parking_lot::{RawRwLock, RwLock, RwLockReadGuard};
use std::collections::HashMap;
use std::sync::Arc;

/// Write guard that owns its lock and can outlive the registry borrow.
pub type OwnedWriteGuard = ArcRwLockWriteGuard<RawRwLock, ()>;

/// A handle to the read-write lock of one index name.
#[derive(Clone)]
pub struct LockHandle {
    lock: Arc<RwLock<()>>,
}

impl LockHandle {
    /// Acquires a shared lock for a read-only traversal.
    pub fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    /// Acquires the exclusive lock, blocking until every reader and any
    /// other writer has released it.
    ///
    /// The guard keeps the lock alive on its own, so a writer session can
    /// hold it for its whole lifetime and release it simply by being dropped.
    pub fn write_owned(&self) -> OwnedWriteGuard {
        self.lock.write_arc()
    }

    /// Tries to acquire the exclusive lock without blocking.
    pub fn try_write_owned(&self) -> Option<OwnedWriteGuard> {
        self.lock.try_write_arc()
    }
}

/// Registry of named read-write locks, one per index name.
///
/// Lookups and insertions are guarded by a single short-held lock; the
/// per-name locks themselves are independent, so writers on different
/// indexes never contend.
///
/// # Examples
///
/// ```
/// use graph_rtree::common::LockRegistry;
/// let registry = LockRegistry::new();
/// let handle = registry.get_lock("roads");
/// {
///     let _read_guard = handle.read();
/// }
/// let _write_guard = handle.write_owned();
/// ```
#[derive(Clone)]
pub struct LockRegistry {
    locks: Arc<RwLock<HashMap<String, Arc<RwLock<()>>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        LockRegistry {
            locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Gets the lock for `name`, creating it on first use.
    pub fn get_lock(&self, name: &str) -> LockHandle {
        if let Some(lock) = self.locks.read().get(name) {
            return LockHandle { lock: lock.clone() };
        }

        let lock = {
            let mut locks = self.locks.write();
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(())))
                .clone()
        };
        LockHandle { lock }
    }

    /// Removes the lock for `name` from the registry.
    ///
    /// Holders of an existing handle keep a working lock; later callers get a
    /// fresh one.
    pub fn remove_lock(&self, name: &str) -> bool {
        let mut locks = self.locks.write();
        locks.remove(name).is_some()
    }

    /// Returns the number of locks currently registered.
    pub fn lock_count(&self) -> usize {
        self.locks.read().len()
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
