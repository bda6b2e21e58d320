use graph_rtree::{
    Direction, Entry, GraphStore, GraphStoreProvider, GraphTransaction, InMemoryGraphStore,
    InMemoryStoreConfig, IndexHandle, NodeId, PointNd, RTreeConfig, RTreeIndexManager,
    RTreeResult, RectNd, StoreError, StoreResult, Value,
};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;

/// Runs a test body between a setup and a teardown step.
///
/// The teardown runs even when the body fails, and any failure of the
/// three steps fails the test with its error.
pub fn run_test<B, T, A>(before: B, test: T, after: A)
where
    B: FnOnce() -> RTreeResult<TestContext>,
    T: FnOnce(TestContext) -> RTreeResult<()>,
    A: FnOnce(TestContext) -> RTreeResult<()>,
{
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };

    let started = Instant::now();
    let outcome = test(ctx.clone());
    debug!("Test body finished in {:?}", started.elapsed());
    let teardown = after(ctx);

    if let Err(e) = outcome {
        panic!("Test failed: {:?}", e);
    }
    if let Err(e) = teardown {
        panic!("After run failed: {:?}", e);
    }
}

#[derive(Clone)]
pub struct TestContext {
    store: InMemoryGraphStore,
    manager: RTreeIndexManager,
    dir: Option<Arc<TempDir>>,
}

impl TestContext {
    pub fn new(store: InMemoryGraphStore, manager: RTreeIndexManager) -> Self {
        TestContext {
            store,
            manager,
            dir: None,
        }
    }

    pub fn store(&self) -> &InMemoryGraphStore {
        &self.store
    }

    pub fn manager(&self) -> &RTreeIndexManager {
        &self.manager
    }

    /// Snapshot file of a persistent context.
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| snapshot_file(dir.path()))
    }
}

pub fn create_test_context() -> RTreeResult<TestContext> {
    create_test_context_with(RTreeConfig::default())
}

pub fn create_test_context_with(config: RTreeConfig) -> RTreeResult<TestContext> {
    let store = InMemoryGraphStore::new();
    let manager = RTreeIndexManager::new(GraphStore::new(store.clone()), config)?;
    Ok(TestContext::new(store, manager))
}

/// A context whose store writes a snapshot file into a fresh temp dir.
pub fn create_persistent_test_context() -> RTreeResult<TestContext> {
    let dir = TempDir::new().map_err(StoreError::from)?;
    let store = open_snapshot_store(dir.path())?;
    let manager = RTreeIndexManager::new(GraphStore::new(store.clone()), RTreeConfig::default())?;
    Ok(TestContext {
        store,
        manager,
        dir: Some(Arc::new(dir)),
    })
}

pub fn open_snapshot_store(dir: &Path) -> RTreeResult<InMemoryGraphStore> {
    let config = InMemoryStoreConfig::new().with_file_path(snapshot_file(dir));
    Ok(InMemoryGraphStore::open(config)?)
}

fn snapshot_file(dir: &Path) -> PathBuf {
    dir.join("graph.snapshot")
}

/// Drops every index and checks that nothing is left in the store.
pub fn cleanup(ctx: TestContext) -> RTreeResult<()> {
    let manager = ctx.manager();
    for name in manager.index_names()? {
        manager.drop_index(&name, |_| {})?;
    }
    assert_eq!(manager.collect_garbage()?, 0);
    assert_eq!(ctx.store().node_count(), 0);
    Ok(())
}

// ============================================================================
// Data sets
// ============================================================================

/// Points on an integer grid, payload `"x,y"`.
pub fn grid_points(width: usize, height: usize) -> Vec<Entry> {
    let mut entries = Vec::with_capacity(width * height);
    for x in 0..width {
        for y in 0..height {
            let entry = Entry::point(vec![x as f64, y as f64], format!("{},{}", x, y))
                .expect("grid coordinates are finite");
            entries.push(entry);
        }
    }
    entries
}

/// Random rectangles inside `[0, extent)` on both axes, sides up to
/// `max_side`. The same seed yields the same data.
pub fn random_rects(seed: u64, count: usize, extent: f64, max_side: f64) -> Vec<Entry> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let x = rng.gen_range(0.0..extent);
            let y = rng.gen_range(0.0..extent);
            let w = rng.gen_range(0.0..max_side);
            let h = rng.gen_range(0.0..max_side);
            Entry::new(rect(x, y, x + w, y + h), format!("r{}", i))
        })
        .collect()
}

pub fn random_query(seed: u64, extent: f64, max_side: f64) -> RectNd {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = rng.gen_range(0.0..extent);
    let y = rng.gen_range(0.0..extent);
    rect(x, y, x + rng.gen_range(1.0..max_side), y + rng.gen_range(1.0..max_side))
}

pub fn random_point(seed: u64, extent: f64) -> PointNd {
    let mut rng = StdRng::seed_from_u64(seed);
    PointNd::new(vec![rng.gen_range(0.0..extent), rng.gen_range(0.0..extent)])
}

pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> RectNd {
    match RectNd::new(vec![min_x, min_y], vec![max_x, max_y]) {
        Ok(rect) => rect,
        Err(e) => panic!("bad test rectangle: {}", e),
    }
}

// ============================================================================
// Reference answers
// ============================================================================

pub fn brute_force_intersects(entries: &[Entry], query: &RectNd) -> Vec<String> {
    let mut found: Vec<String> = entries
        .iter()
        .filter(|e| e.rect.intersects(query))
        .map(|e| e.data.clone())
        .collect();
    found.sort();
    found
}

/// The `k` smallest Euclidean distances from `query` to the entries.
pub fn brute_force_nearest_distances(entries: &[Entry], query: &PointNd, k: usize) -> Vec<f64> {
    let mut distances: Vec<f64> = entries
        .iter()
        .map(|e| e.rect.min_distance_squared(query).sqrt())
        .collect();
    distances.sort_by(f64::total_cmp);
    distances.truncate(k);
    distances
}

/// Sorted payloads of every entry intersecting `query`.
pub fn collect_intersects(
    manager: &RTreeIndexManager,
    handle: &IndexHandle,
    query: &RectNd,
) -> RTreeResult<Vec<String>> {
    let mut found = Vec::new();
    manager.intersects(handle, query, |entry| {
        found.push(entry.data.clone());
        ControlFlow::Continue(())
    })?;
    found.sort();
    Ok(found)
}

// ============================================================================
// Fault injection
// ============================================================================

/// Store wrapper whose commits can be switched to fail.
#[derive(Clone)]
pub struct FailingStore {
    inner: InMemoryGraphStore,
    fail_commits: Arc<AtomicBool>,
}

impl FailingStore {
    pub fn new(inner: InMemoryGraphStore) -> Self {
        FailingStore {
            inner,
            fail_commits: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

impl GraphStoreProvider for FailingStore {
    fn begin(&self) -> StoreResult<Box<dyn GraphTransaction>> {
        Ok(Box::new(FailingTransaction {
            inner: self.inner.begin()?,
            fail: self.fail_commits.clone(),
        }))
    }
}

struct FailingTransaction {
    inner: Box<dyn GraphTransaction>,
    fail: Arc<AtomicBool>,
}

impl GraphTransaction for FailingTransaction {
    fn create_node(&mut self, label: &str) -> StoreResult<NodeId> {
        self.inner.create_node(label)
    }

    fn delete_node(&mut self, id: NodeId) -> StoreResult<()> {
        self.inner.delete_node(id)
    }

    fn node_exists(&self, id: NodeId) -> StoreResult<bool> {
        self.inner.node_exists(id)
    }

    fn label(&self, id: NodeId) -> StoreResult<String> {
        self.inner.label(id)
    }

    fn nodes_with_label(&self, label: &str) -> StoreResult<Vec<NodeId>> {
        self.inner.nodes_with_label(label)
    }

    fn get_property(&self, id: NodeId, key: &str) -> StoreResult<Option<Value>> {
        self.inner.get_property(id, key)
    }

    fn set_property(&mut self, id: NodeId, key: &str, value: Value) -> StoreResult<()> {
        self.inner.set_property(id, key, value)
    }

    fn remove_property(&mut self, id: NodeId, key: &str) -> StoreResult<()> {
        self.inner.remove_property(id, key)
    }

    fn create_edge(&mut self, from: NodeId, to: NodeId, edge_type: &str) -> StoreResult<()> {
        self.inner.create_edge(from, to, edge_type)
    }

    fn delete_edge(&mut self, from: NodeId, to: NodeId, edge_type: &str) -> StoreResult<bool> {
        self.inner.delete_edge(from, to, edge_type)
    }

    fn neighbours(
        &self,
        id: NodeId,
        direction: Direction,
        edge_type: &str,
    ) -> StoreResult<Vec<NodeId>> {
        self.inner.neighbours(id, direction, edge_type)
    }

    fn find_node(&self, label: &str, key: &str, value: &Value) -> StoreResult<Option<NodeId>> {
        self.inner.find_node(label, key, value)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            self.inner.rollback()?;
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }
        self.inner.commit()
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback()
    }
}
