//! # Graph R-Tree - Spatial Indexes Stored in a Graph Database
//!
//! This crate keeps an R-tree spatial index inside a transactional graph
//! store: every tree node is a graph node, parent/child links are edges and
//! leaf entries are node properties. Any number of named indexes can live in
//! one store, each anchored at its own metadata node.
//!
//! ## Features
//!
//! - **N-dimensional**: axis-aligned rectangles and points of any dimension
//! - **Transactional Writes**: edits are cached and committed in atomic batches
//! - **Orphan Sweep**: nodes detached by splits and merges are reclaimed on commit
//! - **Bulk Loading**: top-down rebuild or cluster-and-graft for large batches
//! - **Queries**: intersection and containment windows, full traversal and
//!   filtered k-nearest-neighbour search
//! - **Per-Index Locking**: one writer session per index, concurrent readers
//! - **Pluggable Store**: anything implementing [`GraphStoreProvider`]; an
//!   in-memory store with optional snapshot file is included
//!
//! ## Quick Start
//!
//! ```rust
//! use graph_rtree::{Entry, GraphStore, InMemoryGraphStore, PointNd, RTreeConfig, RTreeIndexManager};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = RTreeIndexManager::new(
//!     GraphStore::new(InMemoryGraphStore::new()),
//!     RTreeConfig::default(),
//! )?;
//! let index = manager.get_or_create_index("stations", 2, 8)?;
//!
//! let mut session = manager.open_session(&index, None)?;
//! session.add_all(vec![
//!     Entry::point(vec![0.0, 0.0], "central")?,
//!     Entry::point(vec![3.0, 4.0], "harbour")?,
//!     Entry::point(vec![-1.0, 2.0], "museum")?,
//! ])?;
//! session.close()?;
//!
//! let closest = manager.nearest(&index, &PointNd::new(vec![2.5, 3.5]), 2)?;
//! assert_eq!(closest[0].entry.data, "harbour");
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod config;
pub mod errors;
pub mod index;
pub mod rtree;
pub mod store;

pub use config::{MissingEntryPolicy, RTreeConfig, SplitStrategy};
pub use errors::{RTreeError, RTreeResult, StoreError, StoreResult};
pub use index::{IndexHandle, RTreeIndexManager, WriterSession};
pub use rtree::{
    DataId, DistanceResult, Entry, IntegrityReport, PointNd, RectNd, TreeStats,
};
pub use store::memory::{InMemoryGraphStore, InMemoryStoreConfig};
pub use store::{Direction, GraphStore, GraphStoreProvider, GraphTransaction, NodeId, Value};
