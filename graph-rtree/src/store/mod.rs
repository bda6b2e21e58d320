//! The transactional graph store the index is persisted in.
//!
//! The index never talks to a concrete storage engine. It consumes the small
//! surface defined here: typed nodes with named properties, typed directed
//! edges, lookup by unique property, and transactions that make a batch of
//! writes visible all at once or not at all.
//!
//! - [`GraphStoreProvider`] opens transactions.
//! - [`GraphTransaction`] is one unit of atomic work. Reads inside a
//!   transaction observe its own uncommitted writes.
//! - [`GraphStore`] is the cheap-clone handle passed around the crate.
//!
//! [`memory::InMemoryGraphStore`] is the bundled implementation.

pub mod memory;

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::sync::Arc;

use crate::errors::StoreResult;

/// Identifier of a node in the graph store.
pub type NodeId = u64;

/// Direction of an edge relative to the node it is enumerated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A property value stored on a graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    FloatArray(Vec<f64>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_float_array(&self) -> Option<&[f64]> {
        match self {
            Value::FloatArray(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<f64>> for Value {
    fn from(value: Vec<f64>) -> Self {
        Value::FloatArray(value)
    }
}

impl From<&[f64]> for Value {
    fn from(value: &[f64]) -> Self {
        Value::FloatArray(value.to_vec())
    }
}

/// Opens transactions against a graph store.
pub trait GraphStoreProvider: Send + Sync {
    /// Begins a new transaction.
    fn begin(&self) -> StoreResult<Box<dyn GraphTransaction>>;
}

/// One atomic unit of work against the graph store.
///
/// Writes are buffered until [`GraphTransaction::commit`]; dropping or
/// rolling back a transaction discards them. A transaction is owned by a
/// single caller and is never shared across threads.
pub trait GraphTransaction: Send {
    /// Creates a node carrying `label` and returns its id.
    fn create_node(&mut self, label: &str) -> StoreResult<NodeId>;

    /// Deletes a node together with all its edges.
    fn delete_node(&mut self, id: NodeId) -> StoreResult<()>;

    fn node_exists(&self, id: NodeId) -> StoreResult<bool>;

    /// Returns the label of an existing node.
    fn label(&self, id: NodeId) -> StoreResult<String>;

    /// Returns the ids of every node carrying `label`, in ascending order.
    fn nodes_with_label(&self, label: &str) -> StoreResult<Vec<NodeId>>;

    fn get_property(&self, id: NodeId, key: &str) -> StoreResult<Option<Value>>;

    fn set_property(&mut self, id: NodeId, key: &str, value: Value) -> StoreResult<()>;

    fn remove_property(&mut self, id: NodeId, key: &str) -> StoreResult<()>;

    /// Creates a directed edge. Creating an edge that already exists is a no-op.
    fn create_edge(&mut self, from: NodeId, to: NodeId, edge_type: &str) -> StoreResult<()>;

    /// Deletes a directed edge, returning whether it existed.
    fn delete_edge(&mut self, from: NodeId, to: NodeId, edge_type: &str) -> StoreResult<bool>;

    /// Lists the nodes at the other end of every `edge_type` edge of `id`
    /// in the given direction, in edge creation order.
    fn neighbours(
        &self,
        id: NodeId,
        direction: Direction,
        edge_type: &str,
    ) -> StoreResult<Vec<NodeId>>;

    /// Finds the node with `label` whose property `key` equals `value`.
    fn find_node(&self, label: &str, key: &str, value: &Value) -> StoreResult<Option<NodeId>>;

    /// Makes every buffered write visible atomically.
    fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discards every buffered write.
    fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Shared handle to a graph store implementation.
#[derive(Clone)]
pub struct GraphStore {
    inner: Arc<dyn GraphStoreProvider>,
}

impl GraphStore {
    pub fn new<T: GraphStoreProvider + 'static>(provider: T) -> Self {
        GraphStore {
            inner: Arc::new(provider),
        }
    }
}

impl Deref for GraphStore {
    type Target = Arc<dyn GraphStoreProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Debug for GraphStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore").finish_non_exhaustive()
    }
}
