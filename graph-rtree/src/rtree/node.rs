//! Tree nodes as they are laid out in the graph store.
//!
//! A node is a graph node labelled [`LABEL_BRANCH`] or [`LABEL_LEAF`]. Both
//! carry `size` and their bounds (`mbr_min` / `mbr_max`, absent while the
//! node is empty). Branch children are the targets of outgoing
//! [`EDGE_PARENT_TO_CHILD`] edges; leaf entries live in numbered properties.

use super::define::*;
use super::rect::{Entry, RectNd};
use crate::errors::{RTreeError, RTreeResult};
use crate::store::{Direction, GraphTransaction, NodeId, Value};

/// Which variant of tree node a graph node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Branch,
    Leaf,
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Branch => LABEL_BRANCH,
            NodeKind::Leaf => LABEL_LEAF,
        }
    }

    pub fn from_label(label: &str) -> Option<NodeKind> {
        match label {
            LABEL_BRANCH => Some(NodeKind::Branch),
            LABEL_LEAF => Some(NodeKind::Leaf),
            _ => None,
        }
    }
}

/// A fully decoded tree node, as seen by read-only traversals.
#[derive(Debug, Clone)]
pub enum Node {
    Branch {
        id: NodeId,
        mbr: Option<RectNd>,
        children: Vec<NodeId>,
    },
    Leaf {
        id: NodeId,
        mbr: Option<RectNd>,
        entries: Vec<Entry>,
    },
}

impl Node {
    /// Reads a node and its children or entries from the store.
    pub fn load(tx: &dyn GraphTransaction, id: NodeId) -> RTreeResult<Node> {
        let mbr = read_mbr(tx, id)?;
        Ok(match read_kind(tx, id)? {
            NodeKind::Branch => Node::Branch {
                id,
                mbr,
                children: read_children(tx, id)?,
            },
            NodeKind::Leaf => {
                let size = read_size(tx, id)?;
                Node::Leaf {
                    id,
                    mbr,
                    entries: read_entries(tx, id, size)?,
                }
            }
        })
    }

    pub fn id(&self) -> NodeId {
        match self {
            Node::Branch { id, .. } | Node::Leaf { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Branch { .. } => NodeKind::Branch,
            Node::Leaf { .. } => NodeKind::Leaf,
        }
    }

    pub fn mbr(&self) -> Option<&RectNd> {
        match self {
            Node::Branch { mbr, .. } | Node::Leaf { mbr, .. } => mbr.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Node::Branch { children, .. } => children.len(),
            Node::Leaf { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Property decoding
// ============================================================================

pub(crate) fn read_kind(tx: &dyn GraphTransaction, id: NodeId) -> RTreeResult<NodeKind> {
    let label = tx.label(id)?;
    NodeKind::from_label(&label).ok_or_else(|| {
        RTreeError::InvariantViolation(format!("node {} labelled {} is not a tree node", id, label))
    })
}

pub(crate) fn read_size(tx: &dyn GraphTransaction, id: NodeId) -> RTreeResult<usize> {
    Ok(tx
        .get_property(id, PROP_SIZE)?
        .and_then(|v| v.as_int())
        .unwrap_or(0)
        .max(0) as usize)
}

pub(crate) fn read_mbr(tx: &dyn GraphTransaction, id: NodeId) -> RTreeResult<Option<RectNd>> {
    let min = tx.get_property(id, PROP_MBR_MIN)?;
    let max = tx.get_property(id, PROP_MBR_MAX)?;
    match (min, max) {
        (Some(min), Some(max)) => Ok(Some(decode_rect(id, &min, &max)?)),
        _ => Ok(None),
    }
}

pub(crate) fn read_children(tx: &dyn GraphTransaction, id: NodeId) -> RTreeResult<Vec<NodeId>> {
    Ok(tx.neighbours(id, Direction::Outgoing, EDGE_PARENT_TO_CHILD)?)
}

pub(crate) fn read_parent(tx: &dyn GraphTransaction, id: NodeId) -> RTreeResult<Option<NodeId>> {
    Ok(tx
        .neighbours(id, Direction::Incoming, EDGE_PARENT_TO_CHILD)?
        .first()
        .copied())
}

pub(crate) fn read_entries(
    tx: &dyn GraphTransaction,
    id: NodeId,
    size: usize,
) -> RTreeResult<Vec<Entry>> {
    let mut entries = Vec::with_capacity(size);
    for slot in 0..size {
        let min = tx.get_property(id, &entry_min_key(slot))?;
        let max = tx.get_property(id, &entry_max_key(slot))?;
        let data = tx.get_property(id, &entry_data_key(slot))?;
        match (min, max, data) {
            (Some(min), Some(max), Some(Value::Str(data))) => {
                entries.push(Entry::new(decode_rect(id, &min, &max)?, data));
            }
            _ => {
                return Err(RTreeError::InvariantViolation(format!(
                    "leaf {} is missing entry slot {} of {}",
                    id, slot, size
                )))
            }
        }
    }
    Ok(entries)
}

/// Root of the tree anchored at `metadata`, `None` while the tree is empty.
pub(crate) fn read_root(tx: &dyn GraphTransaction, metadata: NodeId) -> RTreeResult<Option<NodeId>> {
    Ok(tx
        .neighbours(metadata, Direction::Outgoing, EDGE_METADATA_TO_ROOT)?
        .first()
        .copied())
}

/// Dimension of the index anchored at `metadata`, `None` until something
/// was inserted. Indexes written before the property existed fall back to
/// the dimension of their root bounds.
pub(crate) fn read_dimension(
    tx: &dyn GraphTransaction,
    metadata: NodeId,
) -> RTreeResult<Option<usize>> {
    if let Some(dimension) = tx.get_property(metadata, PROP_DIMENSION)?.and_then(|v| v.as_int()) {
        return Ok(Some(dimension.max(0) as usize));
    }
    match read_root(tx, metadata)? {
        Some(root) => Ok(read_mbr(tx, root)?.map(|mbr| mbr.dimension())),
        None => Ok(None),
    }
}

fn decode_rect(id: NodeId, min: &Value, max: &Value) -> RTreeResult<RectNd> {
    match (min.as_float_array(), max.as_float_array()) {
        (Some(min), Some(max)) if min.len() == max.len() => {
            Ok(RectNd::from_corners(min.to_vec(), max.to_vec()))
        }
        _ => Err(RTreeError::InvariantViolation(format!(
            "node {} has malformed bounds",
            id
        ))),
    }
}
