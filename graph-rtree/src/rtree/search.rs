//! Window queries and full traversal.
//!
//! Readers work directly on a store transaction. They decode one node at a
//! time, descend only into subtrees whose bounds can hold a match, and stop
//! as soon as the visitor breaks.

use std::ops::ControlFlow;

use super::node::Node;
use super::rect::{Entry, RectNd};
use crate::errors::RTreeResult;
use crate::store::{GraphTransaction, NodeId};

/// Visits every entry whose rect intersects `query`. Returns the number of
/// entries handed to the visitor.
pub fn intersects<F>(
    tx: &dyn GraphTransaction,
    root: Option<NodeId>,
    query: &RectNd,
    visitor: F,
) -> RTreeResult<usize>
where
    F: FnMut(&Entry) -> ControlFlow<()>,
{
    walk(
        tx,
        root,
        |mbr| mbr.intersects(query),
        |entry| entry.rect.intersects(query),
        visitor,
    )
}

/// Visits every entry whose rect lies entirely inside `query`.
pub fn within<F>(
    tx: &dyn GraphTransaction,
    root: Option<NodeId>,
    query: &RectNd,
    visitor: F,
) -> RTreeResult<usize>
where
    F: FnMut(&Entry) -> ControlFlow<()>,
{
    walk(
        tx,
        root,
        |mbr| mbr.intersects(query),
        |entry| query.contains(&entry.rect),
        visitor,
    )
}

/// Depth-first walk over the whole tree.
///
/// `node_visitor` sees every node reached, with its bounds, and decides
/// whether to descend into it. `entry_visitor` sees the entries of every
/// leaf descended into and may stop the walk.
pub fn traverse<N, E>(
    tx: &dyn GraphTransaction,
    root: Option<NodeId>,
    mut node_visitor: N,
    mut entry_visitor: E,
) -> RTreeResult<usize>
where
    N: FnMut(NodeId, Option<&RectNd>) -> bool,
    E: FnMut(&Entry) -> ControlFlow<()>,
{
    let Some(root) = root else {
        return Ok(0);
    };

    let mut visited = 0;
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let node = Node::load(tx, id)?;
        if !node_visitor(id, node.mbr()) {
            continue;
        }
        match node {
            Node::Branch { children, .. } => stack.extend(children.into_iter().rev()),
            Node::Leaf { entries, .. } => {
                for entry in &entries {
                    visited += 1;
                    if entry_visitor(entry).is_break() {
                        return Ok(visited);
                    }
                }
            }
        }
    }
    Ok(visited)
}

fn walk<D, A, F>(
    tx: &dyn GraphTransaction,
    root: Option<NodeId>,
    descend: D,
    accept: A,
    mut visitor: F,
) -> RTreeResult<usize>
where
    D: Fn(&RectNd) -> bool,
    A: Fn(&Entry) -> bool,
    F: FnMut(&Entry) -> ControlFlow<()>,
{
    let mut matched = 0;
    traverse(
        tx,
        root,
        |_, mbr| mbr.is_some_and(&descend),
        |entry| {
            if !accept(entry) {
                return ControlFlow::Continue(());
            }
            matched += 1;
            visitor(entry)
        },
    )?;
    Ok(matched)
}
