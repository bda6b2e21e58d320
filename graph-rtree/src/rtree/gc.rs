//! Reclaiming tree nodes that no longer hang off any index root.
//!
//! A node is tethered when following `PARENT_TO_CHILD` edges upward ends at
//! a node with an incoming `METADATA_TO_ROOT` edge. Untethered nodes are
//! deleted together with everything below them.

use log::{info, warn};
use std::collections::HashSet;

use super::define::*;
use super::node::{read_children, read_entries, read_kind, read_size, NodeKind};
use super::rect::Entry;
use crate::errors::RTreeResult;
use crate::store::{Direction, GraphTransaction, NodeId};

/// Walks up from every candidate and deletes each subtree whose top never
/// reaches a root. Returns the number of nodes deleted.
pub(crate) fn sweep_untethered(
    tx: &mut dyn GraphTransaction,
    candidates: &[NodeId],
) -> RTreeResult<usize> {
    let mut tethered: HashSet<NodeId> = HashSet::new();
    let mut reclaimed = 0;

    for &start in candidates {
        if tethered.contains(&start) || !tx.node_exists(start)? {
            continue;
        }

        let mut path = Vec::new();
        let mut visited = HashSet::new();
        let mut current = start;
        let anchored = loop {
            if tethered.contains(&current) {
                break true;
            }
            if !visited.insert(current) {
                // a parent cycle can never reach a root
                break false;
            }
            path.push(current);
            if !tx
                .neighbours(current, Direction::Incoming, EDGE_METADATA_TO_ROOT)?
                .is_empty()
            {
                break true;
            }
            match tx
                .neighbours(current, Direction::Incoming, EDGE_PARENT_TO_CHILD)?
                .first()
            {
                Some(&parent) => current = parent,
                None => break false,
            }
        };

        if anchored {
            tethered.extend(path);
        } else if let Some(&top) = path.last() {
            let deleted = delete_subtree(tx, top, None)?;
            warn!("Reclaimed untethered subtree of {} nodes under {}", deleted, top);
            reclaimed += deleted;
        }
    }
    Ok(reclaimed)
}

/// Deletes `top` and every node below it, handing each leaf entry met on
/// the way to `on_entry`. Returns the number of nodes deleted.
pub(crate) fn delete_subtree(
    tx: &mut dyn GraphTransaction,
    top: NodeId,
    mut on_entry: Option<&mut dyn FnMut(&Entry)>,
) -> RTreeResult<usize> {
    let mut stack = vec![top];
    let mut deleted = 0;

    while let Some(id) = stack.pop() {
        if !tx.node_exists(id)? {
            continue;
        }
        match read_kind(tx, id)? {
            NodeKind::Branch => stack.extend(read_children(tx, id)?),
            NodeKind::Leaf => {
                if let Some(visitor) = on_entry.as_deref_mut() {
                    let size = read_size(tx, id)?;
                    for entry in read_entries(tx, id, size)? {
                        visitor(&entry);
                    }
                }
            }
        }
        tx.delete_node(id)?;
        deleted += 1;
    }
    Ok(deleted)
}

/// Sweeps every tree node in the store, whatever index it belonged to.
pub(crate) fn collect_garbage(tx: &mut dyn GraphTransaction) -> RTreeResult<usize> {
    let mut candidates = tx.nodes_with_label(LABEL_LEAF)?;
    candidates.extend(tx.nodes_with_label(LABEL_BRANCH)?);
    let reclaimed = sweep_untethered(tx, &candidates)?;
    info!(
        "Garbage collection checked {} tree nodes and reclaimed {}",
        candidates.len(),
        reclaimed
    );
    Ok(reclaimed)
}
