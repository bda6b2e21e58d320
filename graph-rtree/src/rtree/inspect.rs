//! Tree statistics and structural integrity checks.

use std::collections::HashSet;

use super::define::*;
use super::node::{read_root, read_size, Node};
use super::rect::RectNd;
use crate::errors::RTreeResult;
use crate::store::{Direction, GraphTransaction, NodeId};

/// Shape of one index tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Levels including the leaves; zero for an empty tree.
    pub height: usize,
    pub branch_count: usize,
    pub leaf_count: usize,
    pub entry_count: usize,
}

impl TreeStats {
    pub fn node_count(&self) -> usize {
        self.branch_count + self.leaf_count
    }
}

/// Findings of [`check_integrity`].
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub nodes_checked: usize,
    pub entries_checked: usize,
    /// Non-root nodes holding fewer than `m_min` items. Removal and bulk
    /// loading may leave such nodes behind, so they are not violations.
    pub underfilled_nodes: usize,
    pub violations: Vec<String>,
}

impl IntegrityReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

pub(crate) fn collect_stats(tx: &dyn GraphTransaction, root: Option<NodeId>) -> RTreeResult<TreeStats> {
    let mut stats = TreeStats::default();
    let Some(root) = root else {
        return Ok(stats);
    };

    let mut stack = vec![(root, 1)];
    while let Some((id, depth)) = stack.pop() {
        stats.height = stats.height.max(depth);
        match Node::load(tx, id)? {
            Node::Branch { children, .. } => {
                stats.branch_count += 1;
                stack.extend(children.into_iter().map(|child| (child, depth + 1)));
            }
            Node::Leaf { entries, .. } => {
                stats.leaf_count += 1;
                stats.entry_count += entries.len();
            }
        }
    }
    Ok(stats)
}

/// Walks the tree anchored at `metadata` and reports every broken
/// structural rule: unequal leaf depths, nodes above `m_max` or empty,
/// bounds that are not the exact union of their items, nodes without
/// exactly one parent link, and a stale entry count.
pub fn check_integrity(
    tx: &dyn GraphTransaction,
    metadata: NodeId,
    m_min: usize,
    m_max: usize,
) -> RTreeResult<IntegrityReport> {
    let mut report = IntegrityReport::default();

    let roots = tx.neighbours(metadata, Direction::Outgoing, EDGE_METADATA_TO_ROOT)?;
    if roots.len() > 1 {
        report
            .violations
            .push(format!("metadata {} has {} root links", metadata, roots.len()));
    }
    let root = read_root(tx, metadata)?;

    let mut leaf_depth = None;
    let mut seen = HashSet::new();
    let mut stack = root.map(|id| vec![(id, 1usize)]).unwrap_or_default();

    while let Some((id, depth)) = stack.pop() {
        if !seen.insert(id) {
            report
                .violations
                .push(format!("node {} is reachable more than once", id));
            continue;
        }
        report.nodes_checked += 1;

        let parents = tx.neighbours(id, Direction::Incoming, EDGE_PARENT_TO_CHILD)?;
        let expected_parents = if Some(id) == root { 0 } else { 1 };
        if parents.len() != expected_parents {
            report.violations.push(format!(
                "node {} has {} parent links, expected {}",
                id,
                parents.len(),
                expected_parents
            ));
        }

        let node = Node::load(tx, id)?;
        let len = node.len();
        if read_size(tx, id)? != len {
            report
                .violations
                .push(format!("node {} records a size other than its {} items", id, len));
        }
        if len > m_max {
            report
                .violations
                .push(format!("node {} holds {} items, more than {}", id, len, m_max));
        }
        if len == 0 {
            report.violations.push(format!("node {} is empty", id));
        } else if len < m_min && Some(id) != root {
            report.underfilled_nodes += 1;
        }

        let item_bounds = match &node {
            Node::Branch { children, .. } => {
                let mut bounds = Vec::with_capacity(children.len());
                for &child in children {
                    if let Some(mbr) = Node::load(tx, child)?.mbr() {
                        bounds.push(mbr.clone());
                    }
                    stack.push((child, depth + 1));
                }
                bounds
            }
            Node::Leaf { entries, .. } => {
                report.entries_checked += entries.len();
                match leaf_depth {
                    None => leaf_depth = Some(depth),
                    Some(expected) if expected != depth => report.violations.push(format!(
                        "leaf {} sits at depth {}, other leaves at {}",
                        id, depth, expected
                    )),
                    Some(_) => {}
                }
                entries.iter().map(|e| e.rect.clone()).collect()
            }
        };

        let union = RectNd::union_all(&item_bounds);
        if node.mbr() != union.as_ref() {
            report.violations.push(format!(
                "node {} bounds {} differ from the union of its items {}",
                id,
                describe(node.mbr()),
                describe(union.as_ref())
            ));
        }
    }

    let recorded = tx
        .get_property(metadata, PROP_ENTRY_COUNT)?
        .and_then(|v| v.as_int())
        .unwrap_or(0);
    if recorded != report.entries_checked as i64 {
        report.violations.push(format!(
            "entry count is {} but the tree holds {} entries",
            recorded, report.entries_checked
        ));
    }

    Ok(report)
}

fn describe(mbr: Option<&RectNd>) -> String {
    mbr.map_or_else(|| "none".to_string(), RectNd::to_string)
}
