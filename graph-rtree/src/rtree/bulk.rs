//! Bulk loading.
//!
//! A batch that is large relative to the tree replaces it: every existing
//! entry is collected, the old nodes are deleted and a new tree is built
//! top-down by sorting along the longest axis and cutting even partitions.
//! A smaller batch is clustered under the existing children that already
//! contain its entries and grafted in as whole subtrees; whatever fits
//! nowhere is inserted one entry at a time.

use log::debug;
use std::collections::HashSet;

use super::editor::Editor;
use super::node::NodeKind;
use super::rect::{Entry, RectNd};
use crate::errors::{RTreeError, RTreeResult};
use crate::store::NodeId;

impl Editor<'_> {
    /// Inserts a batch, in chunks of at most `max_bulk_chunk` entries.
    ///
    /// The whole batch is checked against the index dimension first, so a
    /// rejected batch leaves the tree untouched.
    pub(crate) fn add_all(&mut self, mut entries: Vec<Entry>) -> RTreeResult<()> {
        let Some(first) = entries.first() else {
            return Ok(());
        };
        let dimension = match self.cell.dimension()? {
            Some(dimension) => dimension,
            None => first.rect.dimension(),
        };
        for entry in &entries {
            entry.rect.require_dimension(dimension)?;
        }
        self.admit(&entries[0].rect)?;

        let chunk_size = self.config.max_bulk_chunk.max(1);
        while !entries.is_empty() {
            let rest = if entries.len() > chunk_size {
                entries.split_off(chunk_size)
            } else {
                Vec::new()
            };
            self.add_chunk(entries)?;
            entries = rest;
        }
        Ok(())
    }

    fn add_chunk(&mut self, chunk: Vec<Entry>) -> RTreeResult<()> {
        let existing = self.cell.entry_count()?;
        let incoming = chunk.len();
        let root = self.cell.root()?;

        match root {
            Some(root) if incoming as f64 <= self.config.bulk_rebuild_ratio * existing as f64 => {
                debug!(
                    "Grafting {} entries into a tree of {} entries",
                    incoming, existing
                );
                let height = self.height()?;
                let mut outliers = Vec::new();
                let mut pending = Vec::new();
                self.graft(root, height, chunk, &mut outliers, &mut pending)?;
                self.split_overflowing(pending)?;

                self.cell
                    .adjust_entry_count((incoming - outliers.len()) as i64)?;
                debug!("Inserting {} bulk outliers one by one", outliers.len());
                for entry in outliers {
                    self.add(entry)?;
                }
                Ok(())
            }
            _ => {
                debug!(
                    "Rebuilding tree of {} entries with {} new ones",
                    existing, incoming
                );
                self.rebuild(chunk)?;
                self.cell.adjust_entry_count(incoming as i64)
            }
        }
    }

    /// Replaces the whole tree by one built from its entries plus `extra`.
    fn rebuild(&mut self, extra: Vec<Entry>) -> RTreeResult<()> {
        let mut all = extra;
        if let Some(root) = self.cell.root()? {
            self.take_subtree(root, &mut all)?;
        }
        if all.is_empty() {
            self.cell.set_root(None);
            return Ok(());
        }
        let height = expected_height(all.len(), self.target_loading());
        let root = self.build_subtree(all, height)?;
        self.cell.set_root(Some(root));
        Ok(())
    }

    /// Deletes `top` and everything below it, collecting leaf entries.
    fn take_subtree(&mut self, top: NodeId, out: &mut Vec<Entry>) -> RTreeResult<()> {
        let mut stack = vec![top];
        while let Some(node) = stack.pop() {
            match self.cell.kind(node)? {
                NodeKind::Leaf => out.append(self.cell.entries_mut(node)?),
                NodeKind::Branch => stack.extend(self.cell.children(node)?),
            }
            self.cell.delete_node(node);
        }
        Ok(())
    }

    /// Fill target of bulk-built nodes.
    pub(super) fn target_loading(&self) -> usize {
        let target = (self.m_max as f64 * self.config.loading_factor).round() as usize;
        target.clamp(2, self.m_max.max(2))
    }

    /// Builds a balanced subtree of exactly `height` levels holding
    /// `entries` and returns its top node, which has no parent yet.
    ///
    /// Every level sorts its items by centroid along the longest axis of
    /// their union and cuts them into the fewest even runs whose subtrees
    /// fit the fill target.
    pub(super) fn build_subtree(&mut self, entries: Vec<Entry>, height: usize) -> RTreeResult<NodeId> {
        let target = self.target_loading();
        let height = height.max(1);
        let top = self.cell.create_node(level_kind(height))?;
        let mut created = vec![top];
        let mut work = vec![(top, entries, height)];

        while let Some((node, mut items, level)) = work.pop() {
            if level == 1 {
                if items.len() > self.m_max {
                    return Err(RTreeError::InvariantViolation(format!(
                        "bulk leaf would hold {} entries, more than {}",
                        items.len(),
                        self.m_max
                    )));
                }
                *self.cell.entries_mut(node)? = items;
                continue;
            }

            sort_along_longest_axis(&mut items);
            let capacity = target.saturating_pow((level - 1) as u32);
            let parts = items.len().div_ceil(capacity).max(1);
            if parts > self.m_max {
                return Err(RTreeError::InvariantViolation(format!(
                    "bulk branch would hold {} children, more than {}",
                    parts, self.m_max
                )));
            }

            for run in even_runs(items, parts) {
                let child = self.cell.create_node(level_kind(level - 1))?;
                self.cell.children_mut(node)?.push(child);
                self.cell.set_parent(child, Some(node));
                created.push(child);
                work.push((child, run, level - 1));
            }
        }

        // children were created after their parents
        for &node in created.iter().rev() {
            self.recompute_mbr(node)?;
        }
        Ok(top)
    }

    /// Distributes `entries` under `node`, which sits `level` levels above
    /// the leaves (leaves are level 1). Entries no child contains end up in
    /// `outliers`; nodes that received items are pushed to `pending` for
    /// splitting and bound refresh.
    fn graft(
        &mut self,
        node: NodeId,
        level: usize,
        entries: Vec<Entry>,
        outliers: &mut Vec<Entry>,
        pending: &mut Vec<NodeId>,
    ) -> RTreeResult<()> {
        let target = self.target_loading();
        let small_cluster = self.m_max as f64 * self.config.loading_factor / 2.0;
        let mut work = vec![(node, level, entries)];

        while let Some((node, level, entries)) = work.pop() {
            if level <= 1 || self.cell.kind(node)? == NodeKind::Leaf {
                outliers.extend(entries);
                continue;
            }

            let mut children = Vec::new();
            for child in self.cell.children(node)? {
                children.push((child, self.require_mbr(child)?));
            }
            children.sort_by(|a, b| a.1.volume().total_cmp(&b.1.volume()));

            let mut clusters: Vec<Vec<Entry>> = vec![Vec::new(); children.len()];
            for entry in entries {
                match children.iter().position(|(_, mbr)| mbr.contains(&entry.rect)) {
                    Some(i) => clusters[i].push(entry),
                    None => outliers.push(entry),
                }
            }

            let child_level = level - 1;
            for ((child, _), cluster) in children.into_iter().zip(clusters) {
                if cluster.is_empty() {
                    continue;
                }
                let expected = expected_height(cluster.len(), target);

                if expected < child_level {
                    work.push((child, child_level, cluster));
                } else if expected == child_level {
                    if (cluster.len() as f64) < small_cluster {
                        outliers.extend(cluster);
                    } else {
                        let subtree = self.build_subtree(cluster, child_level)?;
                        self.attach(node, vec![subtree], pending)?;
                    }
                } else if child_level == 1 {
                    self.cell.entries_mut(child)?.extend(cluster);
                    pending.push(child);
                } else {
                    let subtree = self.build_subtree(cluster, expected)?;
                    let pieces = self.detach_level(subtree, expected, child_level - 1)?;
                    self.attach(child, pieces, pending)?;
                }
            }
        }
        Ok(())
    }

    /// Nodes `want` levels above the leaves inside the subtree under `top`.
    /// The levels above them are deleted.
    fn detach_level(&mut self, top: NodeId, height: usize, want: usize) -> RTreeResult<Vec<NodeId>> {
        let mut level_nodes = vec![top];
        let mut level = height;
        while level > want {
            let mut below = Vec::new();
            for node in level_nodes {
                below.extend(self.cell.children(node)?);
                self.cell.delete_node(node);
            }
            level_nodes = below;
            level -= 1;
        }
        Ok(level_nodes)
    }

    /// Hangs `pieces` under `parent`, merging them into overlapping
    /// children first when subtree merging is enabled.
    fn attach(&mut self, parent: NodeId, pieces: Vec<NodeId>, pending: &mut Vec<NodeId>) -> RTreeResult<()> {
        if self.config.merge_subtrees {
            return self.merge_into(parent, pieces, pending);
        }
        for piece in pieces {
            self.cell.children_mut(parent)?.push(piece);
            self.cell.set_parent(piece, Some(parent));
        }
        pending.push(parent);
        Ok(())
    }

    /// Fuses each new subtree with the existing child of `parent` it
    /// overlaps most, best pairs first. Pairs at or under the overlap
    /// threshold are not fused; unpaired subtrees become new children.
    fn merge_into(
        &mut self,
        parent: NodeId,
        incoming: Vec<NodeId>,
        pending: &mut Vec<NodeId>,
    ) -> RTreeResult<()> {
        let threshold = self.config.merge_overlap_threshold;

        let mut incoming_bounds = Vec::with_capacity(incoming.len());
        for &node in &incoming {
            incoming_bounds.push((node, self.require_mbr(node)?));
        }
        let mut pairs = Vec::new();
        for existing in self.cell.children(parent)? {
            let bounds = self.require_mbr(existing)?;
            for (node, node_bounds) in &incoming_bounds {
                let ratio = bounds.overlap_ratio(node_bounds);
                if ratio > threshold {
                    pairs.push((ratio, existing, *node));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut used_existing = HashSet::new();
        let mut merged = HashSet::new();
        for (ratio, existing, node) in pairs {
            if used_existing.contains(&existing) || merged.contains(&node) {
                continue;
            }
            used_existing.insert(existing);
            merged.insert(node);
            debug!(
                "Merging subtree {} into {} with overlap {:.3}",
                node, existing, ratio
            );

            match self.cell.kind(node)? {
                NodeKind::Leaf => {
                    let moved = std::mem::take(self.cell.entries_mut(node)?);
                    self.cell.entries_mut(existing)?.extend(moved);
                    pending.push(existing);
                }
                NodeKind::Branch => {
                    let grandchildren = std::mem::take(self.cell.children_mut(node)?);
                    self.merge_into(existing, grandchildren, pending)?;
                }
            }
            self.cell.delete_node(node);
        }

        for node in incoming {
            if !merged.contains(&node) {
                self.cell.children_mut(parent)?.push(node);
                self.cell.set_parent(node, Some(parent));
            }
        }
        pending.push(parent);
        Ok(())
    }
}

fn level_kind(level: usize) -> NodeKind {
    if level <= 1 {
        NodeKind::Leaf
    } else {
        NodeKind::Branch
    }
}

/// Smallest height whose fully loaded tree holds `count` entries.
pub(crate) fn expected_height(count: usize, target: usize) -> usize {
    let target = target.max(2);
    let mut height = 1;
    let mut capacity = target;
    while capacity < count {
        capacity = capacity.saturating_mul(target);
        height += 1;
    }
    height
}

fn sort_along_longest_axis(entries: &mut [Entry]) {
    let Some(union) = RectNd::union_all(entries.iter().map(|e| &e.rect)) else {
        return;
    };
    let axis = union.longest_axis();
    entries.sort_by(|a, b| a.rect.centroid(axis).total_cmp(&b.rect.centroid(axis)));
}

/// Cuts `items` into `parts` consecutive runs whose lengths differ by at
/// most one.
fn even_runs<T>(mut items: Vec<T>, parts: usize) -> Vec<Vec<T>> {
    let parts = parts.max(1);
    let base = items.len() / parts;
    let extra = items.len() % parts;
    let mut runs = Vec::with_capacity(parts);
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        let rest = items.split_off(size.min(items.len()));
        runs.push(items);
        items = rest;
    }
    runs
}
