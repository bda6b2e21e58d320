//! Mutation engine: insertion, removal and update of leaf entries.
//!
//! Every edit goes through a [`TxCell`], so the engine works on cached
//! nodes addressed by id and never touches the store directly. Parents are
//! found through the cell, which knows pending relinks before they reach
//! the store.

use log::debug;

use super::node::NodeKind;
use super::rect::{Entry, RectNd};
use super::split::{split, SplitGroups};
use super::tx_cell::TxCell;
use crate::config::{MissingEntryPolicy, RTreeConfig};
use crate::errors::{RTreeError, RTreeResult};
use crate::store::NodeId;

pub(crate) struct Editor<'a> {
    pub(super) cell: &'a mut TxCell,
    pub(super) m_min: usize,
    pub(super) m_max: usize,
    pub(super) config: &'a RTreeConfig,
}

impl<'a> Editor<'a> {
    pub(crate) fn new(
        cell: &'a mut TxCell,
        m_min: usize,
        m_max: usize,
        config: &'a RTreeConfig,
    ) -> Self {
        Editor {
            cell,
            m_min,
            m_max,
            config,
        }
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    pub(crate) fn add(&mut self, entry: Entry) -> RTreeResult<()> {
        self.admit(&entry.rect)?;
        let rect = entry.rect.clone();
        let leaf = self.choose_leaf(&rect)?;
        self.cell.entries_mut(leaf)?.push(entry);
        self.cell.adjust_entry_count(1)?;

        if self.cell.len(leaf)? > self.m_max {
            self.split_overflowing(vec![leaf])?;
            if self.cell.len(leaf)? > self.m_max {
                return Err(RTreeError::InvariantViolation(format!(
                    "leaf {} still holds more than {} entries after splitting",
                    leaf, self.m_max
                )));
            }
            Ok(())
        } else {
            self.enlarge_upward(leaf, &rect)
        }
    }

    /// Fails with `InvalidRect` unless `rect` has the dimension of the
    /// index. The first rect ever inserted fixes that dimension.
    pub(super) fn admit(&mut self, rect: &RectNd) -> RTreeResult<()> {
        match self.cell.dimension()? {
            Some(dimension) => rect.require_dimension(dimension),
            None => self.cell.set_dimension(rect.dimension()),
        }
    }

    /// Like [`admit`](Self::admit) but never fixes the dimension; for
    /// rects that only locate entries.
    fn check_query(&mut self, rect: &RectNd) -> RTreeResult<()> {
        match self.cell.dimension()? {
            Some(dimension) => rect.require_dimension(dimension),
            None => Ok(()),
        }
    }

    fn choose_leaf(&mut self, rect: &RectNd) -> RTreeResult<NodeId> {
        let mut node = match self.cell.root()? {
            Some(root) => root,
            None => {
                let leaf = self.cell.create_node(NodeKind::Leaf)?;
                self.cell.set_root(Some(leaf));
                return Ok(leaf);
            }
        };
        while self.cell.kind(node)? == NodeKind::Branch {
            node = self.choose_subtree(node, rect)?;
        }
        Ok(node)
    }

    /// Picks the child of `node` that should receive `rect`.
    ///
    /// A single child already containing the rect wins outright; among
    /// several the smallest one wins. Otherwise the child needing the least
    /// enlargement is chosen, ties going to the smaller resulting perimeter.
    pub(super) fn choose_subtree(&mut self, node: NodeId, rect: &RectNd) -> RTreeResult<NodeId> {
        let mut candidates = Vec::new();
        for child in self.cell.children(node)? {
            candidates.push((child, self.require_mbr(child)?));
        }

        let containing: Vec<&(NodeId, RectNd)> = candidates
            .iter()
            .filter(|(_, mbr)| mbr.contains(rect))
            .collect();

        let chosen = if containing.len() == 1 {
            Some(containing[0].0)
        } else if containing.len() > 1 {
            containing
                .iter()
                .min_by(|a, b| a.1.volume().total_cmp(&b.1.volume()))
                .map(|c| c.0)
        } else {
            candidates
                .iter()
                .min_by(|a, b| {
                    a.1.enlargement(rect)
                        .total_cmp(&b.1.enlargement(rect))
                        .then_with(|| {
                            a.1.union(rect)
                                .perimeter()
                                .total_cmp(&b.1.union(rect).perimeter())
                        })
                })
                .map(|c| c.0)
        };

        chosen.ok_or_else(|| {
            RTreeError::InvariantViolation(format!("branch {} has no children", node))
        })
    }

    /// Grows bounds from `node` upward until an ancestor already covers `rect`.
    fn enlarge_upward(&mut self, node: NodeId, rect: &RectNd) -> RTreeResult<()> {
        let mut current = node;
        loop {
            let mbr = self.cell.mbr(current)?;
            let grown = match &mbr {
                Some(mbr) => mbr.union(rect),
                None => rect.clone(),
            };
            if mbr.as_ref() == Some(&grown) {
                return Ok(());
            }
            self.cell.set_mbr(current, Some(grown))?;
            match self.cell.parent_of(current)? {
                Some(parent) => current = parent,
                None => return Ok(()),
            }
        }
    }

    // ========================================================================
    // Splitting
    // ========================================================================

    /// Splits every overflowing node reachable through `work`, pushing each
    /// new sibling into the parent and splitting upward as long as parents
    /// overflow. A root split grows a new root. Bounds of every node left
    /// behind are refreshed up to the root.
    pub(super) fn split_overflowing(&mut self, mut work: Vec<NodeId>) -> RTreeResult<()> {
        let mut settled = Vec::new();

        while let Some(node) = work.pop() {
            if self.cell.is_deleted(node) {
                continue;
            }
            if self.cell.len(node)? <= self.m_max {
                settled.push(node);
                continue;
            }

            let sibling = self.split_node(node)?;
            let parent = match self.cell.parent_of(node)? {
                Some(parent) => parent,
                None => {
                    let root = self.cell.create_node(NodeKind::Branch)?;
                    self.cell.children_mut(root)?.push(node);
                    self.cell.set_parent(node, Some(root));
                    self.cell.set_root(Some(root));
                    debug!("Root {} split, new root {}", node, root);
                    root
                }
            };
            self.cell.children_mut(parent)?.push(sibling);
            self.cell.set_parent(sibling, Some(parent));

            work.push(parent);
            work.push(sibling);
            work.push(node);
        }

        for node in settled {
            if !self.cell.is_deleted(node) {
                self.refresh_upward(node)?;
            }
        }
        Ok(())
    }

    /// Divides the items of `node` between itself and a new sibling, which
    /// is returned. The sibling is not linked to any parent yet.
    fn split_node(&mut self, node: NodeId) -> RTreeResult<NodeId> {
        let kind = self.cell.kind(node)?;
        let sibling = self.cell.create_node(kind)?;

        match kind {
            NodeKind::Leaf => {
                let entries = std::mem::take(self.cell.entries_mut(node)?);
                let rects: Vec<RectNd> = entries.iter().map(|e| e.rect.clone()).collect();
                let groups = split(&rects, self.m_min, self.config.split_strategy);
                self.check_groups(node, rects.len(), &groups)?;

                let (first, second) = partition(entries, &groups);
                *self.cell.entries_mut(node)? = first;
                *self.cell.entries_mut(sibling)? = second;
            }
            NodeKind::Branch => {
                let children = std::mem::take(self.cell.children_mut(node)?);
                let mut rects = Vec::with_capacity(children.len());
                for &child in &children {
                    rects.push(self.require_mbr(child)?);
                }
                let groups = split(&rects, self.m_min, self.config.split_strategy);
                self.check_groups(node, rects.len(), &groups)?;

                let (first, second) = partition(children, &groups);
                for &child in &second {
                    self.cell.set_parent(child, Some(sibling));
                }
                *self.cell.children_mut(node)? = first;
                *self.cell.children_mut(sibling)? = second;
            }
        }

        self.recompute_mbr(node)?;
        self.recompute_mbr(sibling)?;
        debug!("Split {:?} node {} into {} and {}", kind, node, node, sibling);
        Ok(sibling)
    }

    fn check_groups(&self, node: NodeId, count: usize, groups: &SplitGroups) -> RTreeResult<()> {
        if groups.first.is_empty()
            || groups.second.is_empty()
            || groups.first.len() + groups.second.len() != count
        {
            return Err(RTreeError::InvariantViolation(format!(
                "split of node {} with {} items produced groups of {} and {}",
                node,
                count,
                groups.first.len(),
                groups.second.len()
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Removal and update
    // ========================================================================

    /// Removes every entry whose payload equals `target`'s, searching only
    /// subtrees whose bounds intersect `target.rect`. Returns how many
    /// entries were removed.
    pub(crate) fn remove(&mut self, target: &Entry) -> RTreeResult<usize> {
        self.check_query(&target.rect)?;
        let mut removed = 0;
        while let Some(leaf) = self.find_leaf(target)? {
            let entries = self.cell.entries_mut(leaf)?;
            let before = entries.len();
            entries.retain(|e| e != target);
            removed += before - entries.len();
            self.condense(leaf)?;
        }

        if removed == 0 {
            self.missing(target)?;
            return Ok(0);
        }
        self.cell.adjust_entry_count(-(removed as i64))?;
        Ok(removed)
    }

    /// Replaces the rect of the entry matching `old` by `new.rect` in place
    /// and refreshes the bounds above it. The entry keeps its payload;
    /// `new.data` is ignored.
    pub(crate) fn update(&mut self, old: &Entry, new: Entry) -> RTreeResult<bool> {
        self.check_query(&old.rect)?;
        self.check_query(&new.rect)?;
        let Some(leaf) = self.find_leaf(old)? else {
            self.missing(old)?;
            return Ok(false);
        };

        if let Some(slot) = self
            .cell
            .entries_mut(leaf)?
            .iter_mut()
            .find(|e| **e == *old)
        {
            slot.rect = new.rect;
        }
        self.refresh_upward(leaf)?;
        Ok(true)
    }

    fn missing(&self, entry: &Entry) -> RTreeResult<()> {
        match self.config.missing_entry_policy {
            MissingEntryPolicy::Fail => Err(RTreeError::EntryNotFound(entry.data.clone())),
            MissingEntryPolicy::Ignore => {
                debug!("No entry with payload {} to remove or update", entry.data);
                Ok(())
            }
        }
    }

    /// First leaf, in depth-first order, holding an entry equal to `target`.
    fn find_leaf(&mut self, target: &Entry) -> RTreeResult<Option<NodeId>> {
        let Some(root) = self.cell.root()? else {
            return Ok(None);
        };

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match self.cell.mbr(node)? {
                Some(mbr) if mbr.intersects(&target.rect) => {}
                _ => continue,
            }
            match self.cell.kind(node)? {
                NodeKind::Branch => stack.extend(self.cell.children(node)?),
                NodeKind::Leaf => {
                    if self.cell.entries(node)?.iter().any(|e| e == target) {
                        return Ok(Some(node));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Deletes `leaf` if it became empty, along with every ancestor left
    /// empty by that, then tightens the bounds of what remains.
    fn condense(&mut self, leaf: NodeId) -> RTreeResult<()> {
        let mut node = leaf;
        loop {
            if self.cell.len(node)? > 0 {
                self.refresh_upward(node)?;
                break;
            }

            let parent = self.cell.parent_of(node)?;
            self.cell.delete_node(node);
            match parent {
                Some(parent) => {
                    self.cell.children_mut(parent)?.retain(|&c| c != node);
                    node = parent;
                }
                None => {
                    self.cell.set_root(None);
                    break;
                }
            }
        }
        self.collapse_root()
    }

    /// Replaces a root branch that has a single child by that child.
    fn collapse_root(&mut self) -> RTreeResult<()> {
        while let Some(root) = self.cell.root()? {
            if self.cell.kind(root)? != NodeKind::Branch {
                break;
            }
            let children = self.cell.children(root)?;
            if children.len() != 1 {
                break;
            }
            let child = children[0];
            self.cell.delete_node(root);
            self.cell.set_root(Some(child));
            debug!("Collapsed root {} into its only child {}", root, child);
        }
        Ok(())
    }

    // ========================================================================
    // Bounds
    // ========================================================================

    pub(super) fn require_mbr(&mut self, node: NodeId) -> RTreeResult<RectNd> {
        self.cell.mbr(node)?.ok_or_else(|| {
            RTreeError::InvariantViolation(format!("node {} has no bounds", node))
        })
    }

    fn item_rects(&mut self, node: NodeId) -> RTreeResult<Vec<RectNd>> {
        match self.cell.kind(node)? {
            NodeKind::Leaf => Ok(self
                .cell
                .entries(node)?
                .into_iter()
                .map(|e| e.rect)
                .collect()),
            NodeKind::Branch => {
                let children = self.cell.children(node)?;
                let mut rects = Vec::with_capacity(children.len());
                for child in children {
                    rects.push(self.require_mbr(child)?);
                }
                Ok(rects)
            }
        }
    }

    /// Sets the bounds of `node` to the exact union of its items. Returns
    /// whether they changed.
    pub(super) fn recompute_mbr(&mut self, node: NodeId) -> RTreeResult<bool> {
        let rects = self.item_rects(node)?;
        let mbr = RectNd::union_all(&rects);
        if self.cell.mbr(node)? == mbr {
            return Ok(false);
        }
        self.cell.set_mbr(node, mbr)?;
        Ok(true)
    }

    /// Recomputes bounds from `node` upward for as long as they change.
    pub(super) fn refresh_upward(&mut self, node: NodeId) -> RTreeResult<()> {
        let mut current = node;
        while self.recompute_mbr(current)? {
            match self.cell.parent_of(current)? {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(())
    }

    /// Number of levels, counting the leaves as one. Zero for an empty tree.
    pub(crate) fn height(&mut self) -> RTreeResult<usize> {
        let mut height = 0;
        let mut node = self.cell.root()?;
        while let Some(id) = node {
            height += 1;
            node = match self.cell.kind(id)? {
                NodeKind::Leaf => None,
                NodeKind::Branch => self.cell.children(id)?.first().copied(),
            };
        }
        Ok(height)
    }
}

/// Moves items into the two split groups, preserving group order.
fn partition<T>(items: Vec<T>, groups: &SplitGroups) -> (Vec<T>, Vec<T>) {
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let first = groups
        .first
        .iter()
        .filter_map(|&i| slots.get_mut(i).and_then(Option::take))
        .collect();
    let second = groups
        .second
        .iter()
        .filter_map(|&i| slots.get_mut(i).and_then(Option::take))
        .collect();
    (first, second)
}
