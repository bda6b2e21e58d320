//! Tunables for the tree engine and writer sessions.

use crate::errors::{RTreeError, RTreeResult};

/// Default number of caller-visible edits after which a session auto-commits.
pub const DEFAULT_COMMIT_BATCH_SIZE: usize = 1000;

/// Default bulk loader fill target relative to `m_max`.
pub const DEFAULT_LOADING_FACTOR: f64 = 0.7;

/// A bulk batch larger than this fraction of the existing tree triggers a rebuild.
pub const DEFAULT_BULK_REBUILD_RATIO: f64 = 0.4;

/// Bulk batches are processed in chunks of at most this many entries.
pub const DEFAULT_MAX_BULK_CHUNK: usize = 1024;

/// Minimum normalised overlap for two subtrees to be merged during bulk grafting.
pub const DEFAULT_MERGE_OVERLAP_THRESHOLD: f64 = 0.1;

/// Strategy used to divide an overflowing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitStrategy {
    /// Seeds by dead space, greedy assignment by cost increase.
    #[default]
    Quadratic,
    /// Greene's split: sort by centroid along the longest axis, cut at the midpoint.
    Axial,
}

/// What remove/update do when the target payload is not in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingEntryPolicy {
    /// Report [`RTreeError::EntryNotFound`].
    Fail,
    /// Treat the call as a no-op.
    #[default]
    Ignore,
}

/// Engine configuration shared by every index of a manager.
#[derive(Debug, Clone, PartialEq)]
pub struct RTreeConfig {
    pub split_strategy: SplitStrategy,
    pub missing_entry_policy: MissingEntryPolicy,
    pub commit_batch_size: usize,
    pub loading_factor: f64,
    pub bulk_rebuild_ratio: f64,
    pub max_bulk_chunk: usize,
    pub merge_subtrees: bool,
    pub merge_overlap_threshold: f64,
}

impl Default for RTreeConfig {
    fn default() -> Self {
        RTreeConfig {
            split_strategy: SplitStrategy::default(),
            missing_entry_policy: MissingEntryPolicy::default(),
            commit_batch_size: DEFAULT_COMMIT_BATCH_SIZE,
            loading_factor: DEFAULT_LOADING_FACTOR,
            bulk_rebuild_ratio: DEFAULT_BULK_REBUILD_RATIO,
            max_bulk_chunk: DEFAULT_MAX_BULK_CHUNK,
            merge_subtrees: false,
            merge_overlap_threshold: DEFAULT_MERGE_OVERLAP_THRESHOLD,
        }
    }
}

impl RTreeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_split_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.split_strategy = strategy;
        self
    }

    pub fn with_missing_entry_policy(mut self, policy: MissingEntryPolicy) -> Self {
        self.missing_entry_policy = policy;
        self
    }

    pub fn with_commit_batch_size(mut self, size: usize) -> Self {
        self.commit_batch_size = size;
        self
    }

    pub fn with_loading_factor(mut self, factor: f64) -> Self {
        self.loading_factor = factor;
        self
    }

    pub fn with_bulk_rebuild_ratio(mut self, ratio: f64) -> Self {
        self.bulk_rebuild_ratio = ratio;
        self
    }

    pub fn with_max_bulk_chunk(mut self, chunk: usize) -> Self {
        self.max_bulk_chunk = chunk;
        self
    }

    pub fn with_merge_subtrees(mut self, enabled: bool) -> Self {
        self.merge_subtrees = enabled;
        self
    }

    pub fn with_merge_overlap_threshold(mut self, threshold: f64) -> Self {
        self.merge_overlap_threshold = threshold;
        self
    }

    /// Checks that every tunable is usable.
    pub fn validate(&self) -> RTreeResult<()> {
        if self.commit_batch_size == 0 {
            return Err(RTreeError::InvalidConfig(
                "commit batch size must be positive".to_string(),
            ));
        }
        if !(self.loading_factor > 0.0 && self.loading_factor <= 1.0) {
            return Err(RTreeError::InvalidConfig(format!(
                "loading factor {} must be in (0, 1]",
                self.loading_factor
            )));
        }
        if !(self.bulk_rebuild_ratio >= 0.0) {
            return Err(RTreeError::InvalidConfig(format!(
                "bulk rebuild ratio {} must not be negative",
                self.bulk_rebuild_ratio
            )));
        }
        if self.max_bulk_chunk == 0 {
            return Err(RTreeError::InvalidConfig(
                "bulk chunk size must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.merge_overlap_threshold) {
            return Err(RTreeError::InvalidConfig(format!(
                "merge overlap threshold {} must be in [0, 1]",
                self.merge_overlap_threshold
            )));
        }
        Ok(())
    }
}

/// Validates the fanout bounds of a new index.
///
/// `2 * m_min <= m_max + 1` guarantees that both halves of a node holding
/// `m_max + 1` items can reach `m_min`.
pub fn validate_fanout(m_min: usize, m_max: usize) -> RTreeResult<()> {
    if m_min < 1 || m_max < 2 {
        return Err(RTreeError::InvalidConfig(format!(
            "fanout ({}, {}) requires m_min >= 1 and m_max >= 2",
            m_min, m_max
        )));
    }
    if 2 * m_min > m_max + 1 {
        return Err(RTreeError::InvalidConfig(format!(
            "fanout ({}, {}) requires 2 * m_min <= m_max + 1",
            m_min, m_max
        )));
    }
    Ok(())
}
