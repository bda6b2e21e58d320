//! k-nearest-neighbour search.
//!
//! Best-first branch and bound: nodes wait in a min-queue keyed by the
//! squared MINDIST of their bounds to the query point, and a node is only
//! queued while its bound can still beat the current k-th result. Because
//! the queue is ordered, the search ends at the first node whose bound is
//! already worse than the k-th result.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::node::{read_mbr, Node};
use super::rect::{Entry, PointNd};
use crate::errors::RTreeResult;
use crate::store::{GraphTransaction, NodeId};

/// One k-NN hit.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceResult {
    pub distance: f64,
    pub entry: Entry,
}

/// Queue element. Ordered so that `BinaryHeap` pops the smallest bound.
#[derive(Debug)]
struct Candidate {
    bound: f64,
    node: NodeId,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .bound
            .total_cmp(&self.bound)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Returns up to `k` entries accepted by `filter`, closest first.
///
/// `distance` measures an entry against the query. Pruning compares it,
/// squared, with the squared MINDIST of node bounds, so it must never be
/// smaller than the Euclidean distance from `query` to the entry's rect.
/// [`point_distance`] is the usual choice. Entries at equal distance keep
/// the order in which the search reached them.
pub fn nearest<P, D>(
    tx: &dyn GraphTransaction,
    root: Option<NodeId>,
    query: &PointNd,
    k: usize,
    filter: P,
    distance: D,
) -> RTreeResult<Vec<DistanceResult>>
where
    P: Fn(&Entry) -> bool,
    D: Fn(&Entry) -> f64,
{
    let Some(root) = root else {
        return Ok(Vec::new());
    };
    if k == 0 {
        return Ok(Vec::new());
    }

    let mut queue = BinaryHeap::new();
    queue.push(Candidate {
        bound: 0.0,
        node: root,
    });
    let mut results: Vec<DistanceResult> = Vec::with_capacity(k + 1);

    while let Some(Candidate { bound, node }) = queue.pop() {
        if results.len() == k && bound > kth_squared(&results) {
            break;
        }

        match Node::load(tx, node)? {
            Node::Branch { children, .. } => {
                for child in children {
                    let Some(mbr) = read_mbr(tx, child)? else {
                        continue;
                    };
                    let bound = mbr.min_distance_squared(query);
                    if results.len() < k || bound <= kth_squared(&results) {
                        queue.push(Candidate { bound, node: child });
                    }
                }
            }
            Node::Leaf { entries, .. } => {
                for entry in entries {
                    if !filter(&entry) {
                        continue;
                    }
                    let d = distance(&entry);
                    if results.len() == k && d >= results[k - 1].distance {
                        continue;
                    }
                    let at = results.partition_point(|r| r.distance <= d);
                    results.insert(at, DistanceResult { distance: d, entry });
                    results.truncate(k);
                }
            }
        }
    }
    Ok(results)
}

fn kth_squared(results: &[DistanceResult]) -> f64 {
    results.last().map_or(f64::INFINITY, |r| r.distance * r.distance)
}

/// Euclidean distance from `query` to the closest point of an entry's rect.
pub fn point_distance(query: PointNd) -> impl Fn(&Entry) -> f64 {
    move |entry| entry.rect.min_distance_squared(&query).sqrt()
}
