//! Node split strategies.
//!
//! Both strategies work on the bounding rectangles of an overflowing node's
//! items and return which item indexes stay in the node and which move to
//! the new sibling.

use itertools::Itertools;
use std::cmp::Ordering;

use super::rect::RectNd;
use crate::config::SplitStrategy;

/// Item indexes of the two halves of a split, each in ascending order of
/// assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitGroups {
    pub first: Vec<usize>,
    pub second: Vec<usize>,
}

/// Splits `rects` with the given strategy.
pub fn split(rects: &[RectNd], m_min: usize, strategy: SplitStrategy) -> SplitGroups {
    match strategy {
        SplitStrategy::Quadratic => quadratic_split(rects, m_min),
        SplitStrategy::Axial => axial_split(rects),
    }
}

/// Guttman's quadratic split.
///
/// The seeds are the pair wasting the most volume when covered together.
/// Every other item, in order, joins the group whose bounds grow least;
/// ties go to the smaller resulting volume, then the smaller resulting
/// perimeter, then the group with fewer members. Once a group needs every
/// remaining item to reach `m_min`, it receives all of them.
pub fn quadratic_split(rects: &[RectNd], m_min: usize) -> SplitGroups {
    let n = rects.len();
    if n < 2 {
        return SplitGroups {
            first: (0..n).collect(),
            second: Vec::new(),
        };
    }

    let (seed_a, seed_b) = pick_seeds(rects);
    let mut first = vec![seed_a];
    let mut second = vec![seed_b];
    let mut first_mbr = rects[seed_a].clone();
    let mut second_mbr = rects[seed_b].clone();

    let rest: Vec<usize> = (0..n).filter(|&i| i != seed_a && i != seed_b).collect();
    for (position, &i) in rest.iter().enumerate() {
        let remaining = rest.len() - position;
        let to_first = if m_min.saturating_sub(first.len()) >= remaining {
            true
        } else if m_min.saturating_sub(second.len()) >= remaining {
            false
        } else {
            prefer_first(&first_mbr, first.len(), &second_mbr, second.len(), &rects[i])
        };

        if to_first {
            first.push(i);
            first_mbr.expand(&rects[i]);
        } else {
            second.push(i);
            second_mbr.expand(&rects[i]);
        }
    }

    SplitGroups { first, second }
}

/// Pair maximising dead space: union volume minus both individual volumes.
fn pick_seeds(rects: &[RectNd]) -> (usize, usize) {
    let mut best = (0, 1);
    let mut best_waste = f64::NEG_INFINITY;
    for (i, j) in (0..rects.len()).tuple_combinations() {
        let waste = rects[i].union(&rects[j]).volume() - rects[i].volume() - rects[j].volume();
        if waste > best_waste {
            best_waste = waste;
            best = (i, j);
        }
    }
    best
}

fn prefer_first(
    first_mbr: &RectNd,
    first_len: usize,
    second_mbr: &RectNd,
    second_len: usize,
    rect: &RectNd,
) -> bool {
    let grown_first = first_mbr.union(rect);
    let grown_second = second_mbr.union(rect);

    let by_increase = (grown_first.volume() - first_mbr.volume())
        .total_cmp(&(grown_second.volume() - second_mbr.volume()));
    let ordering = by_increase
        .then_with(|| grown_first.volume().total_cmp(&grown_second.volume()))
        .then_with(|| grown_first.perimeter().total_cmp(&grown_second.perimeter()))
        .then_with(|| first_len.cmp(&second_len));

    ordering != Ordering::Greater
}

/// Greene's split: sort by centroid along the axis where the union of all
/// items is longest and cut the sorted run in half.
pub fn axial_split(rects: &[RectNd]) -> SplitGroups {
    let Some(union) = RectNd::union_all(rects) else {
        return SplitGroups {
            first: Vec::new(),
            second: Vec::new(),
        };
    };
    let axis = union.longest_axis();

    let mut order: Vec<usize> = (0..rects.len()).collect();
    order.sort_by(|&a, &b| rects[a].centroid(axis).total_cmp(&rects[b].centroid(axis)));

    let second = order.split_off(order.len() / 2);
    SplitGroups {
        first: order,
        second,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> RectNd {
        RectNd::new(vec![min_x, min_y], vec![max_x, max_y]).unwrap()
    }

    fn assert_partition(groups: &SplitGroups, n: usize) {
        let mut all: Vec<usize> = groups.first.iter().chain(&groups.second).copied().collect();
        all.sort();
        assert_eq!(all, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn test_quadratic_separates_clusters() {
        let rects = vec![
            rect(0.0, 0.0, 1.0, 1.0),
            rect(100.0, 100.0, 101.0, 101.0),
            rect(1.0, 1.0, 2.0, 2.0),
            rect(99.0, 99.0, 100.0, 100.0),
            rect(0.5, 0.5, 1.5, 1.5),
        ];
        let groups = quadratic_split(&rects, 2);
        assert_partition(&groups, 5);

        let (low, high) = if groups.first.contains(&0) {
            (&groups.first, &groups.second)
        } else {
            (&groups.second, &groups.first)
        };
        let mut low = low.clone();
        low.sort();
        let mut high = high.clone();
        high.sort();
        assert_eq!(low, vec![0, 2, 4]);
        assert_eq!(high, vec![1, 3]);
    }

    #[test]
    fn test_quadratic_honours_min_fill() {
        // one far outlier would otherwise end up alone
        let mut rects: Vec<RectNd> = (0..4)
            .map(|i| rect(i as f64, 0.0, i as f64 + 0.5, 0.5))
            .collect();
        rects.push(rect(1000.0, 1000.0, 1001.0, 1001.0));

        let groups = quadratic_split(&rects, 2);
        assert_partition(&groups, 5);
        assert!(groups.first.len() >= 2);
        assert!(groups.second.len() >= 2);
    }

    #[test]
    fn test_quadratic_tie_prefers_smaller_group() {
        // identical rects: every comparison ties down to member counts
        let rects = vec![rect(0.0, 0.0, 1.0, 1.0); 6];
        let groups = quadratic_split(&rects, 1);
        assert_partition(&groups, 6);
        assert_eq!(groups.first.len(), 3);
        assert_eq!(groups.second.len(), 3);
    }

    #[test]
    fn test_axial_splits_along_longest_axis() {
        let rects = vec![
            rect(0.0, 9.0, 1.0, 10.0),
            rect(0.0, 0.0, 1.0, 1.0),
            rect(0.0, 6.0, 1.0, 7.0),
            rect(0.0, 3.0, 1.0, 4.0),
        ];
        let groups = axial_split(&rects);
        assert_eq!(groups.first, vec![1, 3]);
        assert_eq!(groups.second, vec![2, 0]);
    }

    #[test]
    fn test_axial_odd_count() {
        let rects: Vec<RectNd> = (0..5)
            .map(|i| rect(i as f64, 0.0, i as f64 + 1.0, 1.0))
            .collect();
        let groups = axial_split(&rects);
        assert_eq!(groups.first.len(), 2);
        assert_eq!(groups.second.len(), 3);
        assert_partition(&groups, 5);
    }

    #[test]
    fn test_split_dispatch_and_degenerate_input() {
        let one = vec![rect(0.0, 0.0, 1.0, 1.0)];
        let groups = split(&one, 1, SplitStrategy::Quadratic);
        assert_eq!(groups.first, vec![0]);
        assert!(groups.second.is_empty());

        let none: Vec<RectNd> = Vec::new();
        assert!(split(&none, 1, SplitStrategy::Axial).first.is_empty());
    }
}
