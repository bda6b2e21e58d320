//! The R-tree itself: geometry, on-store node layout, the mutation engine
//! and the read-only queries.

pub mod define;
pub mod inspect;
pub mod nearest;
pub mod node;
pub mod rect;
pub mod search;
pub mod split;

pub(crate) mod bulk;
pub(crate) mod cache;
pub(crate) mod editor;
pub(crate) mod gc;
pub(crate) mod tx_cell;

pub use inspect::{check_integrity, IntegrityReport, TreeStats};
pub use nearest::{nearest, point_distance, DistanceResult};
pub use node::{Node, NodeKind};
pub use rect::{DataId, Entry, PointNd, RectNd};
pub use search::{intersects, traverse, within};
pub use split::{split, SplitGroups};
