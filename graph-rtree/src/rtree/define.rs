//! Names of the labels, edge types and properties the tree is stored with.

/// Label of the node that names an index and anchors its root.
pub const LABEL_METADATA: &str = "RTreeMetadata";
pub const LABEL_BRANCH: &str = "RTreeBranch";
pub const LABEL_LEAF: &str = "RTreeLeaf";

/// Metadata node to the current root. At most one per index.
pub const EDGE_METADATA_TO_ROOT: &str = "RTREE_METADATA_TO_ROOT";
/// Branch to each of its children.
pub const EDGE_PARENT_TO_CHILD: &str = "RTREE_PARENT_TO_CHILD";

// metadata
pub const PROP_NAME: &str = "name";
pub const PROP_M_MIN: &str = "m_min";
pub const PROP_M_MAX: &str = "m_max";
pub const PROP_ENTRY_COUNT: &str = "entry_count";
/// Number of axes every rect of the index has. Fixed by the first insert.
pub const PROP_DIMENSION: &str = "dimension";

// every tree node
pub const PROP_SIZE: &str = "size";
pub const PROP_MBR_MIN: &str = "mbr_min";
pub const PROP_MBR_MAX: &str = "mbr_max";

pub fn entry_min_key(slot: usize) -> String {
    format!("entry_min:{}", slot)
}

pub fn entry_max_key(slot: usize) -> String {
    format!("entry_max:{}", slot)
}

pub fn entry_data_key(slot: usize) -> String {
    format!("entry_data:{}", slot)
}
