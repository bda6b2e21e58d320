use std::fmt::{Display, Formatter};

use crate::store::NodeId;

/// Identifies an existing index.
///
/// A handle is a plain value: it names the index, the metadata node that
/// anchors it and the fanout the index was created with. Fanout never
/// changes for the life of an index, so a handle stays accurate until the
/// index is dropped. Operations on a handle of a dropped index fail with
/// `IndexNotFound`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexHandle {
    name: String,
    metadata_id: NodeId,
    m_min: usize,
    m_max: usize,
}

impl IndexHandle {
    pub(crate) fn new(name: &str, metadata_id: NodeId, m_min: usize, m_max: usize) -> Self {
        IndexHandle {
            name: name.to_string(),
            metadata_id,
            m_min,
            m_max,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the metadata node in the graph store.
    pub fn metadata_id(&self) -> NodeId {
        self.metadata_id
    }

    /// Minimum fanout.
    pub fn m_min(&self) -> usize {
        self.m_min
    }

    /// Maximum fanout.
    pub fn m_max(&self) -> usize {
        self.m_max
    }
}

impl Display for IndexHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}..{}]", self.name, self.m_min, self.m_max)
    }
}
