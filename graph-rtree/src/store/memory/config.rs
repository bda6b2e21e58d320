use std::path::{Path, PathBuf};

/// Configuration for an in-memory graph store.
///
/// # Purpose
/// Decides whether the committed graph lives only in memory or is also
/// written to a snapshot file after every commit.
///
/// # Usage
/// ```text
/// let config = InMemoryStoreConfig::new().with_file_path("/tmp/index.db");
/// let store = InMemoryGraphStore::open(config)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryStoreConfig {
    file_path: Option<PathBuf>,
}

impl InMemoryStoreConfig {
    /// Creates a configuration for a purely in-memory store.
    pub fn new() -> InMemoryStoreConfig {
        InMemoryStoreConfig::default()
    }

    /// Persists the committed graph to `path` after every commit.
    pub fn with_file_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// The snapshot file, if any.
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }
}
