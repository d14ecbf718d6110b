//! Embedded resource table.
//!
//! A read-only mapping from virtual path to bytes, supplied by the embedding
//! layer at engine construction (typically from `include_bytes!` or a
//! packaging step). Scripts address entries through the `EMBED/` prefix; the
//! module resolver treats them as its highest-priority, immutable source.

use indexmap::IndexMap;

/// Immutable virtual-path → bytes table.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedResources {
    entries: IndexMap<String, Vec<u8>>,
}

impl EmbeddedResources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one resource under `path` (without the `EMBED/` prefix).
    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(path.into(), bytes.into());
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries.get(path).map(Vec::as_slice)
    }

    /// UTF-8 view of a resource, for script sources.
    #[must_use]
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }
}
