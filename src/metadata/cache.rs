use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use super::{ImageMetadata, MetadataSource};

/// Per-run memo of metadata lookups, shared by all context workers.
/// Built empty at pipeline construction and dropped with the pipeline.
pub struct MetadataCache {
    source: Arc<dyn MetadataSource>,
    entries: RwLock<HashMap<PathBuf, Arc<ImageMetadata>>>,
}

impl MetadataCache {
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self {
            source,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cached metadata for `path`, extracting it on first use. Concurrent first lookups of the
    /// same path may both extract; the first insert wins.
    pub fn get(&self, path: &Path) -> Arc<ImageMetadata> {
        if let Some(hit) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
        {
            return Arc::clone(hit);
        }
        let meta = Arc::new(self.source.get_metadata(path));
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(path.to_path_buf()).or_insert(meta))
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
