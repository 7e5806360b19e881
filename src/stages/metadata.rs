use std::path::PathBuf;
use std::sync::Arc;

use crate::metadata::MetadataSource;
use crate::task::{Outcome, Stage};
use crate::types::MetadataItem;

pub struct MetadataStage {
    source: Arc<dyn MetadataSource>,
}

impl MetadataStage {
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self { source }
    }
}

impl Stage for MetadataStage {
    type Input = PathBuf;
    type Output = MetadataItem;

    fn execute(&self, image: &PathBuf) -> Outcome<MetadataItem, PathBuf> {
        Outcome::one(MetadataItem {
            path: image.clone(),
            metadata: self.source.get_metadata(image),
        })
    }
}
