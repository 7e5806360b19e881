use std::path::PathBuf;

use crate::search::ContextWindowSearch;
use crate::task::{Outcome, Stage};
use crate::types::ContextItem;

/// Pairs an image's existing description with those of its temporally nearest neighbours.
/// Images without a description are rejected: there is nothing to enhance.
pub struct ContextStage {
    search: ContextWindowSearch,
}

impl ContextStage {
    pub fn new(search: ContextWindowSearch) -> Self {
        Self { search }
    }
}

impl Stage for ContextStage {
    type Input = PathBuf;
    type Output = ContextItem;

    fn execute(&self, image: &PathBuf) -> Outcome<ContextItem, PathBuf> {
        let Some(original) = self.search.read_description(image) else {
            return Outcome::Rejected;
        };
        let context = self
            .search
            .search(image)
            .into_iter()
            .map(|c| c.description)
            .collect();
        Outcome::one(ContextItem {
            path: image.clone(),
            original,
            context,
        })
    }
}
