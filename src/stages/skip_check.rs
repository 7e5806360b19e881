use std::path::{Path, PathBuf};

use crate::engine::tools::ArtifactLayout;
use crate::task::{Outcome, Stage};

/// Rejects images whose artifact already exists, and (unless retrying failures) those whose
/// last attempt left an error artifact. `retry` reprocesses everything.
pub struct SkipCheckStage {
    layout: ArtifactLayout,
    retry: bool,
    retry_failed: bool,
}

impl SkipCheckStage {
    pub fn new(layout: ArtifactLayout, retry: bool, retry_failed: bool) -> Self {
        Self {
            layout,
            retry,
            retry_failed,
        }
    }

    pub fn should_skip(&self, image: &Path) -> bool {
        if self.retry {
            return false;
        }
        self.layout.primary(image).exists()
            || (!self.retry_failed && self.layout.error(image).exists())
    }
}

impl Stage for SkipCheckStage {
    type Input = PathBuf;
    type Output = PathBuf;

    fn execute(&self, image: &PathBuf) -> Outcome<PathBuf, PathBuf> {
        if self.should_skip(image) {
            Outcome::Rejected
        } else {
            Outcome::one(image.clone())
        }
    }
}
