use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::tools::{display_relative, has_allowed_extension, is_os_hidden_file};
use crate::task::{DepthQueue, Outcome, Stage, TaskQueue};
use crate::types::SortOrder;

/// Lists one directory per item: matching image files go downstream, subdirectories come back
/// to this stage as pending items. Deeper directories are taken first.
pub struct DiscoverStage {
    input_root: PathBuf,
    extensions: Vec<String>,
    sort_order: SortOrder,
}

impl DiscoverStage {
    pub fn new(
        input_root: impl Into<PathBuf>,
        extensions: Vec<String>,
        sort_order: SortOrder,
    ) -> Self {
        Self {
            input_root: input_root.into(),
            extensions,
            sort_order,
        }
    }

    fn sort(&self, paths: &mut [PathBuf]) {
        paths.sort_by(|a, b| {
            let a = a.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            let b = b.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            self.sort_order.compare(&a, &b)
        });
    }

    /// `(files, subdirectories)`, both sorted. Unreadable directories yield nothing.
    pub fn list(&self, dir: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let shown = display_relative(dir, Some(&self.input_root));
        if !dir.is_dir() {
            warn!("Not a directory: {shown}");
            return (Vec::new(), Vec::new());
        }
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!("Error listing directory {shown}: {e}");
                return (Vec::new(), Vec::new());
            }
        };

        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if is_os_hidden_file(&path) {
                continue;
            }
            if path.is_dir() {
                dirs.push(path);
            } else if path.is_file() && has_allowed_extension(&path, &self.extensions) {
                files.push(path);
            }
        }
        self.sort(&mut files);
        self.sort(&mut dirs);
        (files, dirs)
    }
}

impl Stage for DiscoverStage {
    type Input = PathBuf;
    type Output = PathBuf;

    fn new_queue(&self) -> Box<dyn TaskQueue<PathBuf>> {
        Box::new(DepthQueue::new())
    }

    fn execute(&self, dir: &PathBuf) -> Outcome<PathBuf, PathBuf> {
        let (files, subdirs) = self.list(dir);
        Outcome::with_pending(files, subdirs)
    }
}
