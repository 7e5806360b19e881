//! Nearest already-described neighbours of an image, found by scanning outward from its
//! directory in path order and ranked by capture-time distance.

use log::debug;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::temporal::TemporalDistance;
use crate::engine::tools::{ArtifactLayout, has_allowed_extension};
use crate::metadata::MetadataCache;
use crate::utils::config::ContextDefaults;

/// A neighbour chosen for context.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextCandidate {
    pub path: PathBuf,
    pub distance: TemporalDistance,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    /// Paths ordered before the target; the frontier expands from its largest entry.
    Before,
    /// Paths ordered after the target; the frontier expands from its smallest entry.
    After,
}

pub struct ContextWindowSearch {
    root: PathBuf,
    /// Where neighbour descriptions are read from.
    layout: ArtifactLayout,
    extensions: Vec<String>,
    max_items: usize,
    slack: usize,
    cache: Arc<MetadataCache>,
}

impl ContextWindowSearch {
    pub fn new(
        root: impl Into<PathBuf>,
        layout: ArtifactLayout,
        extensions: Vec<String>,
        max_items: usize,
        cache: Arc<MetadataCache>,
    ) -> Self {
        Self {
            root: root.into(),
            layout,
            extensions,
            max_items,
            slack: ContextDefaults::SEARCH_SLACK_FACTOR,
            cache,
        }
    }

    /// Per-direction stop threshold is `max_items * slack`.
    pub fn with_slack(mut self, slack: usize) -> Self {
        self.slack = slack.max(1);
        self
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Trimmed, non-empty artifact text for `image`, if one exists.
    pub fn read_description(&self, image: &Path) -> Option<String> {
        let text = fs::read_to_string(self.layout.primary(image)).ok()?;
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    /// Image files near `target` on both sides, without the target itself.
    pub fn nearby(&self, target: &Path) -> Vec<PathBuf> {
        let mut found = self.scan(target, Direction::Before);
        found.extend(self.scan(target, Direction::After));
        found.retain(|p| p != target);
        found
    }

    fn scan(&self, target: &Path, direction: Direction) -> Vec<PathBuf> {
        let limit = self.max_items.saturating_mul(self.slack);
        let mut found = Vec::new();
        let Some(start) = target.parent() else {
            return found;
        };
        let mut frontier = BTreeSet::from([start.to_path_buf()]);
        let mut seen = HashSet::from([start.to_path_buf()]);

        while found.len() < limit {
            let next = match direction {
                Direction::Before => frontier.pop_last(),
                Direction::After => frontier.pop_first(),
            };
            let Some(dir) = next else { break };

            match fs::read_dir(&dir) {
                Ok(entries) => {
                    for entry in entries.flatten() {
                        let path = entry.path();
                        let past_target = match direction {
                            Direction::Before => path.as_path() < target,
                            Direction::After => path.as_path() > target,
                        };
                        if !past_target {
                            continue;
                        }
                        if path.is_dir() {
                            if seen.insert(path.clone()) {
                                frontier.insert(path);
                            }
                        } else if has_allowed_extension(&path, &self.extensions) {
                            found.push(path);
                        }
                    }
                }
                Err(e) => debug!("context: cannot list {}: {}", dir.display(), e),
            }

            if let Some(parent) = dir.parent()
                && parent.starts_with(&self.root)
                && seen.insert(parent.to_path_buf())
            {
                frontier.insert(parent.to_path_buf());
            }
        }
        found
    }

    /// Up to `max_items` described neighbours, closest worst-case capture-time distance first.
    /// Neighbours without a description or a capture time are skipped, as is everything when the
    /// target itself has no capture time.
    pub fn search(&self, target: &Path) -> Vec<ContextCandidate> {
        let Some(target_range) = self.cache.get(target).time_range() else {
            debug!("context: no capture time for {}", target.display());
            return Vec::new();
        };

        let mut scored: Vec<(TemporalDistance, PathBuf)> = self
            .nearby(target)
            .into_iter()
            .filter_map(|path| {
                let range = self.cache.get(&path).time_range()?;
                Some((target_range.distance(&range), path))
            })
            .collect();
        scored.sort_by_key(|(d, _)| d.max_secs);

        scored
            .into_iter()
            .filter_map(|(distance, path)| {
                let description = self.read_description(&path)?;
                Some(ContextCandidate {
                    path,
                    distance,
                    description,
                })
            })
            .take(self.max_items)
            .collect()
    }
}
