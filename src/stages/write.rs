use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::tools::{ArtifactLayout, format_datetime, render_template};
use crate::task::{Outcome, Stage};
use crate::types::WriteItem;

/// Persists content to the primary artifact (clearing any stale error artifact), or an
/// upstream failure message to the error artifact. Outputs the path written.
pub struct WriteStage {
    layout: ArtifactLayout,
    output_format: String,
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

impl WriteStage {
    pub fn new(layout: ArtifactLayout, output_format: impl Into<String>) -> Self {
        Self {
            layout,
            output_format: output_format.into(),
        }
    }

    /// `output_format` with `{datetime}`, `{location}`, `{content}` and `{filename}` filled in.
    pub fn render(&self, item: &WriteItem, content: &str) -> String {
        let meta = item.metadata.as_ref();
        let datetime = meta
            .and_then(|m| m.datetime.as_ref())
            .map(format_datetime)
            .unwrap_or_else(|| "Unknown".to_string());
        let location = meta
            .and_then(|m| m.location_str())
            .unwrap_or_else(|| "Unknown".to_string());
        let filename = meta.map(|m| m.filename.as_str()).unwrap_or_default();
        render_template(
            &self.output_format,
            &[
                ("datetime", datetime.as_str()),
                ("location", location.as_str()),
                ("content", content),
                ("filename", filename),
            ],
        )
    }

    fn write(&self, item: &WriteItem) -> Result<PathBuf> {
        match &item.content {
            Ok(content) => {
                let out = self.layout.primary(&item.path);
                write_file(&out, &self.render(item, content))?;
                let stale = self.layout.error(&item.path);
                if stale.exists()
                    && let Err(e) = fs::remove_file(&stale)
                {
                    debug!("could not remove {}: {}", stale.display(), e);
                }
                Ok(out)
            }
            Err(message) => {
                let out = self.layout.error(&item.path);
                write_file(&out, &format!("{message}\n"))?;
                Ok(out)
            }
        }
    }
}

impl Stage for WriteStage {
    type Input = WriteItem;
    type Output = PathBuf;

    fn execute(&self, item: &WriteItem) -> Outcome<PathBuf, WriteItem> {
        Outcome::from_result(self.write(item))
    }
}
