use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::backend::SharedModel;
use crate::engine::tools::{display_relative, format_datetime, render_template};
use crate::task::{Outcome, Stage};
use crate::types::{MetadataItem, WriteItem};

/// Vision inference: one description per image, prompted with its metadata.
pub struct DescribeStage {
    model: SharedModel,
    prompt: String,
    input_root: PathBuf,
}

impl DescribeStage {
    pub fn new(model: SharedModel, prompt: impl Into<String>, input_root: impl Into<PathBuf>) -> Self {
        Self {
            model,
            prompt: prompt.into(),
            input_root: input_root.into(),
        }
    }

    /// Prompt with `{datetime}`, `{location}`, `{camera}` and `{filename}` filled in (empty when unknown).
    pub fn render_prompt(&self, item: &MetadataItem) -> String {
        let meta = &item.metadata;
        let datetime = meta.datetime.as_ref().map(format_datetime).unwrap_or_default();
        let location = meta.location_str().unwrap_or_default();
        let camera = meta.camera.clone().unwrap_or_default();
        render_template(
            &self.prompt,
            &[
                ("datetime", datetime.as_str()),
                ("location", location.as_str()),
                ("camera", camera.as_str()),
                ("filename", meta.filename.as_str()),
            ],
        )
    }

    fn describe(&self, item: &MetadataItem) -> Result<WriteItem> {
        let model = self.model.handle()?;
        let backend = self.model.backend();
        let image = backend.prepare_image(&item.path)?;
        let content = backend
            .respond(&model, &self.render_prompt(item), Some(&image))
            .with_context(|| {
                format!(
                    "Failed LLM {}",
                    display_relative(&item.path, Some(&self.input_root))
                )
            })?;
        Ok(WriteItem::success(
            item.path.clone(),
            content,
            Some(item.metadata.clone()),
        ))
    }
}

impl Stage for DescribeStage {
    type Input = MetadataItem;
    type Output = WriteItem;

    fn load(&self) -> Result<()> {
        self.model.acquire()
    }

    fn unload(&self) {
        self.model.release();
    }

    fn execute(&self, item: &MetadataItem) -> Outcome<WriteItem, MetadataItem> {
        Outcome::from_result(self.describe(item))
    }
}
