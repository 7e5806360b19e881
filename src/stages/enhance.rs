use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::backend::SharedModel;
use crate::engine::tools::{display_relative, render_template, truncate_chars};
use crate::task::{Outcome, Stage};
use crate::types::{ContextItem, EnhanceOpts, WriteItem};

/// Text-only inference that rewrites a description using its neighbours' descriptions.
pub struct EnhanceStage {
    model: SharedModel,
    opts: EnhanceOpts,
    input_root: PathBuf,
}

impl EnhanceStage {
    pub fn new(model: SharedModel, opts: EnhanceOpts, input_root: impl Into<PathBuf>) -> Self {
        Self {
            model,
            opts,
            input_root: input_root.into(),
        }
    }

    /// `context_template` around numbered, truncated items; empty when there is no context.
    pub fn context_section(&self, context: &[String]) -> String {
        if context.is_empty() {
            return String::new();
        }
        let items: String = context
            .iter()
            .take(self.opts.max_context_in_prompt)
            .enumerate()
            .map(|(i, desc)| {
                let number = (i + 1).to_string();
                let description = truncate_chars(desc, self.opts.context_item_max_length);
                render_template(
                    &self.opts.context_item_template,
                    &[
                        ("number", number.as_str()),
                        ("description", description.as_str()),
                    ],
                )
            })
            .collect();
        render_template(&self.opts.context_template, &[("items", items.as_str())])
    }

    pub fn render_prompt(&self, item: &ContextItem) -> String {
        let section = self.context_section(&item.context);
        render_template(
            &self.opts.prompt,
            &[
                ("context_section", section.as_str()),
                ("original_description", item.original.as_str()),
            ],
        )
    }

    fn enhance(&self, item: &ContextItem) -> Result<WriteItem> {
        let model = self.model.handle()?;
        let content = self
            .model
            .backend()
            .respond(&model, &self.render_prompt(item), None)
            .with_context(|| {
                format!(
                    "Enhancement failed for {}",
                    display_relative(&item.path, Some(&self.input_root))
                )
            })?;
        Ok(WriteItem::success(item.path.clone(), content, None))
    }
}

impl Stage for EnhanceStage {
    type Input = ContextItem;
    type Output = WriteItem;

    fn load(&self) -> Result<()> {
        self.model.acquire()
    }

    fn unload(&self) {
        self.model.release();
    }

    fn execute(&self, item: &ContextItem) -> Outcome<WriteItem, ContextItem> {
        Outcome::from_result(self.enhance(item))
    }
}
