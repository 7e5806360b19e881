//! LM Studio (or any OpenAI-compatible server) over HTTP.

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, warn};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;

use super::{ImageHandle, InferenceBackend, ModelHandle};
use crate::utils::config::BackendTimeouts;

pub struct LmStudioBackend {
    base_url: String,
    agent: ureq::Agent,
}

impl LmStudioBackend {
    /// `base_url` like `http://localhost:1234`; a trailing `/` or `/v1` is tolerated.
    pub fn new(base_url: &str) -> Self {
        let trimmed = base_url.trim_end_matches('/');
        let base_url = trimmed.strip_suffix("/v1").unwrap_or(trimmed).to_string();
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(BackendTimeouts::CONNECT)
            .timeout_read(BackendTimeouts::RESPONSE)
            .build();
        Self { base_url, agent }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    /// LM Studio's native REST API, which can load and unload model instances.
    fn rest_url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    fn post_rest(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.rest_url(path);
        self.agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(body)
            .map_err(describe_http_error)
            .with_context(|| format!("POST {url}"))?
            .into_json()
            .with_context(|| format!("Failed to parse {path} response"))
    }

    /// Load a fresh instance of `name` with a `context_length`-token window. Returns the
    /// instance id to address it by.
    pub fn load_with_context(&self, name: &str, context_length: usize) -> Result<String> {
        let json = self.post_rest(
            "models/load",
            &json!({ "model": name, "context_length": context_length }),
        )?;
        Ok(json["instance_id"].as_str().unwrap_or(name).to_string())
    }

    pub fn unload(&self, instance_id: &str) -> Result<()> {
        self.post_rest("models/unload", &json!({ "instance_id": instance_id }))?;
        Ok(())
    }

    /// Model ids the server reports.
    pub fn list_models(&self) -> Result<Vec<String>> {
        let json: Value = self
            .agent
            .get(&self.url("models"))
            .call()
            .with_context(|| format!("GET {}", self.url("models")))?
            .into_json()
            .context("Failed to parse models response")?;
        Ok(json["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

/// Body of a non-2xx response, for the error message.
fn describe_http_error(err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            anyhow::anyhow!("server returned {code}: {}", body.trim())
        }
        other => anyhow::Error::new(other),
    }
}

impl InferenceBackend for LmStudioBackend {
    fn name(&self) -> &str {
        "lmstudio"
    }

    fn prepare_image(&self, path: &Path) -> Result<ImageHandle> {
        let bytes = fs::read(path).with_context(|| format!("read image {}", path.display()))?;
        Ok(ImageHandle {
            path: path.to_path_buf(),
            mime: mime_for(path),
            bytes,
        })
    }

    fn load_model(
        &self,
        name: &str,
        allow_install: bool,
        context_size: Option<usize>,
    ) -> Option<ModelHandle> {
        let models = match self.list_models() {
            Ok(m) => m,
            Err(e) => {
                warn!("Cannot reach model server at {}: {:#}", self.base_url, e);
                return None;
            }
        };
        // The server loads listed models on first request; unlisted ones need a download first.
        if !models.iter().any(|m| m == name) && !allow_install {
            warn!(
                "Model {} not available on {} (have: {})",
                name,
                self.base_url,
                models.join(", ")
            );
            return None;
        }
        if let Some(n) = context_size {
            match self.load_with_context(name, n) {
                Ok(instance) => {
                    debug!("Loaded {name} as {instance} with context length {n}");
                    return Some(ModelHandle {
                        name: instance,
                        context_size,
                        loaded_by_us: true,
                    });
                }
                Err(e) => warn!(
                    "Cannot load {name} with context length {n}, using the server default: {e:#}"
                ),
            }
        }
        debug!("Using model {name} as loaded by the server");
        Some(ModelHandle {
            name: name.to_string(),
            context_size: None,
            loaded_by_us: false,
        })
    }

    fn respond(
        &self,
        model: &ModelHandle,
        prompt: &str,
        image: Option<&ImageHandle>,
    ) -> Result<String> {
        let mut content = vec![json!({ "type": "text", "text": prompt })];
        if let Some(img) = image {
            let data = STANDARD.encode(&img.bytes);
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{};base64,{}", img.mime, data) }
            }));
        }
        let payload = json!({
            "model": model.name,
            "messages": [{ "role": "user", "content": content }],
            "stream": false,
        });

        let json: Value = self
            .agent
            .post(&self.url("chat/completions"))
            .set("Content-Type", "application/json")
            .send_json(&payload)
            .map_err(describe_http_error)
            .context("chat completion request failed")?
            .into_json()
            .context("Failed to parse chat completion response")?;

        let Some(text) = json["choices"][0]["message"]["content"].as_str() else {
            bail!("No message content in response");
        };
        Ok(text.trim().to_string())
    }

    fn cleanup(&self, loaded_by_us: bool, model_name: &str, server_started_by_us: bool) {
        debug!(
            "cleanup {model_name}: loaded_by_us={loaded_by_us} server_started_by_us={server_started_by_us}"
        );
        // Models the server already had stay loaded.
        if loaded_by_us && let Err(e) = self.unload(model_name) {
            warn!("Failed to unload {model_name}: {e:#}");
        }
    }
}
