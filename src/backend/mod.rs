//! Inference backend capability and the stage-shared model handle.

pub mod lmstudio;

use anyhow::{Result, anyhow, bail};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub use lmstudio::LmStudioBackend;

/// An image read and ready to be sent to a model.
#[derive(Clone, Debug)]
pub struct ImageHandle {
    pub path: PathBuf,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// A model the backend can answer with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelHandle {
    pub name: String,
    pub context_size: Option<usize>,
    /// True when this process loaded it and should unload it on cleanup.
    pub loaded_by_us: bool,
}

/// The four operations a model server must offer. Implementations are shared across threads.
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;

    fn prepare_image(&self, path: &Path) -> Result<ImageHandle>;

    /// `None` when the model is unknown or the server cannot be reached.
    fn load_model(
        &self,
        name: &str,
        allow_install: bool,
        context_size: Option<usize>,
    ) -> Option<ModelHandle>;

    /// Text answer to `prompt`, optionally about `image`.
    fn respond(
        &self,
        model: &ModelHandle,
        prompt: &str,
        image: Option<&ImageHandle>,
    ) -> Result<String>;

    fn cleanup(&self, loaded_by_us: bool, model_name: &str, server_started_by_us: bool);
}

/// Backend by configured name.
pub fn get_backend(name: &str, url: &str) -> Result<Arc<dyn InferenceBackend>> {
    match name.to_ascii_lowercase().as_str() {
        "lmstudio" | "lm-studio" | "openai" => Ok(Arc::new(LmStudioBackend::new(url))),
        other => bail!("unknown backend '{other}' (available: lmstudio)"),
    }
}

/// One model per stage, loaded by the first worker to call [`acquire`](Self::acquire) and
/// released when the last worker calls [`release`](Self::release).
pub struct SharedModel {
    backend: Arc<dyn InferenceBackend>,
    model_name: String,
    context_size: Option<usize>,
    loaded: AtomicBool,
    handle: Mutex<Option<Arc<ModelHandle>>>,
    users: AtomicUsize,
}

impl SharedModel {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        model_name: impl Into<String>,
        context_size: Option<usize>,
    ) -> Self {
        Self {
            backend,
            model_name: model_name.into(),
            context_size,
            loaded: AtomicBool::new(false),
            handle: Mutex::new(None),
            users: AtomicUsize::new(0),
        }
    }

    pub fn backend(&self) -> &dyn InferenceBackend {
        self.backend.as_ref()
    }

    /// Load the model unless another worker already did. Checks the flag before and after
    /// taking the lock so only the first caller talks to the backend.
    pub fn acquire(&self) -> Result<()> {
        if !self.loaded.load(Ordering::Acquire) {
            let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.loaded.load(Ordering::Acquire) {
                let model = self
                    .backend
                    .load_model(&self.model_name, false, self.context_size)
                    .ok_or_else(|| anyhow!("Failed to load model: {}", self.model_name))?;
                info!(
                    "Loaded model {} via {}",
                    self.model_name,
                    self.backend.name()
                );
                *handle = Some(Arc::new(model));
                self.loaded.store(true, Ordering::Release);
            }
        }
        self.users.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn handle(&self) -> Result<Arc<ModelHandle>> {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| anyhow!("model {} is not loaded", self.model_name))
    }

    /// Drop one user; the last one out cleans up. Calls without a matching successful
    /// `acquire` are ignored.
    pub fn release(&self) {
        let prev = self
            .users
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if prev != Ok(1) {
            return;
        }
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = handle.take() {
            debug!("Releasing model {}", model.name);
            self.backend
                .cleanup(model.loaded_by_us, &model.name, false);
        }
        self.loaded.store(false, Ordering::Release);
    }

    pub fn users(&self) -> usize {
        self.users.load(Ordering::SeqCst)
    }
}
