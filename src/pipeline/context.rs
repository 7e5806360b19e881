//! Pipeline context and tuning: shared state passed to every worker and the status printer.

use chrono::Local;
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::task::{Task, TaskStats, WorkItem};
use crate::utils::config::PipelineDefaults;

/// Flow-control and reporting knobs for one run.
#[derive(Clone, Debug)]
pub struct PipelineTuning {
    /// Upstream stops starting work once the downstream queue holds `maximum * multiplier` items.
    pub backpressure_multiplier: f64,
    /// Period of the status line (which is also when discovered subdirectories are queued).
    pub status_interval: Duration,
    /// Sleep when a worker finds nothing it may start.
    pub poll_interval: Duration,
    /// Period of the top-level "everything drained" check.
    pub idle_check_interval: Duration,
    /// How long to wait for workers before logging who is still running.
    pub join_timeout: Duration,
    /// Print a status line after every completed item.
    pub verbose: bool,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            backpressure_multiplier: PipelineDefaults::BACKPRESSURE_MULTIPLIER,
            status_interval: PipelineDefaults::STATUS_INTERVAL,
            poll_interval: PipelineDefaults::POLL_INTERVAL,
            idle_check_interval: PipelineDefaults::IDLE_CHECK_INTERVAL,
            join_timeout: PipelineDefaults::JOIN_TIMEOUT,
            verbose: false,
        }
    }
}

/// What the status board needs from a stage, independent of its item type.
pub trait StageStatus: Send + Sync {
    fn name(&self) -> &str;
    fn format_status(&self) -> String;
    fn reset_recent(&self);
    fn flush_pending(&self) -> usize;
    fn is_idle(&self) -> bool;
    fn total(&self) -> TaskStats;
}

impl<T: WorkItem> StageStatus for Task<T> {
    fn name(&self) -> &str {
        Task::name(self)
    }

    fn format_status(&self) -> String {
        Task::format_status(self)
    }

    fn reset_recent(&self) {
        Task::reset_recent(self)
    }

    fn flush_pending(&self) -> usize {
        Task::flush_pending(self)
    }

    fn is_idle(&self) -> bool {
        Task::is_idle(self)
    }

    fn total(&self) -> TaskStats {
        Task::total(self)
    }
}

/// Shared context for one pipeline run: stop signal, status lock, first fatal error and the stage board.
/// Built by [`Pipeline::run`](super::Pipeline::run) and handed to every worker.
pub struct PipelineContext {
    pub tuning: PipelineTuning,
    stop: Arc<AtomicBool>,
    status_lock: Mutex<()>,
    fatal: Mutex<Option<String>>,
    stages: Vec<Arc<dyn StageStatus>>,
}

impl PipelineContext {
    pub fn new(
        tuning: PipelineTuning,
        stop: Arc<AtomicBool>,
        stages: Vec<Arc<dyn StageStatus>>,
    ) -> Self {
        Self {
            tuning,
            stop,
            status_lock: Mutex::new(()),
            fatal: Mutex::new(None),
            stages,
        }
    }

    fn status_guard(&self) -> MutexGuard<'_, ()> {
        self.status_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Keep the first fatal message and stop the run.
    pub fn record_fatal(&self, msg: String) {
        let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
        fatal.get_or_insert(msg);
        drop(fatal);
        self.request_stop();
    }

    pub fn take_fatal(&self) -> Option<String> {
        self.fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn stages(&self) -> &[Arc<dyn StageStatus>] {
        &self.stages
    }

    fn status_line(&self) -> String {
        let parts: Vec<String> = self.stages.iter().map(|s| s.format_status()).collect();
        format!(
            "[{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            parts.join(" | ")
        )
    }

    /// Print one status line, reset recent counters, then queue pending items.
    /// Runs under the status lock so the printed view and the flush never interleave.
    pub fn status_tick(&self) {
        let _guard = self.status_guard();
        info!("{}", self.status_line());
        for s in &self.stages {
            s.reset_recent();
        }
        for s in &self.stages {
            s.flush_pending();
        }
    }

    /// Final line after the run; recent counters are left untouched.
    pub fn print_final(&self) {
        let _guard = self.status_guard();
        info!("Done. Final update:");
        info!("{}", self.status_line());
    }

    /// True when every stage has an empty queue, active set and pending buffer.
    /// Stages are checked upstream first: items only flow downstream (or back into a stage's own
    /// pending buffer, which is only flushed under this lock), so an idle upstream stays idle.
    pub fn all_idle(&self) -> bool {
        let _guard = self.status_guard();
        self.stages.iter().all(|s| s.is_idle())
    }
}
