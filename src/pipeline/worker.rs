//! Per-thread execution cycle shared by all stages: load, acquire, execute, route, repeat, unload.

use anyhow::anyhow;
use crossbeam_channel::Sender;
use log::{debug, error, warn};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use super::context::PipelineContext;
use crate::engine::tools::display_relative;
use crate::task::{Backlog, Inbox, Outcome, Stage, Task, WorkItem};

/// A spawned worker thread, named after its stage.
pub struct WorkerHandle {
    pub stage: String,
    pub handle: JoinHandle<()>,
}

/// Everything one worker of stage `S` needs. Cloned once per thread.
pub(crate) struct WorkerSetup<S: Stage> {
    pub stage: Arc<S>,
    pub task: Arc<Task<S::Input>>,
    pub downstream: Option<Arc<dyn Inbox<S::Output>>>,
    /// Workers of this stage that loaded (or are still loading) successfully.
    pub live: Arc<AtomicUsize>,
}

impl<S: Stage> Clone for WorkerSetup<S> {
    fn clone(&self) -> Self {
        Self {
            stage: Arc::clone(&self.stage),
            task: Arc::clone(&self.task),
            downstream: self.downstream.clone(),
            live: Arc::clone(&self.live),
        }
    }
}

/// Reports the exit and, once `load` has succeeded, calls `unload`, even when the loop unwinds.
struct ExitGuard<'a, S: Stage> {
    stage: &'a S,
    name: &'a str,
    done_tx: &'a Sender<String>,
    loaded: bool,
}

impl<S: Stage> Drop for ExitGuard<'_, S> {
    fn drop(&mut self) {
        if self.loaded && catch_unwind(AssertUnwindSafe(|| self.stage.unload())).is_err() {
            warn!("{}: unload panicked", self.name);
        }
        let _ = self.done_tx.send(self.name.to_string());
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Spawn `count` workers for one stage.
pub(crate) fn spawn_stage_workers<S: Stage>(
    setup: WorkerSetup<S>,
    count: usize,
    ctx: &Arc<PipelineContext>,
    done_tx: &Sender<String>,
) -> std::io::Result<Vec<WorkerHandle>> {
    let name = setup.task.name().to_string();
    (0..count)
        .map(|_| {
            let setup = setup.clone();
            let ctx = Arc::clone(ctx);
            let done_tx = done_tx.clone();
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(setup, ctx, done_tx))?;
            Ok(WorkerHandle {
                stage: name.clone(),
                handle,
            })
        })
        .collect()
}

/// Single worker: load once, then take items until the stop signal is set.
fn worker_loop<S: Stage>(setup: WorkerSetup<S>, ctx: Arc<PipelineContext>, done_tx: Sender<String>) {
    let WorkerSetup {
        stage,
        task,
        downstream,
        live,
    } = setup;
    let mut exit = ExitGuard {
        stage: stage.as_ref(),
        name: task.name(),
        done_tx: &done_tx,
        loaded: false,
    };

    let loaded = catch_unwind(AssertUnwindSafe(|| stage.load()))
        .unwrap_or_else(|p| Err(anyhow!("load panicked: {}", panic_message(p.as_ref()))));
    if let Err(e) = loaded {
        error!("{}: worker failed to load: {:#}", task.name(), e);
        if live.fetch_sub(1, Ordering::SeqCst) == 1 {
            ctx.record_fatal(format!(
                "no worker of stage '{}' could start: {:#}",
                task.name(),
                e
            ));
        }
        return;
    }
    exit.loaded = true;

    let gate: Option<&dyn Backlog> = downstream.as_deref().map(|d| d as &dyn Backlog);
    while !ctx.is_stopped() {
        let Some(item) = task.start_next(gate, ctx.tuning.backpressure_multiplier) else {
            thread::sleep(ctx.tuning.poll_interval);
            continue;
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| stage.execute(&item))).unwrap_or_else(
            |p| Outcome::Failed(anyhow!("execute panicked: {}", panic_message(p.as_ref()))),
        );
        route(&task, downstream.as_deref(), &ctx, item, outcome);
    }
    debug!("{}: worker exiting", task.name());
}

/// Apply exactly one terminal disposition to `item`. Output and pending items are handed on
/// before the item leaves the active set so the idle check never sees work in transit as drained.
fn route<I: WorkItem, O>(
    task: &Task<I>,
    downstream: Option<&dyn Inbox<O>>,
    ctx: &PipelineContext,
    item: I,
    outcome: Outcome<O, I>,
) {
    match outcome {
        Outcome::Accepted { output, pending } => {
            let count = output.len();
            if let Some(next) = downstream {
                for o in output {
                    next.offer(o);
                }
            }
            task.push_pending(pending);
            task.finish(&item, count);
            if ctx.tuning.verbose {
                debug!(
                    "{}: {} -> {} output(s)",
                    task.name(),
                    display_relative(item.source(), None),
                    count
                );
                ctx.status_tick();
            }
        }
        Outcome::Rejected => task.reject(&item),
        Outcome::Failed(e) => {
            warn!(
                "{}: failed {}: {:#}",
                task.name(),
                item.source().display(),
                e
            );
            if let Some(next) = downstream {
                next.offer_failure(item.source(), &e);
            }
            task.fail(&item);
        }
    }
}
