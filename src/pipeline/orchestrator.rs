use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::context::{PipelineContext, PipelineTuning, StageStatus};
use super::worker::{WorkerHandle, WorkerSetup, spawn_stage_workers};
use crate::task::{Inbox, Stage, Task, TaskStats};
use crate::utils::config::check_backpressure;

/// Type-erased stage ready to be spawned. Built by [`StageChain`], consumed by [`Pipeline::run`].
trait SpawnStage: Send {
    fn spawn(
        self: Box<Self>,
        ctx: &Arc<PipelineContext>,
        done_tx: &Sender<String>,
    ) -> std::io::Result<Vec<WorkerHandle>>;
}

struct StageNode<S: Stage> {
    setup: WorkerSetup<S>,
    workers: usize,
}

impl<S: Stage> SpawnStage for StageNode<S> {
    fn spawn(
        self: Box<Self>,
        ctx: &Arc<PipelineContext>,
        done_tx: &Sender<String>,
    ) -> std::io::Result<Vec<WorkerHandle>> {
        spawn_stage_workers(self.setup, self.workers, ctx, done_tx)
    }
}

/// Entry point for wiring a linear pipeline.
pub struct PipelineBuilder {
    tuning: PipelineTuning,
    input_root: Option<PathBuf>,
    stop: Arc<AtomicBool>,
}

impl PipelineBuilder {
    pub fn new(tuning: PipelineTuning) -> Self {
        Self {
            tuning,
            input_root: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Root used to shorten paths in status lines.
    pub fn input_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.input_root = Some(root.into());
        self
    }

    /// Share an externally owned stop flag (e.g. one set by a Ctrl+C handler).
    pub fn stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// First stage of the chain. `workers` is both its thread count and its `maximum`.
    pub fn start<S: Stage>(self, name: &str, stage: S, workers: usize) -> StageChain<S> {
        let task = new_task(name, &stage, workers, self.input_root.as_ref());
        StageChain {
            builder: self,
            nodes: Vec::new(),
            statuses: Vec::new(),
            stage: Arc::new(stage),
            task,
            workers: workers.max(1),
        }
    }
}

fn new_task<S: Stage>(
    name: &str,
    stage: &S,
    workers: usize,
    input_root: Option<&PathBuf>,
) -> Arc<Task<S::Input>> {
    let task = Task::with_queue(name, workers.max(1), stage.new_queue());
    Arc::new(match input_root {
        Some(root) => task.with_input_root(root),
        None => task,
    })
}

type ClosedChain = (
    PipelineBuilder,
    Vec<Box<dyn SpawnStage>>,
    Vec<Arc<dyn StageStatus>>,
);

/// A pipeline under construction whose last stage is `S`.
pub struct StageChain<S: Stage> {
    builder: PipelineBuilder,
    nodes: Vec<Box<dyn SpawnStage>>,
    statuses: Vec<Arc<dyn StageStatus>>,
    stage: Arc<S>,
    task: Arc<Task<S::Input>>,
    workers: usize,
}

impl<S: Stage> StageChain<S> {
    /// Queue an initial item on the most recently added stage.
    pub fn seed(self, item: S::Input) -> Self {
        self.task.add(item);
        self
    }

    /// The most recently added stage's task, e.g. for inspecting stats after a run.
    pub fn task(&self) -> Arc<Task<S::Input>> {
        Arc::clone(&self.task)
    }

    fn close(mut self, downstream: Option<Arc<dyn Inbox<S::Output>>>) -> ClosedChain {
        self.statuses.push(self.task.clone());
        self.nodes.push(Box::new(StageNode {
            setup: WorkerSetup {
                stage: self.stage,
                task: self.task,
                downstream,
                live: Arc::new(AtomicUsize::new(self.workers)),
            },
            workers: self.workers,
        }));
        (self.builder, self.nodes, self.statuses)
    }

    /// Append the next stage. `S`'s outputs are converted into `N`'s inputs with `Into`.
    pub fn then<N>(self, name: &str, stage: N, workers: usize) -> StageChain<N>
    where
        N: Stage,
        S::Output: Into<N::Input>,
    {
        let task = new_task(name, &stage, workers, self.builder.input_root.as_ref());
        let inbox: Arc<dyn Inbox<S::Output>> = task.clone();
        let (builder, nodes, statuses) = self.close(Some(inbox));
        StageChain {
            builder,
            nodes,
            statuses,
            stage: Arc::new(stage),
            task,
            workers: workers.max(1),
        }
    }

    /// Close the chain. The last stage's outputs are dropped.
    pub fn build(self) -> Pipeline {
        let (builder, nodes, statuses) = self.close(None);
        Pipeline {
            tuning: builder.tuning,
            stop: builder.stop,
            nodes,
            stages: statuses,
        }
    }
}

/// Final totals for one stage.
#[derive(Clone, Debug)]
pub struct StageSummary {
    pub name: String,
    pub total: TaskStats,
}

/// What a finished run reports back.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub stages: Vec<StageSummary>,
    /// True when the run ended on the stop flag rather than by draining every stage.
    pub interrupted: bool,
}

impl RunSummary {
    pub fn stage(&self, name: &str) -> Option<&TaskStats> {
        self.stages.iter().find(|s| s.name == name).map(|s| &s.total)
    }
}

/// A wired pipeline, ready to run once.
pub struct Pipeline {
    tuning: PipelineTuning,
    stop: Arc<AtomicBool>,
    nodes: Vec<Box<dyn SpawnStage>>,
    stages: Vec<Arc<dyn StageStatus>>,
}

impl Pipeline {
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Spawn every stage's workers plus the status printer, wait until all stages drain (or the
    /// stop flag is set), then stop and join. Fails when a stage had no worker able to load.
    pub fn run(self) -> Result<RunSummary> {
        check_backpressure(self.tuning.backpressure_multiplier)?;
        let started = Instant::now();
        let ctx = Arc::new(PipelineContext::new(
            self.tuning,
            self.stop,
            self.stages,
        ));
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<String>();

        let mut workers: Vec<WorkerHandle> = Vec::new();
        for node in self.nodes {
            match node.spawn(&ctx, &done_tx) {
                Ok(mut handles) => workers.append(&mut handles),
                Err(e) => {
                    ctx.request_stop();
                    join_workers(workers, &done_rx, ctx.tuning.join_timeout);
                    return Err(e).context("failed to spawn worker thread");
                }
            }
        }
        drop(done_tx);
        debug!("pipeline: {} worker thread(s) started", workers.len());

        let status = spawn_status_printer(&ctx).context("failed to spawn status thread")?;

        let interrupted = wait_until_drained(&ctx);
        ctx.request_stop();

        join_workers(workers, &done_rx, ctx.tuning.join_timeout);
        let _ = status.join();

        ctx.print_final();
        debug!("pipeline: finished in {:.2?}", started.elapsed());

        if let Some(msg) = ctx.take_fatal() {
            bail!(msg);
        }
        if interrupted {
            info!("Interrupted; in-flight items were allowed to finish.");
        }

        Ok(RunSummary {
            stages: ctx
                .stages()
                .iter()
                .map(|s| StageSummary {
                    name: s.name().to_string(),
                    total: s.total(),
                })
                .collect(),
            interrupted,
        })
    }
}

/// Poll until every stage is idle. Returns true if the stop flag ended the wait instead.
fn wait_until_drained(ctx: &PipelineContext) -> bool {
    loop {
        if ctx.is_stopped() {
            return true;
        }
        if ctx.all_idle() {
            return false;
        }
        thread::sleep(ctx.tuning.idle_check_interval);
    }
}

/// Print status immediately and then every `status_interval`, sleeping in `poll_interval` slices
/// so the thread notices the stop flag promptly.
fn spawn_status_printer(ctx: &Arc<PipelineContext>) -> std::io::Result<JoinHandle<()>> {
    let ctx = Arc::clone(ctx);
    thread::Builder::new()
        .name("status".to_string())
        .spawn(move || {
            let slice = ctx.tuning.poll_interval.min(ctx.tuning.status_interval);
            while !ctx.is_stopped() {
                ctx.status_tick();
                let next = Instant::now() + ctx.tuning.status_interval;
                while !ctx.is_stopped() && Instant::now() < next {
                    thread::sleep(slice);
                }
            }
        })
}

/// Wait for every worker to report exit. Never kills: on each timeout, log who is still running.
fn join_workers(workers: Vec<WorkerHandle>, done_rx: &Receiver<String>, timeout: Duration) {
    let mut remaining = workers.len();
    while remaining > 0 {
        match done_rx.recv_timeout(timeout) {
            Ok(_) => remaining -= 1,
            Err(RecvTimeoutError::Timeout) => {
                let alive: Vec<&str> = workers
                    .iter()
                    .filter(|w| !w.handle.is_finished())
                    .map(|w| w.stage.as_str())
                    .collect();
                info!("Waiting for threads to finish... {}", alive.join(", "));
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    for w in workers {
        let _ = w.handle.join();
    }
}
