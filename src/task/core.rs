//! Generic stage container: queue, active set, capacity and stats behind one lock,
//! plus the contract every stage implements.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::queue::{FifoQueue, TaskQueue};
use super::stats::TaskStats;
use crate::engine::tools::display_relative;

/// Number of active items shown in a status line before eliding with `...`.
const STATUS_ACTIVE_SAMPLE: usize = 2;

/// An item flowing between stages. Every item is tied to one source path on disk.
///
/// Equality identifies an item inside a stage's active set, so two equal items must not be in flight
/// in the same stage at once.
pub trait WorkItem: Clone + PartialEq + Send + Sync + 'static {
    /// The input file or directory this item originated from.
    fn source(&self) -> &Path;

    /// Build an item that carries an upstream failure for `source`. Types that cannot represent a
    /// failure return `None` and the failure is only counted upstream.
    fn from_failure(_source: &Path, _error: &anyhow::Error) -> Option<Self> {
        None
    }
}

impl WorkItem for PathBuf {
    fn source(&self) -> &Path {
        self
    }
}

/// Result of executing one item.
pub enum Outcome<O, I> {
    /// Item processed. `output` goes downstream; `pending` is re-fed to the same stage after the next status flush.
    Accepted { output: Vec<O>, pending: Vec<I> },
    /// Expected non-processing (e.g. artifact already present). Nothing is forwarded.
    Rejected,
    Failed(anyhow::Error),
}

impl<O, I> Outcome<O, I> {
    pub fn one(output: O) -> Self {
        Outcome::Accepted {
            output: vec![output],
            pending: Vec::new(),
        }
    }

    pub fn many(output: Vec<O>) -> Self {
        Outcome::Accepted {
            output,
            pending: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::many(Vec::new())
    }

    pub fn with_pending(output: Vec<O>, pending: Vec<I>) -> Self {
        Outcome::Accepted { output, pending }
    }

    /// Map a plain `Result` onto Accepted(one) / Failed.
    pub fn from_result(r: Result<O>) -> Self {
        match r {
            Ok(o) => Self::one(o),
            Err(e) => Outcome::Failed(e),
        }
    }
}

/// The work a stage performs. One instance is shared by all of the stage's worker threads.
pub trait Stage: Send + Sync + 'static {
    type Input: WorkItem;
    type Output: Send + 'static;

    /// Queue discipline for this stage's input. FIFO unless overridden.
    fn new_queue(&self) -> Box<dyn TaskQueue<Self::Input>> {
        Box::new(FifoQueue::new())
    }

    /// Called once per worker thread before its loop. An error aborts that worker.
    fn load(&self) -> Result<()> {
        Ok(())
    }

    /// Called once per worker thread whose `load` succeeded, on exit, including after a panic.
    fn unload(&self) {}

    fn execute(&self, item: &Self::Input) -> Outcome<Self::Output, Self::Input>;
}

/// Read-only view of a stage's backlog, used by the upstream backpressure gate.
pub trait Backlog: Send + Sync {
    fn queued(&self) -> usize;
    fn maximum(&self) -> usize;
}

/// Producer side of a stage as seen by its upstream neighbour.
pub trait Inbox<T>: Backlog {
    fn offer(&self, item: T);
    /// Hand an upstream failure to this stage if its input type can carry one. Returns whether it was queued.
    fn offer_failure(&self, source: &Path, error: &anyhow::Error) -> bool;
}

struct TaskState<T> {
    queue: Box<dyn TaskQueue<T>>,
    active: Vec<T>,
    pending: Vec<T>,
    recent: TaskStats,
    total: TaskStats,
}

/// Queue + active set + stats for one stage. All mutation happens under a single stage-scoped lock.
pub struct Task<T> {
    name: String,
    maximum: usize,
    input_root: Option<PathBuf>,
    state: Mutex<TaskState<T>>,
}

impl<T: WorkItem> Task<T> {
    /// FIFO task with at most `maximum` items active at once.
    pub fn new(name: impl Into<String>, maximum: usize) -> Self {
        Self::with_queue(name, maximum, Box::new(FifoQueue::new()))
    }

    pub fn with_queue(
        name: impl Into<String>,
        maximum: usize,
        queue: Box<dyn TaskQueue<T>>,
    ) -> Self {
        Self {
            name: name.into(),
            maximum: maximum.max(1),
            input_root: None,
            state: Mutex::new(TaskState {
                queue,
                active: Vec::new(),
                pending: Vec::new(),
                recent: TaskStats::default(),
                total: TaskStats::default(),
            }),
        }
    }

    /// Root used to shorten active item paths in status lines.
    pub fn with_input_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.input_root = Some(root.into());
        self
    }

    fn state(&self) -> MutexGuard<'_, TaskState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&self, item: T) {
        self.state().queue.push(item);
    }

    /// Pop the next item into the active set, or `None` when at capacity, empty, or when
    /// `downstream` already holds `downstream.maximum * multiplier` queued items.
    pub fn start_next(&self, downstream: Option<&dyn Backlog>, multiplier: f64) -> Option<T> {
        // Read downstream depth first so no two stage locks are ever held together.
        let blocked = downstream
            .map(|d| d.queued() as f64 >= d.maximum() as f64 * multiplier)
            .unwrap_or(false);
        let mut st = self.state();
        if st.active.len() >= self.maximum || st.queue.is_empty() || blocked {
            return None;
        }
        let item = st.queue.pop()?;
        st.active.push(item.clone());
        Some(item)
    }

    fn remove_active(st: &mut TaskState<T>, item: &T) {
        if let Some(pos) = st.active.iter().position(|a| a == item) {
            st.active.swap_remove(pos);
        }
    }

    pub fn finish(&self, item: &T, output_count: usize) {
        let mut st = self.state();
        Self::remove_active(&mut st, item);
        st.recent.finish(output_count);
        st.total.finish(output_count);
    }

    pub fn fail(&self, item: &T) {
        let mut st = self.state();
        Self::remove_active(&mut st, item);
        st.recent.fail();
        st.total.fail();
    }

    pub fn reject(&self, item: &T) {
        let mut st = self.state();
        Self::remove_active(&mut st, item);
        st.recent.reject();
        st.total.reject();
    }

    /// Buffer items for this stage; they join the queue on the next [`flush_pending`](Self::flush_pending).
    pub fn push_pending(&self, items: Vec<T>) {
        if !items.is_empty() {
            self.state().pending.extend(items);
        }
    }

    /// Move buffered items into the queue. Returns how many were moved.
    pub fn flush_pending(&self) -> usize {
        let mut st = self.state();
        let pending = std::mem::take(&mut st.pending);
        let n = pending.len();
        for item in pending {
            st.queue.push(item);
        }
        n
    }

    /// True when queue, active set and pending buffer are all empty.
    pub fn is_idle(&self) -> bool {
        let st = self.state();
        st.queue.is_empty() && st.active.is_empty() && st.pending.is_empty()
    }

    pub fn active_len(&self) -> usize {
        self.state().active.len()
    }

    pub fn pending_len(&self) -> usize {
        self.state().pending.len()
    }

    pub fn recent(&self) -> TaskStats {
        self.state().recent
    }

    pub fn total(&self) -> TaskStats {
        self.state().total
    }

    pub fn reset_recent(&self) {
        self.state().recent = TaskStats::default();
    }

    /// `<name>: <Q>Q-><A>A/<M>M-><recent>/<total>[ (<active sample>)]`. Pending items count as queued.
    pub fn format_status(&self) -> String {
        let st = self.state();
        let queued = st.queue.len() + st.pending.len();
        let active = st.active.len();
        let mut line = format!(
            "{}: {}Q->{}A/{}M->{}/{}",
            self.name,
            queued,
            active,
            self.maximum,
            st.recent.compact(),
            st.total.compact()
        );
        if active > 0 {
            let sample: Vec<String> = st
                .active
                .iter()
                .take(STATUS_ACTIVE_SAMPLE)
                .map(|i| display_relative(i.source(), self.input_root.as_deref()))
                .collect();
            let more = if active > STATUS_ACTIVE_SAMPLE { ", ..." } else { "" };
            line.push_str(&format!(" ({}{})", sample.join(", "), more));
        }
        line
    }
}

impl<T: WorkItem> Backlog for Task<T> {
    fn queued(&self) -> usize {
        self.state().queue.len()
    }

    fn maximum(&self) -> usize {
        self.maximum
    }
}

impl<T, U> Inbox<T> for Task<U>
where
    T: Into<U> + Send,
    U: WorkItem,
{
    fn offer(&self, item: T) {
        self.add(item.into());
    }

    fn offer_failure(&self, source: &Path, error: &anyhow::Error) -> bool {
        match U::from_failure(source, error) {
            Some(item) => {
                self.add(item);
                true
            }
            None => false,
        }
    }
}
