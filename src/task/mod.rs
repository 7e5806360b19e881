//! Stage building blocks: stats, queue orderings, and the generic task container.

pub mod core;
pub mod queue;
pub mod stats;

pub use core::{Backlog, Inbox, Outcome, Stage, Task, WorkItem};
pub use queue::{DepthQueue, FifoQueue, TaskQueue, path_depth};
pub use stats::TaskStats;
