//! Queue orderings for a stage: plain FIFO and the depth-first-biased discovery heap.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::path::{Path, is_separator};

use super::core::WorkItem;

/// Ordering discipline for items waiting in a stage. Always accessed under the owning task's lock.
pub trait TaskQueue<T>: Send {
    fn push(&mut self, item: T);
    fn pop(&mut self) -> Option<T>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Arrival-order queue used by every stage that does not override ordering.
pub struct FifoQueue<T> {
    items: VecDeque<T>,
}

impl<T> FifoQueue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> TaskQueue<T> for FifoQueue<T> {
    fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Number of path separators in `path`; the discovery priority is its negation.
pub fn path_depth(path: &Path) -> usize {
    path.as_os_str()
        .to_string_lossy()
        .chars()
        .filter(|c| is_separator(*c))
        .count()
}

struct DepthEntry<T> {
    priority: i64,
    seq: u64,
    item: T,
}

impl<T> PartialEq for DepthEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        (self.priority, self.seq) == (other.priority, other.seq)
    }
}

impl<T> Eq for DepthEntry<T> {}

impl<T> PartialOrd for DepthEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for DepthEntry<T> {
    // Reversed so the std max-heap pops the smallest (priority, seq) first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

/// Min-heap keyed on `(-depth, insertion_seq)`: deeper paths dequeue first, FIFO among equal depths.
pub struct DepthQueue<T> {
    heap: BinaryHeap<DepthEntry<T>>,
    seq: u64,
}

impl<T> DepthQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }
}

impl<T> Default for DepthQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: WorkItem> TaskQueue<T> for DepthQueue<T> {
    fn push(&mut self, item: T) {
        let priority = -(path_depth(item.source()) as i64);
        self.heap.push(DepthEntry {
            priority,
            seq: self.seq,
            item,
        });
        self.seq += 1;
    }

    fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|e| e.item)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}
