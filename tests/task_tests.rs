use photoscribe::WriteItem;
use photoscribe::task::{
    Backlog, DepthQueue, FifoQueue, Inbox, Task, TaskQueue, TaskStats, path_depth,
};
use std::path::{Path, PathBuf};

fn p(s: &str) -> PathBuf {
    PathBuf::from(s)
}

// --- stats ---

#[test]
fn test_stats_input_is_sum_of_outcomes() {
    let task = Task::new("Discover", 3);
    for name in ["/r/a", "/r/b", "/r/c"] {
        task.add(p(name));
    }
    let a = task.start_next(None, 2.0).unwrap();
    let b = task.start_next(None, 2.0).unwrap();
    let c = task.start_next(None, 2.0).unwrap();
    task.finish(&a, 3);
    task.fail(&b);
    task.reject(&c);

    let total = task.total();
    assert!(total.is_balanced());
    assert_eq!(total.input, 3);
    assert_eq!((total.done, total.failed, total.rejected), (1, 1, 1));
    assert_eq!(total.output, 3);
    assert_eq!(task.active_len(), 0);
}

#[test]
fn test_stats_compact_form() {
    let mut s = TaskStats::default();
    s.finish(1);
    s.finish(1);
    assert_eq!(s.compact(), "2D");
    s.fail();
    s.reject();
    assert_eq!(s.compact(), "4>1F1R2D");
    let mut dirs = TaskStats::default();
    dirs.finish(5);
    assert_eq!(dirs.compact(), "1>5D");
}

#[test]
fn test_recent_resets_total_does_not() {
    let task = Task::new("Write", 1);
    task.add(p("/r/a.jpg"));
    let a = task.start_next(None, 2.0).unwrap();
    task.finish(&a, 1);
    task.reset_recent();
    assert_eq!(task.recent(), TaskStats::default());
    assert_eq!(task.total().done, 1);
}

// --- capacity and backpressure ---

#[test]
fn test_capacity_limits_active_items() {
    let task = Task::new("SkipCheck", 2);
    for name in ["/r/a", "/r/b", "/r/c"] {
        task.add(p(name));
    }
    assert!(task.start_next(None, 2.0).is_some());
    assert!(task.start_next(None, 2.0).is_some());
    assert!(task.start_next(None, 2.0).is_none());
    assert_eq!(task.active_len(), 2);
    assert_eq!(task.queued(), 1);
}

#[test]
fn test_zero_maximum_is_raised_to_one() {
    let task: Task<PathBuf> = Task::new("Write", 0);
    assert_eq!(task.maximum(), 1);
}

#[test]
fn test_backpressure_blocks_when_downstream_full() {
    let upstream = Task::new("SkipCheck", 4);
    upstream.add(p("/r/a.jpg"));
    let downstream: Task<PathBuf> = Task::new("LLM", 2);
    for i in 0..4 {
        downstream.add(p(&format!("/r/{i}.jpg")));
    }
    // 4 queued >= 2 * 2.0
    assert!(upstream.start_next(Some(&downstream as &dyn Backlog), 2.0).is_none());

    let taken = downstream.start_next(None, 2.0).unwrap();
    assert_eq!(downstream.queued(), 3);
    assert!(upstream.start_next(Some(&downstream as &dyn Backlog), 2.0).is_some());
    downstream.finish(&taken, 1);
}

#[test]
fn test_empty_queue_starts_nothing() {
    let task: Task<PathBuf> = Task::new("Write", 2);
    assert!(task.start_next(None, 2.0).is_none());
    assert!(task.is_idle());
}

// --- queue orderings ---

#[test]
fn test_fifo_queue_order() {
    let mut q = FifoQueue::new();
    q.push(p("/r/b"));
    q.push(p("/r/a"));
    assert_eq!(q.pop(), Some(p("/r/b")));
    assert_eq!(q.pop(), Some(p("/r/a")));
    assert!(q.is_empty());
}

#[test]
fn test_path_depth_counts_separators() {
    assert_eq!(path_depth(Path::new("/r")), 1);
    assert_eq!(path_depth(Path::new("/r/a/b")), 3);
}

#[test]
fn test_depth_queue_deepest_first() {
    let mut q = DepthQueue::new();
    q.push(p("/r/a"));
    q.push(p("/r/a/b"));
    q.push(p("/r/a/b/c"));
    assert_eq!(q.pop(), Some(p("/r/a/b/c")));
    assert_eq!(q.pop(), Some(p("/r/a/b")));
    assert_eq!(q.pop(), Some(p("/r/a")));
    assert_eq!(q.pop(), None);
}

#[test]
fn test_depth_queue_fifo_at_equal_depth() {
    let mut q = DepthQueue::new();
    q.push(p("/r/z"));
    q.push(p("/r/a"));
    q.push(p("/r/deep/x"));
    q.push(p("/r/m"));
    assert_eq!(q.len(), 4);
    assert_eq!(q.pop(), Some(p("/r/deep/x")));
    assert_eq!(q.pop(), Some(p("/r/z")));
    assert_eq!(q.pop(), Some(p("/r/a")));
    assert_eq!(q.pop(), Some(p("/r/m")));
}

#[test]
fn test_task_with_depth_queue() {
    let task: Task<PathBuf> = Task::with_queue("Discover", 1, Box::new(DepthQueue::new()));
    task.add(p("/r"));
    task.add(p("/r/a/b"));
    task.add(p("/r/a"));
    assert_eq!(task.start_next(None, 2.0), Some(p("/r/a/b")));
}

// --- pending buffer ---

#[test]
fn test_pending_items_wait_for_flush() {
    let task = Task::new("Discover", 2);
    task.push_pending(vec![p("/r/sub1"), p("/r/sub2")]);
    assert_eq!(task.pending_len(), 2);
    assert!(!task.is_idle());
    assert!(task.start_next(None, 2.0).is_none());

    assert_eq!(task.flush_pending(), 2);
    assert_eq!(task.pending_len(), 0);
    assert_eq!(task.start_next(None, 2.0), Some(p("/r/sub1")));
}

#[test]
fn test_push_pending_empty_is_noop() {
    let task: Task<PathBuf> = Task::new("Discover", 1);
    task.push_pending(Vec::new());
    assert!(task.is_idle());
    assert_eq!(task.flush_pending(), 0);
}

// --- status line ---

#[test]
fn test_format_status_with_active_sample() {
    let task = Task::new("Write", 2).with_input_root("/r");
    for name in ["/r/a.jpg", "/r/b.jpg", "/r/c.jpg"] {
        task.add(p(name));
    }
    let a = task.start_next(None, 2.0).unwrap();
    task.start_next(None, 2.0).unwrap();
    task.finish(&a, 1);
    assert_eq!(task.format_status(), "Write: 1Q->1A/2M->1D/1D (b.jpg)");
}

#[test]
fn test_format_status_elides_long_active_set() {
    let task = Task::new("Metadata", 3).with_input_root("/r");
    for name in ["/r/a.jpg", "/r/b.jpg", "/r/c.jpg"] {
        task.add(p(name));
    }
    task.push_pending(vec![p("/r/d.jpg")]);
    for _ in 0..3 {
        task.start_next(None, 2.0).unwrap();
    }
    assert_eq!(
        task.format_status(),
        "Metadata: 1Q->3A/3M->0D/0D (a.jpg, b.jpg, ...)"
    );
}

// --- inbox ---

#[test]
fn test_failure_is_forwarded_only_to_write_items() {
    let err = anyhow::anyhow!("model crashed");
    let write: Task<WriteItem> = Task::new("Write", 1);
    assert!(Inbox::<WriteItem>::offer_failure(
        &write,
        Path::new("/r/a.jpg"),
        &err
    ));
    let item = write.start_next(None, 2.0).unwrap();
    assert_eq!(item.path, p("/r/a.jpg"));
    assert_eq!(item.content, Err("model crashed".to_string()));

    let paths: Task<PathBuf> = Task::new("SkipCheck", 1);
    assert!(!Inbox::<PathBuf>::offer_failure(
        &paths,
        Path::new("/r/a.jpg"),
        &err
    ));
    assert!(paths.is_idle());
}

#[test]
fn test_inbox_offer_queues_item() {
    let task: Task<PathBuf> = Task::new("SkipCheck", 1);
    Inbox::<PathBuf>::offer(&task, p("/r/a.jpg"));
    assert_eq!(task.queued(), 1);
}
