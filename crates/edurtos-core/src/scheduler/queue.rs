//! Priority-ordered ready queue
//!
//! A max-heap over dynamic priority. The priority is captured at enqueue so
//! the heap ordering stays consistent; entries whose task has left the Ready
//! state since enqueue are stale and are skipped and discarded at pop time.
//! The periodic priority adjustment rebuilds the heap with fresh priorities.

use crate::scheduler::{Task, TaskState};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Entry in the ready heap
struct ReadyEntry {
    /// Dynamic priority captured at enqueue
    priority: u8,
    /// The queued task
    task: Arc<Task>,
}

// Natural ordering on the captured priority gives a max-heap; ties are
// broken arbitrarily.
impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority)
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Eq for ReadyEntry {}

/// Max-priority queue of ready tasks
pub struct ReadyQueue {
    heap: BinaryHeap<ReadyEntry>,
}

impl ReadyQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Enqueue a task at its current dynamic priority
    pub fn push(&mut self, task: Arc<Task>) {
        self.heap.push(ReadyEntry {
            priority: task.dynamic_priority(),
            task,
        });
    }

    /// Pop the highest-priority task that is still Ready.
    ///
    /// Stale entries encountered at the front are discarded.
    pub fn pop(&mut self) -> Option<Arc<Task>> {
        while let Some(entry) = self.heap.pop() {
            if entry.task.state() == TaskState::Ready {
                return Some(entry.task);
            }
        }
        None
    }

    /// Rebuild the heap, dropping stale entries and refreshing priorities.
    pub fn rebuild(&mut self) {
        let entries = std::mem::take(&mut self.heap).into_vec();
        for entry in entries {
            if entry.task.state() == TaskState::Ready {
                self.push(entry.task);
            }
        }
    }

    /// Number of entries, stale ones included
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskSpec;

    fn create_test_task(name: &str, priority: u8) -> Arc<Task> {
        Arc::new(Task::new(
            name,
            Box::new(|| Ok(())),
            TaskSpec {
                priority,
                ..TaskSpec::default()
            },
        ))
    }

    #[test]
    fn test_pop_highest_priority_first() {
        let mut queue = ReadyQueue::new();
        queue.push(create_test_task("low", 10));
        queue.push(create_test_task("high", 80));
        queue.push(create_test_task("mid", 40));

        assert_eq!(queue.pop().unwrap().name(), "high");
        assert_eq!(queue.pop().unwrap().name(), "mid");
        assert_eq!(queue.pop().unwrap().name(), "low");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_stale_entries_skipped() {
        let mut queue = ReadyQueue::new();
        let suspended = create_test_task("suspended", 90);
        let ready = create_test_task("ready", 10);

        queue.push(suspended.clone());
        queue.push(ready.clone());
        suspended.suspend();

        // The higher-priority entry is stale and gets discarded.
        assert_eq!(queue.pop().unwrap().name(), "ready");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_rebuild_refreshes_priorities() {
        let mut queue = ReadyQueue::new();
        let boosted = Arc::new(Task::new(
            "boosted",
            Box::new(|| Ok(())),
            TaskSpec {
                priority: 30,
                deadline: std::time::Duration::from_millis(50),
                ..TaskSpec::default()
            },
        ));
        let stable = create_test_task("stable", 40);
        queue.push(boosted.clone());
        queue.push(stable);

        // Boost after enqueue: the captured priority is out of date until a
        // rebuild. 30 + floor(30 * 0.05 * 10) = 45.
        for _ in 0..10 {
            boosted.record_deadline_miss();
        }
        assert_eq!(boosted.dynamic_priority(), 45);
        queue.rebuild();

        assert_eq!(queue.pop().unwrap().name(), "boosted");
    }

    #[test]
    fn test_rebuild_drops_stale_entries() {
        let mut queue = ReadyQueue::new();
        let gone = create_test_task("gone", 50);
        queue.push(gone.clone());
        queue.push(create_test_task("kept", 20));

        gone.terminate();
        queue.rebuild();

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().name(), "kept");
    }
}
