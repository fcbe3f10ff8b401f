//! Task structure and execution state
//!
//! A task couples a named unit of work with its scheduling attributes
//! (priority, policy, period, deadline) and execution statistics. State and
//! the scheduling-relevant counters are atomics so observers can read them
//! without locking; the composite statistics live behind a mutex and are
//! only written from the dispatcher and deadline-monitor threads.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Lowest permitted task priority.
pub const MIN_PRIORITY: u8 = 1;

/// Highest permitted task priority.
pub const MAX_PRIORITY: u8 = 99;

/// Default priority handed out by [`TaskSpec::default`].
///
/// This exceeds [`MAX_PRIORITY`] and is clamped to 99 on construction, so a
/// task created with the defaults runs at the highest priority.
pub const DEFAULT_PRIORITY: u8 = 128;

/// Priority boost applied per cumulative deadline miss, as a fraction of the
/// base priority.
const MISS_BOOST_FACTOR: f32 = 0.05;

/// Unique identifier for a task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Generate a new unique TaskId
    pub fn new() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Ready to be dispatched
    Ready = 0,
    /// Currently executing on the dispatcher
    Running = 1,
    /// Waiting for a resource or event
    Blocked = 2,
    /// Suspended by explicit request
    Suspended = 3,
    /// Completed or removed; terminal
    Terminated = 4,
}

impl TaskState {
    fn from_u8(value: u8) -> TaskState {
        match value {
            0 => TaskState::Ready,
            1 => TaskState::Running,
            2 => TaskState::Blocked,
            3 => TaskState::Suspended,
            4 => TaskState::Terminated,
            _ => unreachable!("invalid task state {value}"),
        }
    }
}

/// Dispatch policy of a task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SchedulePolicy {
    /// May be swapped out at a dispatch boundary by time slicing or a
    /// higher-priority ready task
    Preemptive,
    /// Runs until it returns or voluntarily yields
    Cooperative,
}

/// Error raised by a task handler to signal a failed execution.
#[derive(Debug, Clone, thiserror::Error)]
#[error("task fault: {message}")]
pub struct TaskFault {
    /// Human-readable failure description
    pub message: String,
}

impl TaskFault {
    /// Create a fault with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A task's unit of work: a zero-argument closure invoked once per dispatch.
///
/// Returning `Err` signals a failed execution: a recoverable task goes
/// straight back to Ready, a non-recoverable one is terminated.
pub type TaskHandler = Box<dyn FnMut() -> Result<(), TaskFault> + Send>;

/// Scheduling attributes for a new task.
///
/// ```
/// use edurtos_core::{SchedulePolicy, TaskSpec};
/// use std::time::Duration;
///
/// let spec = TaskSpec {
///     priority: 50,
///     period: Duration::from_millis(100),
///     deadline: Duration::from_millis(90),
///     ..TaskSpec::default()
/// };
/// assert_eq!(spec.policy, SchedulePolicy::Preemptive);
/// ```
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Base priority, clamped into `[1, 99]` on construction
    pub priority: u8,
    /// Dispatch policy
    pub policy: SchedulePolicy,
    /// Desired activation period; zero means aperiodic
    pub period: Duration,
    /// Relative deadline; zero at construction means "equal to the period"
    pub deadline: Duration,
    /// Whether the task survives handler failures and may be revived by
    /// the scheduler when a dispatch leaves it terminated
    pub recoverable: bool,
}

impl Default for TaskSpec {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            policy: SchedulePolicy::Preemptive,
            period: Duration::ZERO,
            deadline: Duration::ZERO,
            recoverable: false,
        }
    }
}

/// Snapshot of a task's execution statistics
#[derive(Debug, Clone, Default)]
pub struct TaskStats {
    /// Number of completed dispatches
    pub execution_count: usize,
    /// Number of recorded deadline misses
    pub deadline_misses: usize,
    /// When the task was most recently dispatched
    pub last_execution: Option<Instant>,
    /// Accumulated handler execution time
    pub total_execution_time: Duration,
    /// `total_execution_time / execution_count`, or zero before the first run
    pub average_execution_time: Duration,
    /// Elapsed time since the task was last dispatched, bounded by the
    /// deadline logic
    pub deadline_counter: Duration,
}

/// Composite statistics, written only by the dispatcher and the deadline
/// monitor.
struct ExecStats {
    last_execution: Option<Instant>,
    total_execution_time: Duration,
    average_execution_time: Duration,
    deadline_counter: Duration,
}

/// A schedulable unit of work
pub struct Task {
    /// Unique identifier
    id: TaskId,

    /// Unique human-readable name
    name: String,

    /// The unit of work, invoked only by the dispatcher
    handler: Mutex<TaskHandler>,

    /// Dispatch policy
    policy: SchedulePolicy,

    /// Priority assigned at creation, in `[1, 99]`
    base_priority: u8,

    /// Current scheduling priority; boosted by deadline-miss feedback
    dynamic_priority: AtomicU8,

    /// Activation period; zero means aperiodic
    period: Duration,

    /// Relative deadline; zero disables deadline accounting
    deadline: Duration,

    /// Current state
    state: AtomicU8,

    /// Whether the task survives handler failures and qualifies for
    /// revival when a dispatch leaves it terminated
    recoverable: bool,

    /// Completed dispatch count
    execution_count: AtomicUsize,

    /// Recorded deadline misses
    deadline_misses: AtomicUsize,

    /// Composite statistics
    exec_stats: Mutex<ExecStats>,
}

impl Task {
    /// Create a new task.
    ///
    /// The priority is clamped into `[1, 99]`; a zero deadline defaults to
    /// the period. The task starts in [`TaskState::Ready`].
    pub fn new(name: impl Into<String>, handler: TaskHandler, spec: TaskSpec) -> Self {
        let priority = spec.priority.clamp(MIN_PRIORITY, MAX_PRIORITY);
        let deadline = if spec.deadline.is_zero() {
            spec.period
        } else {
            spec.deadline
        };

        Self {
            id: TaskId::new(),
            name: name.into(),
            handler: Mutex::new(handler),
            policy: spec.policy,
            base_priority: priority,
            dynamic_priority: AtomicU8::new(priority),
            period: spec.period,
            deadline,
            state: AtomicU8::new(TaskState::Ready as u8),
            recoverable: spec.recoverable,
            execution_count: AtomicUsize::new(0),
            deadline_misses: AtomicUsize::new(0),
            exec_stats: Mutex::new(ExecStats {
                last_execution: None,
                total_execution_time: Duration::ZERO,
                average_execution_time: Duration::ZERO,
                deadline_counter: Duration::ZERO,
            }),
        }
    }

    /// Get the task's unique ID
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Get the task's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the dispatch policy
    pub fn policy(&self) -> SchedulePolicy {
        self.policy
    }

    /// Get the priority assigned at creation
    pub fn base_priority(&self) -> u8 {
        self.base_priority
    }

    /// Get the current scheduling priority
    pub fn dynamic_priority(&self) -> u8 {
        self.dynamic_priority.load(Ordering::Acquire)
    }

    /// Get the activation period (zero for aperiodic tasks)
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Get the relative deadline (zero disables deadline accounting)
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Get the current state
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Whether the task survives handler failures and qualifies for
    /// revival when a dispatch leaves it terminated
    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    /// Run one dispatch of the task's handler.
    ///
    /// Sets the state to Running, stamps the dispatch time, bumps the
    /// execution count, zeroes the deadline counter and invokes the handler.
    /// On normal return the state goes back to Ready unless a suspend or
    /// terminate landed during the run (that transition wins at this state
    /// check). A handler failure leaves a recoverable task Ready and
    /// terminates a non-recoverable one.
    ///
    /// The dispatcher wraps this call to measure the elapsed time.
    pub fn execute(&self) {
        self.set_state(TaskState::Running);
        {
            let mut stats = self.exec_stats.lock();
            stats.last_execution = Some(Instant::now());
            stats.deadline_counter = Duration::ZERO;
        }
        self.execution_count.fetch_add(1, Ordering::AcqRel);

        let result = {
            let mut handler = self.handler.lock();
            (*handler)()
        };

        match result {
            Ok(()) => {
                let _ = self.state.compare_exchange(
                    TaskState::Running as u8,
                    TaskState::Ready as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
            Err(_fault) => {
                #[cfg(debug_assertions)]
                eprintln!("task '{}' failed: {}", self.name, _fault);
                if self.recoverable {
                    // Same state check as the normal-return path: an
                    // explicit terminate or suspend during the run wins.
                    let _ = self.state.compare_exchange(
                        TaskState::Running as u8,
                        TaskState::Ready as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                } else {
                    self.set_state(TaskState::Terminated);
                }
            }
        }
    }

    /// Suspend the task. No-op for terminated tasks.
    pub fn suspend(&self) {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            if state == TaskState::Terminated as u8 {
                return;
            }
            match self.state.compare_exchange_weak(
                state,
                TaskState::Suspended as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => state = actual,
            }
        }
    }

    /// Resume a suspended task. Returns `true` if the task transitioned back
    /// to Ready; no-op (and `false`) in every other state.
    pub fn resume(&self) -> bool {
        self.state
            .compare_exchange(
                TaskState::Suspended as u8,
                TaskState::Ready as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Terminate the task unconditionally.
    pub fn terminate(&self) {
        self.set_state(TaskState::Terminated);
    }

    /// Fold one measured execution into the running totals.
    pub fn update_statistics(&self, elapsed: Duration) {
        let count = self.execution_count.load(Ordering::Acquire);
        let mut stats = self.exec_stats.lock();
        stats.total_execution_time += elapsed;
        if count > 0 {
            stats.average_execution_time = stats.total_execution_time / count as u32;
        }
    }

    /// Advance the deadline counter by `delta`.
    ///
    /// Crossing the deadline records a miss and resets the counter. Tasks
    /// with a zero deadline never record misses.
    pub fn update_deadline_counter(&self, delta: Duration) {
        if self.deadline.is_zero() {
            return;
        }

        let mut stats = self.exec_stats.lock();
        stats.deadline_counter += delta;
        if stats.deadline_counter > self.deadline {
            stats.deadline_counter = Duration::ZERO;
            drop(stats);
            self.record_deadline_miss();
        }
    }

    /// Record a deadline miss and re-derive the dynamic priority.
    pub fn record_deadline_miss(&self) {
        self.deadline_misses.fetch_add(1, Ordering::AcqRel);
        self.update_priority();
    }

    /// Re-derive the dynamic priority from the miss count.
    ///
    /// Each cumulative miss boosts the priority by 5% of the base priority
    /// (floored), hard-capped at 99. With no misses the dynamic priority is
    /// the base priority. Idempotent for a fixed miss count.
    pub fn update_priority(&self) {
        let misses = self.deadline_misses.load(Ordering::Acquire);
        let next = if misses > 0 {
            let boost = self.base_priority as f32 * MISS_BOOST_FACTOR * misses as f32;
            (self.base_priority as u32 + boost as u32).min(MAX_PRIORITY as u32) as u8
        } else {
            self.base_priority
        };
        self.dynamic_priority.store(next, Ordering::Release);
    }

    /// Whether more than 4/5 of the deadline has elapsed since the last
    /// dispatch. Always `false` for tasks with a zero deadline.
    pub fn is_deadline_approaching(&self) -> bool {
        if self.deadline.is_zero() {
            return false;
        }
        self.exec_stats.lock().deadline_counter > self.deadline * 4 / 5
    }

    /// Reset all statistics and restore the dynamic priority to the base
    /// priority.
    pub fn reset_statistics(&self) {
        self.execution_count.store(0, Ordering::Release);
        self.deadline_misses.store(0, Ordering::Release);
        let mut stats = self.exec_stats.lock();
        stats.last_execution = None;
        stats.total_execution_time = Duration::ZERO;
        stats.average_execution_time = Duration::ZERO;
        stats.deadline_counter = Duration::ZERO;
        drop(stats);
        self.dynamic_priority
            .store(self.base_priority, Ordering::Release);
    }

    /// Get a snapshot of the execution statistics
    pub fn stats(&self) -> TaskStats {
        let exec = self.exec_stats.lock();
        TaskStats {
            execution_count: self.execution_count.load(Ordering::Acquire),
            deadline_misses: self.deadline_misses.load(Ordering::Acquire),
            last_execution: exec.last_execution,
            total_execution_time: exec.total_execution_time,
            average_execution_time: exec.average_execution_time,
            deadline_counter: exec.deadline_counter,
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("policy", &self.policy)
            .field("base_priority", &self.base_priority)
            .field("dynamic_priority", &self.dynamic_priority())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_task(name: &str, spec: TaskSpec) -> Task {
        Task::new(name, Box::new(|| Ok(())), spec)
    }

    #[test]
    fn test_task_id_uniqueness() {
        let id1 = TaskId::new();
        let id2 = TaskId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn test_task_creation_defaults() {
        let task = create_test_task("t", TaskSpec::default());
        assert_eq!(task.name(), "t");
        assert_eq!(task.state(), TaskState::Ready);
        assert_eq!(task.policy(), SchedulePolicy::Preemptive);
        // The default priority of 128 is clamped to the top of the range.
        assert_eq!(task.base_priority(), MAX_PRIORITY);
        assert_eq!(task.dynamic_priority(), MAX_PRIORITY);
        assert!(!task.is_recoverable());
        assert_eq!(task.stats().execution_count, 0);
    }

    #[test]
    fn test_priority_clamped_low() {
        let task = create_test_task(
            "t",
            TaskSpec {
                priority: 0,
                ..TaskSpec::default()
            },
        );
        assert_eq!(task.base_priority(), MIN_PRIORITY);
    }

    #[test]
    fn test_zero_deadline_defaults_to_period() {
        let task = create_test_task(
            "t",
            TaskSpec {
                period: Duration::from_millis(100),
                deadline: Duration::ZERO,
                ..TaskSpec::default()
            },
        );
        assert_eq!(task.deadline(), Duration::from_millis(100));
    }

    #[test]
    fn test_state_transitions() {
        let task = create_test_task("t", TaskSpec::default());

        task.suspend();
        assert_eq!(task.state(), TaskState::Suspended);

        assert!(task.resume());
        assert_eq!(task.state(), TaskState::Ready);

        // Resume is a no-op unless suspended.
        assert!(!task.resume());
        assert_eq!(task.state(), TaskState::Ready);

        task.terminate();
        assert_eq!(task.state(), TaskState::Terminated);

        // Terminated is terminal.
        task.suspend();
        assert_eq!(task.state(), TaskState::Terminated);
        assert!(!task.resume());
        assert_eq!(task.state(), TaskState::Terminated);
    }

    #[test]
    fn test_execute_success() {
        let task = create_test_task("t", TaskSpec::default());
        task.execute();
        assert_eq!(task.state(), TaskState::Ready);
        assert_eq!(task.stats().execution_count, 1);
        assert!(task.stats().last_execution.is_some());
    }

    #[test]
    fn test_execute_failure_terminates() {
        let task = Task::new(
            "t",
            Box::new(|| Err(TaskFault::new("boom"))),
            TaskSpec::default(),
        );
        task.execute();
        assert_eq!(task.state(), TaskState::Terminated);
        assert_eq!(task.stats().execution_count, 1);
    }

    #[test]
    fn test_execute_failure_recoverable_back_to_ready() {
        // A recoverable failure never terminates the task; it lands
        // straight back in the ready state.
        let task = Task::new(
            "t",
            Box::new(|| Err(TaskFault::new("boom"))),
            TaskSpec {
                recoverable: true,
                ..TaskSpec::default()
            },
        );
        task.execute();
        assert_eq!(task.state(), TaskState::Ready);
        task.execute();
        assert_eq!(task.state(), TaskState::Ready);
        assert_eq!(task.stats().execution_count, 2);
    }

    #[test]
    fn test_terminate_during_execution_wins_over_recoverable_failure() {
        use std::sync::{Arc, OnceLock};

        let slot: Arc<OnceLock<Arc<Task>>> = Arc::new(OnceLock::new());
        let me = slot.clone();
        let task = Arc::new(Task::new(
            "t",
            Box::new(move || {
                if let Some(task) = me.get() {
                    task.terminate();
                }
                Err(TaskFault::new("boom"))
            }),
            TaskSpec {
                recoverable: true,
                ..TaskSpec::default()
            },
        ));
        let _ = slot.set(task.clone());

        task.execute();
        assert_eq!(task.state(), TaskState::Terminated);
    }

    #[test]
    fn test_execute_resets_deadline_counter() {
        let task = create_test_task(
            "t",
            TaskSpec {
                deadline: Duration::from_millis(100),
                ..TaskSpec::default()
            },
        );
        task.update_deadline_counter(Duration::from_millis(60));
        assert_eq!(task.stats().deadline_counter, Duration::from_millis(60));

        task.execute();
        assert_eq!(task.stats().deadline_counter, Duration::ZERO);
    }

    #[test]
    fn test_deadline_miss_boosts_priority() {
        let task = create_test_task(
            "t",
            TaskSpec {
                priority: 50,
                deadline: Duration::from_millis(100),
                ..TaskSpec::default()
            },
        );

        // Two misses: 50 + floor(50 * 0.05 * 2) = 55.
        task.update_deadline_counter(Duration::from_millis(150));
        task.update_deadline_counter(Duration::from_millis(150));
        assert_eq!(task.stats().deadline_misses, 2);
        assert_eq!(task.dynamic_priority(), 55);

        // Twenty misses saturate at 99.
        for _ in 0..18 {
            task.record_deadline_miss();
        }
        assert_eq!(task.stats().deadline_misses, 20);
        assert_eq!(task.dynamic_priority(), 99);
    }

    #[test]
    fn test_zero_deadline_never_misses() {
        let task = create_test_task(
            "t",
            TaskSpec {
                priority: 50,
                ..TaskSpec::default()
            },
        );
        assert_eq!(task.deadline(), Duration::ZERO);

        task.update_deadline_counter(Duration::from_secs(10));
        assert_eq!(task.stats().deadline_misses, 0);
        assert_eq!(task.dynamic_priority(), 50);
        assert!(!task.is_deadline_approaching());
    }

    #[test]
    fn test_update_priority_idempotent() {
        let task = create_test_task(
            "t",
            TaskSpec {
                priority: 40,
                deadline: Duration::from_millis(50),
                ..TaskSpec::default()
            },
        );
        task.record_deadline_miss();
        let boosted = task.dynamic_priority();

        task.update_priority();
        task.update_priority();
        assert_eq!(task.dynamic_priority(), boosted);
        assert!(boosted >= task.base_priority());
    }

    #[test]
    fn test_deadline_approaching_threshold() {
        let task = create_test_task(
            "t",
            TaskSpec {
                deadline: Duration::from_millis(100),
                ..TaskSpec::default()
            },
        );

        task.update_deadline_counter(Duration::from_millis(70));
        assert!(!task.is_deadline_approaching());

        task.update_deadline_counter(Duration::from_millis(15));
        assert!(task.is_deadline_approaching());
    }

    #[test]
    fn test_statistics_average() {
        let task = create_test_task("t", TaskSpec::default());

        task.execute();
        task.update_statistics(Duration::from_micros(100));
        assert_eq!(
            task.stats().average_execution_time,
            Duration::from_micros(100)
        );

        task.execute();
        task.update_statistics(Duration::from_micros(300));
        assert_eq!(
            task.stats().total_execution_time,
            Duration::from_micros(400)
        );
        assert_eq!(
            task.stats().average_execution_time,
            Duration::from_micros(200)
        );
    }

    #[test]
    fn test_reset_statistics() {
        let task = create_test_task(
            "t",
            TaskSpec {
                priority: 50,
                deadline: Duration::from_millis(10),
                ..TaskSpec::default()
            },
        );
        task.execute();
        task.update_statistics(Duration::from_micros(50));
        task.record_deadline_miss();
        assert!(task.dynamic_priority() > 50);

        task.reset_statistics();
        let stats = task.stats();
        assert_eq!(stats.execution_count, 0);
        assert_eq!(stats.deadline_misses, 0);
        assert_eq!(stats.total_execution_time, Duration::ZERO);
        assert_eq!(stats.average_execution_time, Duration::ZERO);
        assert_eq!(stats.deadline_counter, Duration::ZERO);
        assert_eq!(task.dynamic_priority(), 50);
    }

    #[test]
    fn test_handler_runs_per_dispatch() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let task = Task::new(
            "t",
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            TaskSpec::default(),
        );

        task.execute();
        task.execute();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(task.stats().execution_count, 2);
    }
}
