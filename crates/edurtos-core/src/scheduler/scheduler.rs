//! Scheduler facade and dispatcher loop
//!
//! The scheduler owns two threads: the dispatcher, which selects and invokes
//! one task at a time, and the deadline monitor, which advances per-task
//! deadline accounting and raises preemption hints. Handlers run
//! synchronously on the dispatcher, so preemption is a reschedule decision
//! observed at the next dispatch boundary.

use crate::scheduler::monitor::DeadlineMonitor;
use crate::scheduler::queue::ReadyQueue;
use crate::scheduler::{SchedulePolicy, Task, TaskId, TaskState};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default time slice for preemptive tasks.
pub const DEFAULT_TIME_SLICE: Duration = Duration::from_millis(50);

/// Scheduler-global cap on task revivals. Once this many recoveries have
/// been spent, failed recoverable tasks stay terminated.
pub const MAX_RECOVERY_ATTEMPTS: usize = 3;

/// Upper bound on one idle wait; state changes wake the dispatcher earlier.
const IDLE_WAIT: Duration = Duration::from_millis(1);

/// How often the dispatcher re-derives every task's dynamic priority and
/// rebuilds the ready queue.
const PRIORITY_ADJUST_INTERVAL: Duration = Duration::from_secs(1);

/// Visualization symbols handed out to tasks in creation order.
const TASK_SYMBOLS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Symbol assigned once the alphabet is exhausted.
const OVERFLOW_SYMBOL: char = '#';

/// When the dispatcher may swap out the running task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PreemptionMode {
    /// Fully cooperative; the selected task runs to return
    None,
    /// Preemptive tasks are swapped out after their time slice
    TimeSlice,
    /// The running task is swapped out when a higher-priority task is ready
    Priority,
    /// Both time slicing and priority preemption
    #[default]
    Hybrid,
}

/// State shared between the facade, the dispatcher and the deadline monitor.
pub(super) struct SchedulerCore {
    /// Everything the dispatcher mutates under one lock
    pub(super) inner: Mutex<SchedulerInner>,

    /// Wakes the dispatcher out of its idle wait
    pub(super) condvar: Condvar,

    /// Cleared by `stop()`; both threads exit at their next boundary
    pub(super) is_running: AtomicBool,

    /// Reschedule hint, set by `yield_now()` and the deadline monitor
    pub(super) force_reschedule: AtomicBool,

    /// Latest CPU utilization, stored as `f32` bits
    cpu_utilization: AtomicU32,

    /// Revivals spent so far (scheduler-global, never reset)
    recovery_attempts: AtomicUsize,
}

/// Mutex-protected scheduler state
pub(super) struct SchedulerInner {
    /// Every registered task, in creation order
    pub(super) all_tasks: Vec<Arc<Task>>,

    /// Max-priority queue of ready tasks
    ready: ReadyQueue,

    /// The task most recently selected for dispatch
    pub(super) current: Option<Arc<Task>>,

    /// Visualization symbol per task
    symbols: FxHashMap<TaskId, char>,

    /// Time slice for preemptive tasks
    time_slice: Duration,

    /// Active preemption mode
    pub(super) preemption_mode: PreemptionMode,

    /// Accumulated handler execution time
    total_run_time: Duration,

    /// Accumulated dispatcher idle time
    total_idle_time: Duration,
}

impl SchedulerInner {
    fn add_task(&mut self, task: Arc<Task>) {
        self.assign_symbol(task.id());
        if task.state() == TaskState::Ready {
            self.ready.push(task.clone());
        }
        self.all_tasks.push(task);
    }

    fn remove_task(&mut self, name: &str) -> bool {
        let Some(position) = self.all_tasks.iter().position(|t| t.name() == name) else {
            return false;
        };
        let task = self.all_tasks.remove(position);
        task.terminate();
        self.symbols.remove(&task.id());
        // Any ready-queue entry for this task is now stale and gets skipped
        // at the next selection.
        true
    }

    /// Select the highest-priority ready task.
    ///
    /// When the queue drains, re-admit every task that is still Ready: tasks
    /// that ran without hitting a slice boundary are not requeued eagerly
    /// and rejoin here.
    fn select_next(&mut self) -> Option<Arc<Task>> {
        if let Some(task) = self.ready.pop() {
            return Some(task);
        }

        for task in &self.all_tasks {
            if task.state() == TaskState::Ready {
                self.ready.push(task.clone());
            }
        }
        self.ready.pop()
    }

    fn adjust_priorities(&mut self) {
        for task in &self.all_tasks {
            task.update_priority();
        }
        self.ready.rebuild();
    }

    fn assign_symbol(&mut self, id: TaskId) {
        let symbol = TASK_SYMBOLS
            .iter()
            .map(|&b| b as char)
            .find(|candidate| !self.symbols.values().any(|used| used == candidate))
            .unwrap_or(OVERFLOW_SYMBOL);
        self.symbols.insert(id, symbol);
    }

    fn visualization(&self) -> String {
        if self.all_tasks.is_empty() {
            return "No tasks registered in the scheduler.".to_string();
        }

        let mut out = String::new();

        out.push_str("Time | ");
        for task in &self.all_tasks {
            let symbol = self.symbols.get(&task.id()).copied().unwrap_or('?');
            let _ = write!(out, "{symbol} ");
        }
        out.push_str("| Tasks\n");

        out.push_str("-----|-");
        for _ in &self.all_tasks {
            out.push_str("--");
        }
        out.push_str("|---------\n");

        out.push_str("now  | ");
        for task in &self.all_tasks {
            let _ = write!(out, "{} ", state_glyph(task.state()));
        }
        out.push_str("| ");

        for (index, task) in self.all_tasks.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            let symbol = self.symbols.get(&task.id()).copied().unwrap_or('?');
            let _ = write!(
                out,
                "{symbol}:{}({})",
                task.name(),
                task.dynamic_priority()
            );
        }

        out
    }
}

impl SchedulerCore {
    /// Revive a recoverable task that just ended terminated, subject to the
    /// scheduler-global cap.
    fn attempt_task_recovery(&self, inner: &mut SchedulerInner, task: &Arc<Task>) -> bool {
        if !task.is_recoverable() {
            return false;
        }

        if self.recovery_attempts.load(Ordering::Acquire) >= MAX_RECOVERY_ATTEMPTS {
            eprintln!(
                "scheduler: recovery attempts exhausted, task '{}' stays terminated",
                task.name()
            );
            return false;
        }

        self.recovery_attempts.fetch_add(1, Ordering::AcqRel);
        #[cfg(debug_assertions)]
        eprintln!("scheduler: reviving task '{}'", task.name());

        task.set_state(TaskState::Ready);
        inner.ready.push(task.clone());
        true
    }

    fn update_cpu_utilization(&self, inner: &SchedulerInner) {
        let total = inner.total_run_time + inner.total_idle_time;
        let utilization = if total.is_zero() {
            0.0
        } else {
            inner.total_run_time.as_secs_f32() / total.as_secs_f32() * 100.0
        };
        self.cpu_utilization
            .store(utilization.to_bits(), Ordering::Release);
    }
}

/// Dispatcher main loop
fn dispatch_loop(core: Arc<SchedulerCore>) {
    let mut last_schedule = Instant::now();
    let mut last_adjust = Instant::now();

    while core.is_running.load(Ordering::Acquire) {
        let mut inner = core.inner.lock();
        let selected = inner.select_next();
        inner.current = selected.clone();

        match selected {
            Some(task) => {
                // Handlers run without the scheduler lock so observers and
                // the deadline monitor stay responsive.
                drop(inner);

                let started = Instant::now();
                task.execute();
                let elapsed = started.elapsed();

                let mut inner = core.inner.lock();
                task.update_statistics(elapsed);
                inner.total_run_time += elapsed;

                if task.state() == TaskState::Terminated && task.is_recoverable() {
                    core.attempt_task_recovery(&mut inner, &task);
                }
                core.update_cpu_utilization(&inner);

                let now = Instant::now();
                let slice_expired = task.policy() == SchedulePolicy::Preemptive
                    && matches!(
                        inner.preemption_mode,
                        PreemptionMode::TimeSlice | PreemptionMode::Hybrid
                    )
                    && now.duration_since(last_schedule) >= inner.time_slice;

                if slice_expired || core.force_reschedule.swap(false, Ordering::AcqRel) {
                    last_schedule = now;
                    if let Some(current) = inner.current.take() {
                        if current.state() == TaskState::Ready {
                            inner.ready.push(current);
                        }
                    }
                }

                maybe_adjust_priorities(&mut inner, &mut last_adjust);
            }
            None => {
                let idle_start = Instant::now();
                core.condvar.wait_for(&mut inner, IDLE_WAIT);
                inner.total_idle_time += idle_start.elapsed();

                maybe_adjust_priorities(&mut inner, &mut last_adjust);
            }
        }
    }
}

fn maybe_adjust_priorities(inner: &mut SchedulerInner, last_adjust: &mut Instant) {
    if last_adjust.elapsed() >= PRIORITY_ADJUST_INTERVAL {
        inner.adjust_priorities();
        *last_adjust = Instant::now();
    }
}

fn state_glyph(state: TaskState) -> char {
    match state {
        TaskState::Ready => '.',
        TaskState::Running => 'R',
        TaskState::Blocked => 'B',
        TaskState::Suspended => 'S',
        TaskState::Terminated => 'T',
    }
}

/// Priority-based task scheduler with deadline monitoring
pub struct Scheduler {
    core: Arc<SchedulerCore>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    monitor: DeadlineMonitor,
}

impl Scheduler {
    /// Create a scheduler with the default time slice
    pub fn new() -> Self {
        Self::with_time_slice(DEFAULT_TIME_SLICE)
    }

    /// Create a scheduler with a custom time slice
    pub fn with_time_slice(time_slice: Duration) -> Self {
        let core = Arc::new(SchedulerCore {
            inner: Mutex::new(SchedulerInner {
                all_tasks: Vec::new(),
                ready: ReadyQueue::new(),
                current: None,
                symbols: FxHashMap::default(),
                time_slice,
                preemption_mode: PreemptionMode::default(),
                total_run_time: Duration::ZERO,
                total_idle_time: Duration::ZERO,
            }),
            condvar: Condvar::new(),
            is_running: AtomicBool::new(false),
            force_reschedule: AtomicBool::new(false),
            cpu_utilization: AtomicU32::new(0),
            recovery_attempts: AtomicUsize::new(0),
        });

        Self {
            core: core.clone(),
            dispatcher: Mutex::new(None),
            monitor: DeadlineMonitor::new(core),
        }
    }

    /// Register a task with the scheduler and assign its visualization
    /// symbol. Ready tasks are enqueued for dispatch.
    pub fn add_task(&self, task: Arc<Task>) {
        let mut inner = self.core.inner.lock();
        inner.add_task(task);
        drop(inner);
        self.core.condvar.notify_one();
    }

    /// Terminate and unregister a task by name, freeing its symbol.
    ///
    /// Returns `false` when no task with that name is registered.
    pub fn remove_task(&self, name: &str) -> bool {
        self.core.inner.lock().remove_task(name)
    }

    /// Look up a registered task by name
    pub fn find_task(&self, name: &str) -> Option<Arc<Task>> {
        self.core
            .inner
            .lock()
            .all_tasks
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    /// Start the dispatcher and deadline-monitor threads. Idempotent.
    pub fn start(&self) {
        if self.core.is_running.swap(true, Ordering::AcqRel) {
            return;
        }

        let core = self.core.clone();
        let handle = thread::Builder::new()
            .name("edurtos-dispatcher".to_string())
            .spawn(move || dispatch_loop(core))
            .expect("failed to spawn dispatcher thread");
        *self.dispatcher.lock() = Some(handle);

        self.monitor.start();
    }

    /// Stop both threads.
    ///
    /// The running flag is cleared and the dispatcher condition notified;
    /// both threads observe the flag at their next suspension boundary and
    /// exit. In-flight handler execution is never cancelled.
    pub fn stop(&self) {
        if !self.core.is_running.swap(false, Ordering::AcqRel) {
            return;
        }

        self.core.condvar.notify_all();
        if let Some(handle) = self.dispatcher.lock().take() {
            let _ = handle.join();
        }
        self.monitor.stop();
    }

    /// Whether the scheduler threads are running
    pub fn is_running(&self) -> bool {
        self.core.is_running.load(Ordering::Acquire)
    }

    /// Cooperative yield: request that the current dispatch be treated as
    /// complete at the next scheduling boundary.
    pub fn yield_now(&self) {
        self.core.force_reschedule.store(true, Ordering::Release);
        self.core.condvar.notify_one();
    }

    /// Set the preemption mode
    pub fn set_preemption_mode(&self, mode: PreemptionMode) {
        self.core.inner.lock().preemption_mode = mode;
    }

    /// Get the active preemption mode
    pub fn preemption_mode(&self) -> PreemptionMode {
        self.core.inner.lock().preemption_mode
    }

    /// Set the time slice for preemptive tasks
    pub fn set_time_slice(&self, time_slice: Duration) {
        self.core.inner.lock().time_slice = time_slice;
    }

    /// Get the time slice for preemptive tasks
    pub fn time_slice(&self) -> Duration {
        self.core.inner.lock().time_slice
    }

    /// Re-derive every task's dynamic priority and rebuild the ready queue.
    ///
    /// The dispatcher calls this periodically; it is also safe to invoke
    /// directly.
    pub fn adjust_priorities(&self) {
        self.core.inner.lock().adjust_priorities();
    }

    /// Latest CPU utilization in percent, in `[0, 100]`
    pub fn cpu_utilization(&self) -> f32 {
        f32::from_bits(self.core.cpu_utilization.load(Ordering::Acquire))
    }

    /// The task most recently selected for dispatch, if any
    pub fn current_task(&self) -> Option<Arc<Task>> {
        self.core.inner.lock().current.clone()
    }

    /// Snapshot of every registered task, in creation order
    pub fn all_tasks(&self) -> Vec<Arc<Task>> {
        self.core.inner.lock().all_tasks.clone()
    }

    /// Revivals spent so far against [`MAX_RECOVERY_ATTEMPTS`]
    pub fn recovery_attempts(&self) -> usize {
        self.core.recovery_attempts.load(Ordering::Acquire)
    }

    /// Render a textual snapshot of every task's symbol, state glyph,
    /// priority and name.
    ///
    /// Holds the scheduler lock only briefly; never blocks on task
    /// execution.
    pub fn task_state_visualization(&self) -> String {
        self.core.inner.lock().visualization()
    }

    /// Re-enqueue a task that just transitioned back to Ready.
    pub(crate) fn enqueue_ready(&self, task: &Arc<Task>) {
        let mut inner = self.core.inner.lock();
        inner.ready.push(task.clone());
        drop(inner);
        self.core.condvar.notify_one();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
