//! Deadline monitor thread
//!
//! Runs independently of the dispatcher: every tick it advances the
//! deadline counter of every task that is not currently running, and raises
//! the reschedule hint when a ready task with an approaching deadline
//! outranks the current task under priority-based preemption.

use crate::scheduler::scheduler::{PreemptionMode, SchedulerCore};
use crate::scheduler::TaskState;
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Interval between deadline accounting ticks.
pub const DEADLINE_TICK: Duration = Duration::from_millis(10);

/// Deadline accounting thread, owned by the scheduler
pub(super) struct DeadlineMonitor {
    core: Arc<SchedulerCore>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DeadlineMonitor {
    pub(super) fn new(core: Arc<SchedulerCore>) -> Self {
        Self {
            core,
            handle: Mutex::new(None),
        }
    }

    /// Spawn the monitor thread. The scheduler's running flag must already
    /// be set; the thread exits when it clears.
    pub(super) fn start(&self) {
        let core = self.core.clone();
        let handle = thread::Builder::new()
            .name("edurtos-deadline-monitor".to_string())
            .spawn(move || Self::monitor_loop(core))
            .expect("failed to spawn deadline monitor thread");
        *self.handle.lock() = Some(handle);
    }

    /// Join the monitor thread after the running flag has been cleared.
    pub(super) fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    fn monitor_loop(core: Arc<SchedulerCore>) {
        let mut last_tick = Instant::now();

        while core.is_running.load(Ordering::Acquire) {
            thread::sleep(DEADLINE_TICK);

            let now = Instant::now();
            let delta = now.duration_since(last_tick);
            last_tick = now;

            let inner = core.inner.lock();
            let current = inner.current.clone();
            let mode = inner.preemption_mode;

            for task in &inner.all_tasks {
                let running_now = current
                    .as_ref()
                    .map_or(false, |c| c.id() == task.id())
                    && task.state() == TaskState::Running;
                if !running_now {
                    task.update_deadline_counter(delta);
                }

                if task.is_deadline_approaching()
                    && task.state() == TaskState::Ready
                    && matches!(mode, PreemptionMode::Priority | PreemptionMode::Hybrid)
                    && current
                        .as_ref()
                        .map_or(false, |c| task.dynamic_priority() > c.dynamic_priority())
                {
                    core.force_reschedule.store(true, Ordering::Release);
                    core.condvar.notify_one();
                }
            }
        }
    }
}
