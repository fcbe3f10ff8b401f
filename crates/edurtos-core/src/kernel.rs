//! Kernel facade - named task registry and lifecycle broker
//!
//! One long-lived, explicitly owned instance per process: it owns the
//! single scheduler and a name-keyed registry of task handles, and
//! serializes all registry operations on its own mutex. The kernel mutex is
//! never held while waiting on the scheduler condition; kernel APIs only
//! ever call the scheduler's public surface.

use crate::scheduler::{Scheduler, Task, TaskHandler, TaskSpec, TaskState};
use crate::{KernelError, KernelResult};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

pub use crate::scheduler::{DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY};

/// Named task registry owning the scheduler
pub struct Kernel {
    scheduler: Scheduler,
    tasks: Mutex<FxHashMap<String, Arc<Task>>>,
}

impl Kernel {
    /// Create a kernel with a default scheduler
    pub fn new() -> Self {
        Self {
            scheduler: Scheduler::new(),
            tasks: Mutex::new(FxHashMap::default()),
        }
    }

    /// Announce readiness. No further effect.
    pub fn initialize(&self) {
        #[cfg(debug_assertions)]
        eprintln!("edurtos: kernel initialized");
    }

    /// Start the scheduler (dispatcher and deadline-monitor threads).
    ///
    /// Start and stop do not take the registry mutex: `stop()` joins the
    /// dispatcher, and a handler on the dispatcher may be inside a registry
    /// operation.
    pub fn start(&self) {
        self.scheduler.start();
    }

    /// Stop the scheduler, joining both threads
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Create a task, register it under its name and hand it to the
    /// scheduler.
    ///
    /// The priority in `spec` is clamped into `[1, 99]`; a zero deadline
    /// defaults to the period. Fails without side effects when the name is
    /// already taken.
    pub fn create_task(
        &self,
        name: &str,
        handler: TaskHandler,
        spec: TaskSpec,
    ) -> KernelResult<Arc<Task>> {
        let mut tasks = self.tasks.lock();
        if tasks.contains_key(name) {
            eprintln!("edurtos: task '{name}' already exists");
            return Err(KernelError::DuplicateTask(name.to_string()));
        }

        let task = Arc::new(Task::new(name, handler, spec));
        tasks.insert(name.to_string(), task.clone());
        self.scheduler.add_task(task.clone());

        #[cfg(debug_assertions)]
        eprintln!(
            "edurtos: created task '{name}' with priority {}",
            task.base_priority()
        );
        Ok(task)
    }

    /// Terminate and unregister a task by name
    pub fn remove_task(&self, name: &str) -> KernelResult<()> {
        let mut tasks = self.tasks.lock();
        if tasks.remove(name).is_none() {
            eprintln!("edurtos: task '{name}' not found");
            return Err(KernelError::TaskNotFound(name.to_string()));
        }
        self.scheduler.remove_task(name);
        Ok(())
    }

    /// Look up a task handle by name
    pub fn get_task(&self, name: &str) -> Option<Arc<Task>> {
        self.tasks.lock().get(name).cloned()
    }

    /// Suspend a task by name
    pub fn suspend_task(&self, name: &str) -> KernelResult<()> {
        let tasks = self.tasks.lock();
        match tasks.get(name) {
            Some(task) => {
                task.suspend();
                Ok(())
            }
            None => {
                eprintln!("edurtos: task '{name}' not found");
                Err(KernelError::TaskNotFound(name.to_string()))
            }
        }
    }

    /// Resume a suspended task by name, re-enqueueing it for dispatch
    pub fn resume_task(&self, name: &str) -> KernelResult<()> {
        let tasks = self.tasks.lock();
        match tasks.get(name) {
            Some(task) => {
                if task.resume() && task.state() == TaskState::Ready {
                    self.scheduler.enqueue_ready(task);
                }
                Ok(())
            }
            None => {
                eprintln!("edurtos: task '{name}' not found");
                Err(KernelError::TaskNotFound(name.to_string()))
            }
        }
    }

    /// Access the scheduler for observers and cooperative yield
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulePolicy;
    use std::time::Duration;

    fn noop() -> TaskHandler {
        Box::new(|| Ok(()))
    }

    #[test]
    fn test_create_task_defaults_clamped() {
        let kernel = Kernel::new();
        let task = kernel.create_task("t", noop(), TaskSpec::default()).unwrap();

        // The default priority of 128 lands at the top of the 1-99 range.
        assert_eq!(task.base_priority(), 99);
        assert_eq!(task.policy(), SchedulePolicy::Preemptive);
        assert_eq!(task.state(), TaskState::Ready);
        assert!(!task.is_recoverable());
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let kernel = Kernel::new();
        kernel.create_task("x", noop(), TaskSpec::default()).unwrap();

        let second = kernel.create_task("x", noop(), TaskSpec::default());
        assert!(matches!(second, Err(KernelError::DuplicateTask(_))));

        // Registry and scheduler still hold exactly one "x".
        assert!(kernel.get_task("x").is_some());
        assert_eq!(kernel.scheduler().all_tasks().len(), 1);
    }

    #[test]
    fn test_remove_task() {
        let kernel = Kernel::new();
        let task = kernel.create_task("t", noop(), TaskSpec::default()).unwrap();

        kernel.remove_task("t").unwrap();
        assert_eq!(task.state(), TaskState::Terminated);
        assert!(kernel.get_task("t").is_none());
        assert!(kernel.scheduler().find_task("t").is_none());

        assert!(matches!(
            kernel.remove_task("t"),
            Err(KernelError::TaskNotFound(_))
        ));
    }

    #[test]
    fn test_suspend_resume_round_trip() {
        let kernel = Kernel::new();
        let task = kernel.create_task("t", noop(), TaskSpec::default()).unwrap();

        kernel.suspend_task("t").unwrap();
        assert_eq!(task.state(), TaskState::Suspended);

        kernel.resume_task("t").unwrap();
        assert_eq!(task.state(), TaskState::Ready);
    }

    #[test]
    fn test_resume_after_terminate_is_noop() {
        let kernel = Kernel::new();
        let task = kernel.create_task("t", noop(), TaskSpec::default()).unwrap();
        task.terminate();

        kernel.resume_task("t").unwrap();
        assert_eq!(task.state(), TaskState::Terminated);
    }

    #[test]
    fn test_unknown_names_rejected_without_state_change() {
        let kernel = Kernel::new();
        assert!(kernel.get_task("ghost").is_none());
        assert!(matches!(
            kernel.suspend_task("ghost"),
            Err(KernelError::TaskNotFound(_))
        ));
        assert!(matches!(
            kernel.resume_task("ghost"),
            Err(KernelError::TaskNotFound(_))
        ));
    }

    #[test]
    fn test_create_task_with_spec() {
        let kernel = Kernel::new();
        let task = kernel
            .create_task(
                "periodic",
                noop(),
                TaskSpec {
                    priority: 50,
                    policy: SchedulePolicy::Cooperative,
                    period: Duration::from_millis(100),
                    deadline: Duration::ZERO,
                    recoverable: true,
                },
            )
            .unwrap();

        assert_eq!(task.base_priority(), 50);
        assert_eq!(task.policy(), SchedulePolicy::Cooperative);
        assert_eq!(task.period(), Duration::from_millis(100));
        assert_eq!(task.deadline(), Duration::from_millis(100));
        assert!(task.is_recoverable());
    }

    #[test]
    fn test_start_stop() {
        let kernel = Kernel::new();
        kernel.initialize();
        kernel.start();
        assert!(kernel.scheduler().is_running());
        kernel.stop();
        assert!(!kernel.scheduler().is_running());
    }
}
