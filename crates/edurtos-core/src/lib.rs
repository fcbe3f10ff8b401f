//! EduRTOS Core Runtime
//!
//! Host-based educational RTOS simulator:
//! - Priority-based task scheduler with deadline monitoring
//! - Adaptive priority boosting driven by deadline misses
//! - Cooperative and preemptive dispatch with time slicing
//! - Recoverable-task semantics with a scheduler-global recovery cap
//! - Named task registry (kernel facade)
//! - Virtual hardware stubs (GPIO, timer, UART)
//!
//! Tasks are plain closures invoked synchronously on a dedicated dispatcher
//! thread; there is no stack switching and no mid-handler interruption.
//! Preemption manifests as a reschedule decision at the next dispatch
//! boundary.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod drivers;
pub mod kernel;
pub mod scheduler;
pub mod util;

pub use kernel::Kernel;
pub use scheduler::{
    PreemptionMode, SchedulePolicy, Scheduler, Task, TaskFault, TaskHandler, TaskId, TaskSpec,
    TaskState, TaskStats,
};

/// Errors reported by the kernel's registry operations.
///
/// These are non-fatal: a failed registry call never tears down the
/// scheduler.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// A task with the same name is already registered
    #[error("task '{0}' already exists")]
    DuplicateTask(String),

    /// No task with the given name is registered
    #[error("task '{0}' not found")]
    TaskNotFound(String),
}

/// Kernel operation result
pub type KernelResult<T> = Result<T, KernelError>;
