//! Priority Task Scheduler - Deadline-Aware Dispatch
//!
//! This module implements the priority-based dispatcher with deadline
//! monitoring, adaptive priority boosting, cooperative yield and
//! recoverable-task semantics.

mod monitor;
mod queue;
#[allow(clippy::module_inception)]
mod scheduler;
mod task;

pub use monitor::DEADLINE_TICK;
pub use queue::ReadyQueue;
pub use scheduler::{
    PreemptionMode, Scheduler, DEFAULT_TIME_SLICE, MAX_RECOVERY_ATTEMPTS,
};
pub use task::{
    SchedulePolicy, Task, TaskFault, TaskHandler, TaskId, TaskSpec, TaskState, TaskStats,
    DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY,
};
