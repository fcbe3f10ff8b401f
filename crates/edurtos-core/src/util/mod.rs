//! Observers and test harnesses built on the public scheduler surface

mod fault;
mod logger;

pub use fault::{FaultInjector, FaultType};
pub use logger::{SchedulerLogger, DEFAULT_LOGGING_INTERVAL};
