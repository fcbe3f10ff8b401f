//! CSV scheduler logger
//!
//! A read-only observer: a sampling thread periodically writes one row per
//! task plus a CPU-utilization row to a CSV file. Schema:
//!
//! ```text
//! Timestamp,EventType,TaskName,TaskState,Priority,DeadlineMs,DeadlinePercent,
//!   ExecutionCount,MissCount,AvgExecTimeMs,CPUUtilization
//! ```
//!
//! Timestamps are Unix epoch milliseconds.

use crate::scheduler::{Task, TaskState};
use crate::Kernel;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const CSV_HEADER: &str = "Timestamp,EventType,TaskName,TaskState,Priority,DeadlineMs,DeadlinePercent,ExecutionCount,MissCount,AvgExecTimeMs,CPUUtilization";

/// Default sampling interval.
pub const DEFAULT_LOGGING_INTERVAL: Duration = Duration::from_millis(100);

/// CSV observer of scheduler state
pub struct SchedulerLogger {
    kernel: Arc<Kernel>,
    writer: Arc<Mutex<BufWriter<File>>>,
    interval: Arc<Mutex<Duration>>,
    is_running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerLogger {
    /// Create a logger writing to `path`, truncating any existing file and
    /// emitting the header row.
    pub fn new(kernel: Arc<Kernel>, path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{CSV_HEADER}")?;
        writer.flush()?;

        Ok(Self {
            kernel,
            writer: Arc::new(Mutex::new(writer)),
            interval: Arc::new(Mutex::new(DEFAULT_LOGGING_INTERVAL)),
            is_running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        })
    }

    /// Change the sampling interval; takes effect from the next sample.
    pub fn set_logging_interval(&self, interval: Duration) {
        *self.interval.lock() = interval;
    }

    /// Start the sampling thread. Idempotent.
    pub fn start(&self) {
        if self.is_running.swap(true, Ordering::AcqRel) {
            return;
        }

        let kernel = self.kernel.clone();
        let writer = self.writer.clone();
        let interval = self.interval.clone();
        let is_running = self.is_running.clone();

        let handle = thread::Builder::new()
            .name("edurtos-sched-logger".to_string())
            .spawn(move || {
                while is_running.load(Ordering::Acquire) {
                    log_scheduler_state(&kernel, &writer);
                    thread::sleep(*interval.lock());
                }
            })
            .expect("failed to spawn scheduler logger thread");
        *self.handle.lock() = Some(handle);
    }

    /// Stop the sampling thread and flush the file.
    pub fn stop(&self) {
        if !self.is_running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
        self.flush();
    }

    /// Write a free-form event row.
    pub fn log_event(&self, event_type: &str, message: &str) {
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "{},{event_type},{message},,,,,,,,", timestamp_ms());
    }

    /// Flush buffered rows to disk.
    pub fn flush(&self) {
        let _ = self.writer.lock().flush();
    }
}

impl Drop for SchedulerLogger {
    fn drop(&mut self) {
        self.stop();
    }
}

fn log_scheduler_state(kernel: &Kernel, writer: &Mutex<BufWriter<File>>) {
    let scheduler = kernel.scheduler();
    let tasks = scheduler.all_tasks();
    let current = scheduler.current_task();
    let cpu_utilization = scheduler.cpu_utilization();

    for task in &tasks {
        let event = match &current {
            Some(c) if c.id() == task.id() => "RUNNING",
            _ => "STATE_UPDATE",
        };
        log_task_state(writer, task, event);
    }

    let mut writer = writer.lock();
    let _ = writeln!(
        writer,
        "{},CPU_UTILIZATION,,,,,,,,,{cpu_utilization:.2}",
        timestamp_ms()
    );
}

fn log_task_state(writer: &Mutex<BufWriter<File>>, task: &Task, event: &str) {
    let stats = task.stats();
    let deadline_ms = task.deadline().as_millis();
    let deadline_percent = if deadline_ms > 0 {
        100.0 * stats.deadline_counter.as_millis() as f32 / deadline_ms as f32
    } else {
        0.0
    };
    let avg_exec_ms = stats.average_execution_time.as_micros() as f32 / 1000.0;

    let mut writer = writer.lock();
    let _ = writeln!(
        writer,
        "{},{event},{},{},{},{deadline_ms},{deadline_percent:.2},{},{},{avg_exec_ms:.3},",
        timestamp_ms(),
        task.name(),
        state_name(task.state()),
        task.dynamic_priority(),
        stats.execution_count,
        stats.deadline_misses,
    );
}

fn state_name(state: TaskState) -> &'static str {
    match state {
        TaskState::Ready => "READY",
        TaskState::Running => "RUNNING",
        TaskState::Blocked => "BLOCKED",
        TaskState::Suspended => "SUSPENDED",
        TaskState::Terminated => "TERMINATED",
    }
}

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
