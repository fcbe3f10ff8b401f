//! Virtual timer device
//!
//! Polled by the host loop via `update()`; fires its callback when the
//! configured interval has elapsed. One-shot timers stop themselves after
//! firing.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Firing behavior of a timer
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimerMode {
    /// Fire once, then stop
    OneShot,
    /// Fire on every elapsed interval
    Periodic,
}

struct TimerInner {
    interval: Duration,
    mode: TimerMode,
    callback: Option<Box<dyn FnMut() + Send>>,
    last_trigger: Option<Instant>,
}

/// Virtual timer
pub struct VirtualTimer {
    running: AtomicBool,
    inner: Mutex<TimerInner>,
}

impl VirtualTimer {
    /// Create a stopped timer
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            inner: Mutex::new(TimerInner {
                interval: Duration::ZERO,
                mode: TimerMode::OneShot,
                callback: None,
                last_trigger: None,
            }),
        }
    }

    /// Arm the timer
    pub fn start(&self, interval: Duration, mode: TimerMode) {
        let mut inner = self.inner.lock();
        inner.interval = interval;
        inner.mode = mode;
        inner.last_trigger = Some(Instant::now());
        drop(inner);
        self.running.store(true, Ordering::Release);
    }

    /// Disarm the timer
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Whether the timer is armed
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Install the callback fired on each trigger, replacing any previous
    /// one
    pub fn register_callback<F>(&self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.inner.lock().callback = Some(Box::new(callback));
    }

    /// Poll the timer; fires the callback when the interval has elapsed.
    ///
    /// Meant to be called periodically by the host loop.
    pub fn update(&self) {
        if !self.is_running() {
            return;
        }

        let mut inner = self.inner.lock();
        let due = match inner.last_trigger {
            Some(last) => last.elapsed() >= inner.interval,
            None => false,
        };
        if !due || inner.callback.is_none() {
            return;
        }

        inner.last_trigger = Some(Instant::now());
        let one_shot = inner.mode == TimerMode::OneShot;
        if let Some(callback) = inner.callback.as_mut() {
            callback();
        }
        drop(inner);

        if one_shot {
            self.stop();
        }
    }
}

impl Default for VirtualTimer {
    fn default() -> Self {
        Self::new()
    }
}
