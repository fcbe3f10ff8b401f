//! Fault injection harness
//!
//! Exercises failure paths by driving the public task-control API only:
//! deadlocks are simulated by suspending a task, terminations by killing
//! one (which sends recoverable tasks through the scheduler's recovery
//! path). An injection thread rolls the dice periodically; faults can also
//! be injected by hand.

use crate::scheduler::{Task, TaskState};
use crate::Kernel;
use parking_lot::Mutex;
use rand::Rng;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often the injection thread checks for shutdown.
const INJECTION_TICK: Duration = Duration::from_millis(100);

/// Kind of fault to inject
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FaultType {
    /// Suspend the target without resuming it (deadlock simulation)
    Deadlock,
    /// Terminate the target outright
    Termination,
}

const ALL_FAULT_TYPES: [FaultType; 2] = [FaultType::Deadlock, FaultType::Termination];

struct FaultConfig {
    probability: f64,
    enabled: FxHashMap<FaultType, bool>,
    weights: FxHashMap<FaultType, f64>,
}

/// Periodic fault injector driving a kernel's public API
pub struct FaultInjector {
    kernel: Arc<Kernel>,
    config: Arc<Mutex<FaultConfig>>,
    is_running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FaultInjector {
    /// Create an injector with every fault type enabled at equal weight and
    /// a 10% injection probability.
    pub fn new(kernel: Arc<Kernel>) -> Self {
        let mut enabled = FxHashMap::default();
        let mut weights = FxHashMap::default();
        for fault in ALL_FAULT_TYPES {
            enabled.insert(fault, true);
            weights.insert(fault, 1.0);
        }

        Self {
            kernel,
            config: Arc::new(Mutex::new(FaultConfig {
                probability: 0.1,
                enabled,
                weights,
            })),
            is_running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Chance of injecting a fault at each interval, clamped into `[0, 1]`
    pub fn set_fault_probability(&self, probability: f64) {
        self.config.lock().probability = probability.clamp(0.0, 1.0);
    }

    /// Enable or disable one fault type
    pub fn enable_fault_type(&self, fault: FaultType, enable: bool) {
        self.config.lock().enabled.insert(fault, enable);
    }

    /// Set the selection weight of one fault type (negative weights are
    /// treated as zero)
    pub fn set_fault_type_weight(&self, fault: FaultType, weight: f64) {
        self.config.lock().weights.insert(fault, weight.max(0.0));
    }

    /// Start the injection thread. Idempotent.
    pub fn start(&self, injection_interval: Duration) {
        if self.is_running.swap(true, Ordering::AcqRel) {
            return;
        }

        let kernel = self.kernel.clone();
        let config = self.config.clone();
        let is_running = self.is_running.clone();

        let handle = thread::Builder::new()
            .name("edurtos-fault-injector".to_string())
            .spawn(move || {
                let mut rng = rand::thread_rng();
                let mut next_injection = Instant::now() + injection_interval;

                while is_running.load(Ordering::Acquire) {
                    thread::sleep(INJECTION_TICK.min(injection_interval));
                    if Instant::now() < next_injection {
                        continue;
                    }
                    next_injection = Instant::now() + injection_interval;

                    let (probability, candidates) = {
                        let config = config.lock();
                        (config.probability, enabled_weights(&config))
                    };
                    if rng.gen::<f64>() >= probability {
                        continue;
                    }
                    let Some(fault) = pick_weighted(&mut rng, &candidates) else {
                        continue;
                    };
                    let Some(task) = pick_random_task(&kernel, &mut rng) else {
                        continue;
                    };
                    inject(&kernel, fault, &task);
                }
            })
            .expect("failed to spawn fault injector thread");
        *self.handle.lock() = Some(handle);
    }

    /// Stop the injection thread.
    pub fn stop(&self) {
        if !self.is_running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    /// Whether the injection thread is running
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Inject one fault now, into the named task or a random one.
    ///
    /// Returns `false` when no suitable target exists.
    pub fn inject_fault(&self, fault: FaultType, target: Option<&str>) -> bool {
        let task = match target {
            Some(name) => match self.kernel.get_task(name) {
                Some(task) => task,
                None => {
                    eprintln!("fault injector: no task named '{name}'");
                    return false;
                }
            },
            None => {
                let mut rng = rand::thread_rng();
                match pick_random_task(&self.kernel, &mut rng) {
                    Some(task) => task,
                    None => {
                        eprintln!("fault injector: no tasks available");
                        return false;
                    }
                }
            }
        };
        inject(&self.kernel, fault, &task)
    }
}

impl Drop for FaultInjector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn enabled_weights(config: &FaultConfig) -> Vec<(FaultType, f64)> {
    ALL_FAULT_TYPES
        .into_iter()
        .filter(|fault| config.enabled.get(fault).copied().unwrap_or(false))
        .map(|fault| (fault, config.weights.get(&fault).copied().unwrap_or(0.0)))
        .filter(|&(_, weight)| weight > 0.0)
        .collect()
}

fn pick_weighted(rng: &mut impl Rng, candidates: &[(FaultType, f64)]) -> Option<FaultType> {
    let total: f64 = candidates.iter().map(|&(_, w)| w).sum();
    if total <= 0.0 {
        return None;
    }

    let mut roll = rng.gen_range(0.0..total);
    for &(fault, weight) in candidates {
        if roll < weight {
            return Some(fault);
        }
        roll -= weight;
    }
    candidates.last().map(|&(fault, _)| fault)
}

fn pick_random_task(kernel: &Kernel, rng: &mut impl Rng) -> Option<Arc<Task>> {
    let tasks: Vec<Arc<Task>> = kernel
        .scheduler()
        .all_tasks()
        .into_iter()
        .filter(|task| task.state() != TaskState::Terminated)
        .collect();
    if tasks.is_empty() {
        return None;
    }
    Some(tasks[rng.gen_range(0..tasks.len())].clone())
}

fn inject(kernel: &Kernel, fault: FaultType, task: &Arc<Task>) -> bool {
    eprintln!(
        "fault injector: injecting {fault:?} into task '{}'",
        task.name()
    );
    match fault {
        FaultType::Deadlock => kernel.suspend_task(task.name()).is_ok(),
        FaultType::Termination => {
            task.terminate();
            true
        }
    }
}
