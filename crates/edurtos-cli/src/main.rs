//! EduRTOS demo driver
//!
//! Builds a small mixed task set (periodic, CPU-intensive, recoverable and
//! cooperative), runs the scheduler for a fixed duration and periodically
//! prints the task-state visualization. Optionally logs scheduler decisions
//! to CSV and injects faults through the public task-control API.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use edurtos_core::drivers::{BaudRate, Hal, PinMode, TimerMode};
use edurtos_core::util::{FaultInjector, SchedulerLogger};
use edurtos_core::{Kernel, PreemptionMode, SchedulePolicy, TaskFault, TaskSpec};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "edurtos")]
#[command(about = "Educational RTOS simulator demo", long_about = None)]
#[command(version)]
struct Cli {
    /// How long to run, in seconds
    #[arg(short, long, default_value_t = 10)]
    duration: u64,

    /// Preemption mode
    #[arg(long, value_enum, default_value_t = ModeArg::Hybrid)]
    mode: ModeArg,

    /// Time slice for preemptive tasks, in milliseconds
    #[arg(long, default_value_t = 50)]
    time_slice: u64,

    /// Write a CSV scheduler log to this file
    #[arg(long)]
    log: Option<PathBuf>,

    /// Enable periodic fault injection
    #[arg(long)]
    inject_faults: bool,

    /// Seconds between status printouts
    #[arg(long, default_value_t = 5)]
    status_interval: u64,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    None,
    TimeSlice,
    Priority,
    Hybrid,
}

impl From<ModeArg> for PreemptionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::None => PreemptionMode::None,
            ModeArg::TimeSlice => PreemptionMode::TimeSlice,
            ModeArg::Priority => PreemptionMode::Priority,
            ModeArg::Hybrid => PreemptionMode::Hybrid,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    println!("EduRTOS demo");
    println!("------------");

    let hal = Arc::new(Hal::new());
    hal.gpio().set_pin_mode(5, PinMode::Output);
    hal.uart().configure(BaudRate::Baud115200);
    hal.timer().register_callback(|| {
        println!("timer: periodic tick");
    });
    hal.timer().start(Duration::from_secs(1), TimerMode::Periodic);

    let kernel = Arc::new(Kernel::new());
    kernel.initialize();
    kernel
        .scheduler()
        .set_preemption_mode(cli.mode.into());
    kernel
        .scheduler()
        .set_time_slice(Duration::from_millis(cli.time_slice));

    let logger = match &cli.log {
        Some(path) => {
            let logger = SchedulerLogger::new(kernel.clone(), path)?;
            logger.start();
            logger.log_event("SYSTEM", "demo started");
            Some(logger)
        }
        None => None,
    };

    create_demo_tasks(&kernel, &hal)?;
    if let Some(logger) = &logger {
        logger.log_event("SYSTEM", "tasks created");
    }

    let injector = if cli.inject_faults {
        let injector = FaultInjector::new(kernel.clone());
        injector.set_fault_probability(0.2);
        injector.start(Duration::from_secs(5));
        Some(injector)
    } else {
        None
    };

    kernel.start();
    println!("running for {} seconds...", cli.duration);

    let started = Instant::now();
    let run_for = Duration::from_secs(cli.duration);
    let status_every = Duration::from_secs(cli.status_interval.max(1));
    let mut next_status = started + status_every;

    while started.elapsed() < run_for {
        hal.timer().update();

        if Instant::now() >= next_status {
            next_status += status_every;
            println!("--------------------------------------------------");
            println!("{}", kernel.scheduler().task_state_visualization());
            println!(
                "CPU utilization: {:.1}%",
                kernel.scheduler().cpu_utilization()
            );
            println!("--------------------------------------------------");
        }

        thread::sleep(Duration::from_millis(50));
    }

    println!("demo finished, stopping...");
    if let Some(injector) = &injector {
        injector.stop();
    }
    kernel.stop();
    if let Some(logger) = &logger {
        logger.log_event("SYSTEM", "demo stopped");
        logger.stop();
    }

    println!("{}", kernel.scheduler().task_state_visualization());
    if let Some(path) = &cli.log {
        println!("scheduler decisions logged to {}", path.display());
    }
    Ok(())
}

fn create_demo_tasks(kernel: &Arc<Kernel>, hal: &Arc<Hal>) -> Result<()> {
    // Periodic UART ticker.
    let uart_hal = hal.clone();
    let mut ticks = 0u64;
    kernel.create_task(
        "Periodic",
        Box::new(move || {
            ticks += 1;
            uart_hal.uart().transmit(&format!("periodic tick {ticks}"));
            thread::sleep(Duration::from_millis(20));
            Ok(())
        }),
        TaskSpec {
            priority: 50,
            period: Duration::from_millis(100),
            deadline: Duration::from_millis(90),
            ..TaskSpec::default()
        },
    )?;

    // CPU hog with an uneven workload; blinks the virtual LED.
    let led_hal = hal.clone();
    let mut iterations = 0u64;
    let mut led_state = false;
    kernel.create_task(
        "CpuIntensive",
        Box::new(move || {
            iterations += 1;
            let work = if iterations % 5 == 0 { 150 } else { 30 };
            thread::sleep(Duration::from_millis(work));
            led_state = !led_state;
            led_hal.gpio().write_pin(5, led_state);
            Ok(())
        }),
        TaskSpec {
            priority: 30,
            period: Duration::from_millis(200),
            deadline: Duration::from_millis(100),
            ..TaskSpec::default()
        },
    )?;

    // Fails every third run; recoverable, so a failure puts it straight
    // back in the ready state instead of terminating it.
    let mut runs = 0u64;
    kernel.create_task(
        "Recoverable",
        Box::new(move || {
            runs += 1;
            if runs % 3 == 0 {
                return Err(TaskFault::new("simulated failure"));
            }
            thread::sleep(Duration::from_millis(10));
            Ok(())
        }),
        TaskSpec {
            priority: 70,
            period: Duration::from_millis(300),
            deadline: Duration::from_millis(50),
            recoverable: true,
            ..TaskSpec::default()
        },
    )?;

    // Works in chunks, yielding between them.
    let yield_kernel = kernel.clone();
    let mut chunk = 0u64;
    kernel.create_task(
        "Cooperative",
        Box::new(move || {
            chunk = chunk % 5 + 1;
            thread::sleep(Duration::from_millis(10));
            if chunk < 5 {
                yield_kernel.scheduler().yield_now();
            }
            Ok(())
        }),
        TaskSpec {
            priority: 40,
            policy: SchedulePolicy::Cooperative,
            period: Duration::from_millis(500),
            ..TaskSpec::default()
        },
    )?;

    Ok(())
}
