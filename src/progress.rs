//! Run aggregation and progress reporting
//!
//! [`RunAggregator`] is the only state workers share besides the admission
//! semaphore. Both counters sit behind one mutex so a snapshot is always
//! consistent.

use crate::{format_duration, CaptureTask, ScreenshotError};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Counters for one capture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunResult {
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
}

impl RunResult {
    pub fn succeeded(&self) -> usize {
        self.completed - self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total_tasks
    }
}

#[derive(Debug, Default)]
struct Counts {
    completed: usize,
    failed: usize,
}

/// Thread-safe completion counters, scoped to a single run.
#[derive(Debug)]
pub struct RunAggregator {
    total: usize,
    counts: Mutex<Counts>,
    start_time: Instant,
}

impl RunAggregator {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            counts: Mutex::new(Counts::default()),
            start_time: Instant::now(),
        }
    }

    /// Records one finished task and returns the counters after the update.
    pub fn record_outcome(&self, success: bool) -> RunResult {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        debug_assert!(counts.completed < self.total, "more outcomes than tasks");
        counts.completed += 1;
        if !success {
            counts.failed += 1;
        }
        self.result_of(&counts)
    }

    pub fn snapshot(&self) -> RunResult {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        self.result_of(&counts)
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Completed tasks per second so far.
    pub fn rate(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.snapshot().completed as f64 / elapsed
        } else {
            0.0
        }
    }

    fn result_of(&self, counts: &Counts) -> RunResult {
        RunResult {
            total_tasks: self.total,
            completed: counts.completed,
            failed: counts.failed,
        }
    }
}

/// How a single task ended.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task: CaptureTask,
    pub duration: Duration,
    pub error: Option<ScreenshotError>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Receives exactly one notification per finished task.
pub trait ProgressObserver: Send + Sync {
    fn on_task_finished(&self, outcome: &TaskOutcome, progress: RunResult);
}

/// Writes one log line per finished task.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_task_finished(&self, outcome: &TaskOutcome, progress: RunResult) {
        let task = &outcome.task;
        match &outcome.error {
            None => info!(
                "[{}/{}] {} ({}) -> {} in {}",
                progress.completed,
                progress.total_tasks,
                task.target_url,
                task.device.name,
                task.output_path.display(),
                format_duration(outcome.duration)
            ),
            Some(e) => warn!(
                kind = e.kind(),
                "[{}/{}] Error: {} ({}): {}",
                progress.completed,
                progress.total_tasks,
                task.target_url,
                task.device.name,
                e
            ),
        }
    }
}
