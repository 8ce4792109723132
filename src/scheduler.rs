//! Bounded-concurrency capture scheduling
//!
//! Every task gets its own tokio task, but only `concurrency_limit` of them may
//! hold an admission permit at once. Permits are taken in build order, so the
//! task list fixes dispatch order; completion order is unconstrained. Workers
//! report outcomes over a channel to a single collector that updates the
//! [`RunAggregator`] and notifies the [`ProgressObserver`].

use crate::{
    CaptureRequest, CaptureTask, Capturer, LogProgress, ProgressObserver, RunAggregator,
    RunResult, ScreenshotError, TaskOutcome, DEFAULT_TASK_TIMEOUT,
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error, info};

pub struct CaptureScheduler {
    capturer: Arc<dyn Capturer>,
    observer: Arc<dyn ProgressObserver>,
    settle_delay: Duration,
    task_timeout: Duration,
}

impl CaptureScheduler {
    pub fn new(capturer: Arc<dyn Capturer>, settle_delay: Duration) -> Self {
        Self {
            capturer,
            observer: Arc::new(LogProgress),
            settle_delay,
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }

    pub fn with_task_timeout(mut self, task_timeout: Duration) -> Self {
        self.task_timeout = task_timeout;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Runs every task to a terminal state and returns the final counters.
    ///
    /// `concurrency_limit` must be positive; callers validate it up front.
    /// Failures are counted, never propagated, and never stop other tasks.
    pub async fn run(&self, tasks: Vec<CaptureTask>, concurrency_limit: usize) -> RunResult {
        debug_assert!(concurrency_limit > 0, "concurrency limit must be positive");

        let aggregator = RunAggregator::new(tasks.len());
        let semaphore = Arc::new(Semaphore::new(concurrency_limit));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<TaskOutcome>();

        info!(
            "Capturing {} screenshots with concurrency {}",
            tasks.len(),
            concurrency_limit
        );

        let dispatch = async move {
            let mut workers = Vec::with_capacity(tasks.len());

            for task in tasks {
                // The semaphore is local to this run and never closed.
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                debug!(
                    "Dispatching task {}: {} ({})",
                    task.index, task.target_url, task.device.name
                );

                let worker = Worker {
                    capturer: self.capturer.clone(),
                    settle_delay: self.settle_delay,
                    task_timeout: self.task_timeout,
                };
                let outcomes = outcome_tx.clone();
                let spawned = task.clone();
                let handle = tokio::spawn(async move {
                    let outcome = worker.run(spawned, permit).await;
                    let _ = outcomes.send(outcome);
                });
                workers.push((task, handle));
            }

            for (task, handle) in workers {
                if let Err(e) = handle.await {
                    error!("Worker for task {} did not finish: {}", task.index, e);
                    let _ = outcome_tx.send(TaskOutcome {
                        task,
                        duration: Duration::ZERO,
                        error: Some(ScreenshotError::Capture(format!("worker aborted: {e}"))),
                    });
                }
            }
        };

        let collect = async {
            while let Some(outcome) = outcome_rx.recv().await {
                let progress = aggregator.record_outcome(outcome.is_success());
                crate::metrics::record_screenshot(outcome.duration, outcome.error.as_ref());
                self.observer.on_task_finished(&outcome, progress);
            }
        };

        tokio::join!(dispatch, collect);

        let result = aggregator.snapshot();
        info!(
            "Run finished in {:?}: {} succeeded, {} failed ({:.2} tasks/s)",
            aggregator.elapsed(),
            result.succeeded(),
            result.failed,
            aggregator.rate()
        );
        result
    }
}

struct Worker {
    capturer: Arc<dyn Capturer>,
    settle_delay: Duration,
    task_timeout: Duration,
}

impl Worker {
    /// `_permit` is held until the capture and the write are done.
    async fn run(self, task: CaptureTask, _permit: OwnedSemaphorePermit) -> TaskOutcome {
        let start = Instant::now();

        let result = match timeout(self.task_timeout, self.capture_and_store(&task)).await {
            Ok(result) => result,
            Err(_) => Err(ScreenshotError::Timeout(self.task_timeout)),
        };

        TaskOutcome {
            task,
            duration: start.elapsed(),
            error: result.err(),
        }
    }

    async fn capture_and_store(&self, task: &CaptureTask) -> Result<(), ScreenshotError> {
        let request = CaptureRequest {
            url: task.target_url.clone(),
            device: task.device.clone(),
            settle_delay: self.settle_delay,
            timeout: self.task_timeout,
        };

        let image = self.capturer.capture(&request).await?;
        write_screenshot(&task.output_path, &image, task.index).await
    }
}

/// Writes `data` to `path`, creating parent directories as needed.
///
/// The bytes land in a task-specific temporary file first and are renamed into
/// place, so a reader never sees a partially written image even when two tasks
/// share a path. The temporary name does not grow with the final name, so any
/// name the filesystem accepts for `path` also works for the write.
pub async fn write_screenshot(path: &Path, data: &[u8], task_index: usize) -> Result<(), ScreenshotError> {
    if let Some(parent) = path.parent() {
        create_output_dir(parent).await?;
    }

    let tmp_path = path.with_file_name(format!(".tmp-{task_index}"));

    if let Err(e) = tokio::fs::write(&tmp_path, data).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(ScreenshotError::Io(format!("{}: {e}", path.display())));
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(ScreenshotError::Io(format!("{}: {e}", path.display())));
    }
    Ok(())
}

async fn create_output_dir(dir: &Path) -> Result<(), ScreenshotError> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o755);
    builder
        .create(dir)
        .await
        .map_err(|e| ScreenshotError::Io(format!("{}: {e}", dir.display())))
}
