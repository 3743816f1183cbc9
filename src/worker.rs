//! # Task Worker
//!
//! Delivers deferred executions from the SQLite task queue once their
//! `not_before` has passed.
//!
//! ## Delivery
//!
//! Each poll loads every due task and hands its payload to the [`Dispatcher`]:
//!
//! - success: the task is removed
//! - transient failure (catalog or store trouble): the task is pushed back by
//!   `retry_delay_secs` until it has been attempted `max_attempts` times, then
//!   dropped with an error log
//! - permanent failure (missing playlist, nothing to resolve, no target): dropped
//!   at once, redelivery would only fail the same way
//!
//! ## Background Process
//!
//! `mixtape worker start` forks and runs [`Worker::run_forever`] in the child.
//! The child records its PID in a file next to the database; `stop` and
//! `status` go through that file. [`is_worker_running`] probes the PID with
//! `kill -0`, [`stop_worker`] sends `SIGTERM`.

use crate::config::RuntimeConfig;
use crate::dispatch::Dispatcher;
use crate::scheduler::Clock;
use crate::tasks::{QueuedTask, SqliteTaskQueue};
use anyhow::{bail, Context, Result};
use chrono::Duration as ChronoDuration;
use log::{debug, error, info, warn};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

/// Counts of one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub completed: usize,
    pub retried: usize,
    pub dropped: usize,
}

impl PollReport {
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.completed + self.retried + self.dropped
    }
}

pub struct Worker<'a> {
    queue: &'a SqliteTaskQueue,
    dispatcher: Dispatcher<'a>,
    clock: &'a dyn Clock,
    max_attempts: u32,
    retry_delay_secs: u64,
    poll_interval: Duration,
}

impl<'a> Worker<'a> {
    pub fn new(
        queue: &'a SqliteTaskQueue,
        dispatcher: Dispatcher<'a>,
        clock: &'a dyn Clock,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            clock,
            max_attempts: config.max_attempts.max(1),
            retry_delay_secs: config.retry_delay_secs,
            poll_interval: config.poll_interval(),
        }
    }

    /// Deliver every task due now.
    pub fn run_once(&self) -> Result<PollReport> {
        let now = self.clock.now();
        let mut report = PollReport::default();

        for task in self.queue.due(now)? {
            match self.dispatcher.dispatch(&task.payload) {
                Ok(_) => {
                    self.queue.complete(task.id)?;
                    report.completed += 1;
                }
                Err(e) if e.is_transient() && task.attempts + 1 < self.max_attempts => {
                    let delay = ChronoDuration::try_seconds(
                        i64::try_from(self.retry_delay_secs).unwrap_or(i64::MAX),
                    )
                    .unwrap_or(ChronoDuration::MAX);
                    let next = now.checked_add_signed(delay).unwrap_or(now);
                    warn!(
                        "{} failed (attempt {} of {}), retrying at {next}: {e}",
                        task.payload,
                        task.attempts + 1,
                        self.max_attempts
                    );
                    self.queue.reschedule(task.id, next)?;
                    report.retried += 1;
                }
                Err(e) => {
                    self.drop_task(&task, &e.to_string())?;
                    report.dropped += 1;
                }
            }
        }

        if report.delivered() > 0 {
            info!(
                "delivered {} task(s): {} completed, {} retried, {} dropped",
                report.delivered(),
                report.completed,
                report.retried,
                report.dropped
            );
        }
        Ok(report)
    }

    fn drop_task(&self, task: &QueuedTask, reason: &str) -> Result<()> {
        error!(
            "dropping {} after {} attempt(s): {reason}",
            task.payload,
            task.attempts + 1
        );
        self.queue.complete(task.id)
    }

    /// Poll until the process is terminated. Writes `pid_file` first.
    pub fn run_forever(&self, pid_file: &Path) -> Result<()> {
        let pid = std::process::id();
        fs::write(pid_file, pid.to_string())
            .with_context(|| format!("Failed to write PID file {}", pid_file.display()))?;
        info!("worker started with PID {pid}");

        loop {
            if let Err(e) = self.run_once() {
                error!("worker poll failed: {e:#}");
            }
            debug!("sleeping {:?}", self.poll_interval);
            thread::sleep(self.poll_interval);
        }
    }
}

fn read_pid(pid_file: &Path) -> Result<u32> {
    let pid_str = fs::read_to_string(pid_file)
        .with_context(|| format!("Failed to read PID file {}", pid_file.display()))?;
    pid_str.trim().parse().context("Invalid PID in worker file")
}

/// Whether the worker recorded in `pid_file` is alive.
pub fn is_worker_running(pid_file: &Path) -> Result<bool> {
    if !pid_file.exists() {
        return Ok(false);
    }
    let pid = read_pid(pid_file)?;

    match Command::new("kill").args(["-0", &pid.to_string()]).status() {
        Ok(status) => Ok(status.success()),
        Err(_) => Ok(false),
    }
}

/// Terminate the worker recorded in `pid_file` and remove the file.
pub fn stop_worker(pid_file: &Path) -> Result<u32> {
    if !pid_file.exists() {
        bail!("Worker is not running");
    }
    let pid = read_pid(pid_file)?;

    Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()
        .context("Failed to stop worker")?;
    fs::remove_file(pid_file)?;

    info!("worker stopped (PID: {pid})");
    Ok(pid)
}
