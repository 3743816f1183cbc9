//! Routes a delivered [`TaskPayload`] to its entry point.
//!
//! "run user" fans out into staggered "run playlist" executions through the
//! scheduler; "run playlist" is a single [`PlaylistRunner`] run.

use crate::error::RunResult;
use crate::runner::{PlaylistRunner, RunSummary};
use crate::scheduler::BulkScheduler;
use crate::tasks::{MemoryTaskQueue, ScheduledExecution, TaskPayload};
use log::{info, warn};

#[derive(Debug)]
pub enum DispatchOutcome {
    Scheduled(Vec<ScheduledExecution>),
    Ran(RunSummary),
}

pub struct Dispatcher<'a> {
    scheduler: BulkScheduler<'a>,
    runner: PlaylistRunner<'a>,
}

/// Tally of an inline drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl<'a> Dispatcher<'a> {
    pub fn new(scheduler: BulkScheduler<'a>, runner: PlaylistRunner<'a>) -> Self {
        Self { scheduler, runner }
    }

    pub fn dispatch(&self, payload: &TaskPayload) -> RunResult<DispatchOutcome> {
        match payload {
            TaskPayload::RunUser { username } => self
                .scheduler
                .schedule_user(username)
                .map(DispatchOutcome::Scheduled),
            TaskPayload::RunPlaylist { username, name } => self
                .runner
                .run_playlist(username, name)
                .map(DispatchOutcome::Ran),
        }
    }

    /// Run everything in `queue` now, in submission order, ignoring `not_before`.
    ///
    /// Executions emitted while draining land in the same queue when the
    /// scheduler was built on it, and are drained too. Failures are logged and
    /// counted; they do not stop the drain.
    pub fn drain(&self, queue: &MemoryTaskQueue) -> DrainReport {
        let mut report = DrainReport::default();
        while let Some(execution) = queue.pop_front() {
            match self.dispatch(&execution.payload) {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    warn!("{} failed: {e}", execution.payload);
                    report.failed += 1;
                }
            }
        }
        info!(
            "inline drain finished: {} succeeded, {} failed",
            report.succeeded, report.failed
        );
        report
    }
}
