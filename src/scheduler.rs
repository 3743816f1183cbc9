//! # Bulk Scheduler
//!
//! Spreads refresh work over time so the catalog's per-account rate limits are
//! never burst.
//!
//! - [`BulkScheduler::schedule_all_users`]: one "run user" execution per linked,
//!   unlocked account, staggered by [`USER_STAGGER_SECS`]
//! - [`BulkScheduler::schedule_user`]: one "run playlist" execution per playlist
//!   that has sources and a target, staggered by [`PLAYLIST_STAGGER_SECS`]
//!
//! The n-th eligible item (from zero) is delayed by [`delay`]`(n, stagger)`.
//! Ineligible items are skipped without affecting the numbering:
//!
//! ```text
//! users:   alice  bob(locked)  carol  dave
//! delay:   0s     -            30s    60s
//! ```
//!
//! All delays of one call are measured from a single instant taken from the
//! injected [`Clock`].

use crate::error::{RunError, RunResult};
use crate::store::PlaylistStore;
use crate::tasks::{ScheduledExecution, TaskPayload, TaskQueue};
use chrono::{DateTime, Utc};
use log::{debug, error, info, trace};

/// Seconds between consecutive account executions.
pub const USER_STAGGER_SECS: u64 = 30;

/// Seconds between consecutive playlist executions of one account.
pub const PLAYLIST_STAGGER_SECS: u64 = 6;

/// Delay of the `index`-th eligible item.
#[must_use]
pub const fn delay(index: usize, stagger_secs: u64) -> u64 {
    (index as u64).saturating_mul(stagger_secs)
}

/// Source of the current instant.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stopped at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub struct BulkScheduler<'a> {
    store: &'a dyn PlaylistStore,
    queue: &'a dyn TaskQueue,
    clock: &'a dyn Clock,
    user_stagger_secs: u64,
    playlist_stagger_secs: u64,
}

impl<'a> BulkScheduler<'a> {
    pub fn new(store: &'a dyn PlaylistStore, queue: &'a dyn TaskQueue, clock: &'a dyn Clock) -> Self {
        Self {
            store,
            queue,
            clock,
            user_stagger_secs: USER_STAGGER_SECS,
            playlist_stagger_secs: PLAYLIST_STAGGER_SECS,
        }
    }

    #[must_use]
    pub fn with_staggers(mut self, user_stagger_secs: u64, playlist_stagger_secs: u64) -> Self {
        self.user_stagger_secs = user_stagger_secs;
        self.playlist_stagger_secs = playlist_stagger_secs;
        self
    }

    pub fn schedule_all_users(&self) -> RunResult<Vec<ScheduledExecution>> {
        let now = self.clock.now();
        let users = self.store.list_users().map_err(RunError::Store)?;

        let mut emitted = Vec::new();
        for user in users.iter().filter(|user| user.is_eligible()) {
            let execution = ScheduledExecution::new(
                TaskPayload::run_user(&user.username),
                now,
                delay(emitted.len(), self.user_stagger_secs),
            );
            self.submit(&execution)?;
            emitted.push(execution);
        }

        info!(
            "scheduled {} of {} account(s)",
            emitted.len(),
            users.len()
        );
        Ok(emitted)
    }

    pub fn schedule_user(&self, username: &str) -> RunResult<Vec<ScheduledExecution>> {
        let now = self.clock.now();
        if self.store.get_user(username).map_err(RunError::Store)?.is_none() {
            return Err(RunError::not_found(format!("user {username}")));
        }
        let playlists = self.store.list_playlists(username).map_err(RunError::Store)?;

        let mut emitted = Vec::new();
        for playlist in &playlists {
            if !playlist.is_schedulable() {
                trace!("{username} / {} not schedulable, skipping", playlist.name);
                continue;
            }
            let execution = ScheduledExecution::new(
                TaskPayload::run_playlist(username, &playlist.name),
                now,
                delay(emitted.len(), self.playlist_stagger_secs),
            );
            // Once something is queued the fan-out counts as done; redelivering it
            // would queue those playlists twice.
            if let Err(e) = self.submit(&execution) {
                if emitted.is_empty() {
                    return Err(e);
                }
                error!(
                    "fan-out for {username} stopped after {} playlist(s), the rest wait for the next bulk run: {e}",
                    emitted.len()
                );
                break;
            }
            emitted.push(execution);
        }

        info!(
            "scheduled {} of {} playlist(s) for {username}",
            emitted.len(),
            playlists.len()
        );
        Ok(emitted)
    }

    fn submit(&self, execution: &ScheduledExecution) -> RunResult<()> {
        debug!("{} at +{}s", execution.payload, execution.delay_secs);
        self.queue.submit(execution).map_err(RunError::Transport)
    }
}
