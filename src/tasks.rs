//! # Deferred Tasks
//!
//! The task-transport collaborator and the requests handed to it.
//!
//! A [`ScheduledExecution`] names one of the two deferred entry points through its
//! [`TaskPayload`], and carries the earliest time it may run. Once submitted to a
//! [`TaskQueue`] it belongs to the transport; the scheduler never reads it back.
//!
//! ```text
//! scheduler ──submit──▶ TaskQueue ──(not_before passes)──▶ worker ──▶ dispatch
//!                          ▲                                  │
//!                          └──────── reschedule on failure ───┘
//! ```
//!
//! [`SqliteTaskQueue`] is the durable transport drained by `mixtape worker`.
//! [`MemoryTaskQueue`] records submissions in order, for tests and inline mode.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::{debug, error, trace};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;

/// Which of the two entry points an execution targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTarget {
    /// Run every eligible playlist of one account.
    UserExecution,
    /// Run a single playlist.
    PlaylistExecution,
}

/// Body of a deferred invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    RunUser { username: String },
    RunPlaylist { username: String, name: String },
}

impl TaskPayload {
    pub fn run_user(username: impl Into<String>) -> Self {
        Self::RunUser {
            username: username.into(),
        }
    }

    pub fn run_playlist(username: impl Into<String>, name: impl Into<String>) -> Self {
        Self::RunPlaylist {
            username: username.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn target(&self) -> ExecutionTarget {
        match self {
            Self::RunUser { .. } => ExecutionTarget::UserExecution,
            Self::RunPlaylist { .. } => ExecutionTarget::PlaylistExecution,
        }
    }

    /// Endpoint the transport invokes with this payload.
    #[must_use]
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::RunUser { .. } => "/playlist/run/user/task",
            Self::RunPlaylist { .. } => "/playlist/run/task",
        }
    }
}

impl fmt::Display for TaskPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunUser { username } => write!(f, "run user {username}"),
            Self::RunPlaylist { username, name } => write!(f, "run playlist {username} / {name}"),
        }
    }
}

/// A request to invoke an entry point at or after `not_before`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledExecution {
    pub target: ExecutionTarget,
    pub payload: TaskPayload,
    /// Offset from the scheduling instant.
    pub delay_secs: u64,
    pub not_before: DateTime<Utc>,
}

impl ScheduledExecution {
    #[must_use]
    pub fn new(payload: TaskPayload, now: DateTime<Utc>, delay_secs: u64) -> Self {
        let offset = i64::try_from(delay_secs).unwrap_or(i64::MAX);
        let not_before = Duration::try_seconds(offset)
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            target: payload.target(),
            payload,
            delay_secs,
            not_before,
        }
    }
}

/// Task-transport collaborator: accepts an execution for at-least-once delivery.
pub trait TaskQueue {
    fn submit(&self, execution: &ScheduledExecution) -> Result<()>;
}

/// A task loaded back from [`SqliteTaskQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub id: i64,
    pub payload: TaskPayload,
    pub not_before: DateTime<Utc>,
    /// Deliveries already attempted.
    pub attempts: u32,
}

/// Durable task queue in SQLite.
pub struct SqliteTaskQueue {
    conn: Connection,
}

impl SqliteTaskQueue {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open task database at {}", db_path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id         INTEGER PRIMARY KEY,
                endpoint   TEXT    NOT NULL,
                payload    TEXT    NOT NULL,
                not_before INTEGER NOT NULL,
                attempts   INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_not_before ON tasks(not_before);",
        )
        .context("Failed to create task table")?;

        Ok(Self { conn })
    }

    /// Tasks whose `not_before` has passed, earliest first.
    ///
    /// A row whose payload no longer decodes can never be delivered; it is
    /// logged and deleted so it does not hold up the rest of the queue.
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<QueuedTask>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, payload, not_before, attempts FROM tasks
             WHERE not_before <= ?1 ORDER BY not_before, id",
        )?;
        let row_iter = stmt.query_map([now.timestamp()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, u32>(3)?,
            ))
        })?;

        let mut tasks = Vec::new();
        let mut undecodable = Vec::new();
        for row in row_iter {
            let (id, text, secs, attempts) = row.context("Queued task could not be read")?;
            match serde_json::from_str::<TaskPayload>(&text) {
                Ok(payload) => tasks.push(QueuedTask {
                    id,
                    payload,
                    not_before: Utc.timestamp_opt(secs, 0).single().unwrap_or_default(),
                    attempts,
                }),
                Err(e) => {
                    error!("dropping task {id} with undecodable payload {text}: {e}");
                    undecodable.push(id);
                }
            }
        }
        drop(stmt);

        for id in undecodable {
            self.complete(id)?;
        }
        trace!("{} task(s) due at {now}", tasks.len());
        Ok(tasks)
    }

    /// Remove a delivered task.
    pub fn complete(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM tasks WHERE id = ?1", [id])
            .with_context(|| format!("Failed to complete task {id}"))?;
        Ok(())
    }

    /// Record a failed delivery and push the task back to `next`.
    pub fn reschedule(&self, id: i64, next: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE tasks SET attempts = attempts + 1, not_before = ?2 WHERE id = ?1",
                [id, next.timestamp()],
            )
            .with_context(|| format!("Failed to reschedule task {id}"))?;
        Ok(())
    }

    /// Queue a raw payload string, bypassing encoding.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, payload: &str, not_before: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO tasks (endpoint, payload, not_before) VALUES ('/playlist/run/task', ?1, ?2)",
            params![payload, not_before.timestamp()],
        )?;
        Ok(())
    }

    pub fn pending_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl TaskQueue for SqliteTaskQueue {
    fn submit(&self, execution: &ScheduledExecution) -> Result<()> {
        let payload = serde_json::to_string(&execution.payload)?;
        self.conn
            .execute(
                "INSERT INTO tasks (endpoint, payload, not_before) VALUES (?1, ?2, ?3)",
                params![
                    execution.payload.endpoint(),
                    payload,
                    execution.not_before.timestamp()
                ],
            )
            .with_context(|| format!("Failed to enqueue {}", execution.payload))?;
        debug!(
            "queued {} for {} (+{}s)",
            execution.payload.endpoint(),
            execution.not_before,
            execution.delay_secs
        );
        Ok(())
    }
}

/// In-process queue keeping submissions in order.
#[derive(Debug, Default)]
pub struct MemoryTaskQueue {
    submitted: RefCell<VecDeque<ScheduledExecution>>,
    fail: RefCell<bool>,
    accept_limit: RefCell<Option<usize>>,
    accepted: RefCell<usize>,
}

impl MemoryTaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later submission fail.
    pub fn fail_submissions(&self, fail: bool) {
        *self.fail.borrow_mut() = fail;
    }

    /// Accept `limit` more submissions, then refuse the rest.
    pub fn fail_after(&self, limit: usize) {
        *self.accept_limit.borrow_mut() = Some(*self.accepted.borrow() + limit);
    }

    #[must_use]
    pub fn submitted(&self) -> Vec<ScheduledExecution> {
        self.submitted.borrow().iter().cloned().collect()
    }

    pub fn pop_front(&self) -> Option<ScheduledExecution> {
        self.submitted.borrow_mut().pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.submitted.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.submitted.borrow().is_empty()
    }
}

impl TaskQueue for MemoryTaskQueue {
    fn submit(&self, execution: &ScheduledExecution) -> Result<()> {
        let exhausted = self
            .accept_limit
            .borrow()
            .is_some_and(|limit| *self.accepted.borrow() >= limit);
        if *self.fail.borrow() || exhausted {
            anyhow::bail!("task transport refused {}", execution.payload);
        }
        self.submitted.borrow_mut().push_back(execution.clone());
        *self.accepted.borrow_mut() += 1;
        Ok(())
    }
}
