//! Failure taxonomy of a playlist run.
//!
//! Every variant aborts the run before the remote playlist is touched.
//! [`RunError::RemoteWriteFailed`] is the listing overwrite itself being
//! rejected, which leaves the previous listing in place.
//! Per-part failures never show up here: the resolver and aggregator recover
//! from them locally and only escalate when nothing usable is left.

use thiserror::Error;

pub type RunResult<T> = std::result::Result<T, RunError>;

#[derive(Debug, Error)]
pub enum RunError {
    /// Owner or playlist missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Nothing left to aggregate after resolution.
    #[error("no parts to resolve for {owner} / {name}")]
    EmptyComposition { owner: String, name: String },

    /// The owner has no active catalog link; nothing can run until it is relinked.
    #[error("account {0} is not linked to the catalog service")]
    Unlinked(String),

    /// The playlist has never been provisioned remotely.
    #[error("no target playlist to populate for {owner} / {name}")]
    NoTarget { owner: String, name: String },

    /// Every catalog call of the run failed.
    #[error("catalog unavailable: all {failed} source(s) failed")]
    SourceUnavailable { failed: usize },

    #[error("failed to write remote playlist {uri}: {reason}")]
    RemoteWriteFailed { uri: String, reason: String },

    /// The persistence collaborator itself failed.
    #[error("store unavailable: {0:#}")]
    Store(anyhow::Error),

    /// The task transport refused a scheduled execution.
    #[error("task transport unavailable: {0:#}")]
    Transport(anyhow::Error),
}

impl RunError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Whether redelivering the same task could succeed without anyone editing
    /// the playlist first.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. }
                | Self::RemoteWriteFailed { .. }
                | Self::Store(_)
                | Self::Transport(_)
        )
    }
}
