//! The "run playlist" entry point: one synchronous execution of one playlist.
//!
//! ```text
//! store ─▶ resolve ─▶ aggregate ─▶ pipeline ─▶ describe ─▶ execute
//! ```
//!
//! Every abort happens before the executor, so a failed run leaves the remote
//! playlist untouched. Runs share no state; each one starts again from the store
//! and the catalog.

use crate::aggregator::TrackAggregator;
use crate::catalog::Catalog;
use crate::error::{RunError, RunResult};
use crate::executor::{describe, PlaylistExecutor};
use crate::pipeline::Pipeline;
use crate::resolver::PartResolver;
use crate::scheduler::Clock;
use crate::store::PlaylistStore;
use log::{error, info};

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Concrete sources after resolution.
    pub sources: usize,
    /// Tracks written to the remote playlist.
    pub tracks: usize,
    pub uri: String,
    pub description: String,
}

pub struct PlaylistRunner<'a> {
    store: &'a dyn PlaylistStore,
    catalog: &'a dyn Catalog,
    clock: &'a dyn Clock,
    shuffle_seed: Option<u64>,
}

impl<'a> PlaylistRunner<'a> {
    pub fn new(store: &'a dyn PlaylistStore, catalog: &'a dyn Catalog, clock: &'a dyn Clock) -> Self {
        Self {
            store,
            catalog,
            clock,
            shuffle_seed: None,
        }
    }

    /// Fix the shuffle order of every run made by this runner.
    #[must_use]
    pub fn with_shuffle_seed(mut self, seed: Option<u64>) -> Self {
        self.shuffle_seed = seed;
        self
    }

    pub fn run_playlist(&self, username: &str, name: &str) -> RunResult<RunSummary> {
        let result = self.try_run(username, name);
        if let Err(e) = &result {
            error!("run of {username} / {name} aborted: {e}");
        }
        result
    }

    fn try_run(&self, username: &str, name: &str) -> RunResult<RunSummary> {
        let user = self
            .store
            .get_user(username)
            .map_err(RunError::Store)?
            .ok_or_else(|| RunError::not_found(format!("user {username}")))?;
        if !user.linked {
            return Err(RunError::Unlinked(username.to_string()));
        }
        let playlist = self
            .store
            .get_playlist(username, name)
            .map_err(RunError::Store)?
            .ok_or_else(|| RunError::not_found(format!("playlist {username} / {name}")))?;

        let Some(uri) = playlist.target_uri.clone() else {
            return Err(RunError::NoTarget {
                owner: username.to_string(),
                name: name.to_string(),
            });
        };
        if !playlist.has_sources() {
            return Err(RunError::EmptyComposition {
                owner: username.to_string(),
                name: name.to_string(),
            });
        }

        let resolved = PartResolver::new(self.store).resolve(&playlist)?;

        let sample = usize::try_from(playlist.recommendation_sample).unwrap_or(usize::MAX);
        let tracks = TrackAggregator::new(self.catalog).aggregate(
            &user,
            &resolved,
            playlist.include_recommendations,
            sample,
        )?;

        let today = self.clock.now().date_naive();
        let output = Pipeline::for_playlist(&playlist, today, self.shuffle_seed).run(tracks);

        let description = describe(
            &resolved.part_names(),
            playlist.description_overwrite.as_deref(),
            playlist.description_suffix.as_deref(),
        );
        PlaylistExecutor::new(self.catalog).execute(&user, &output, &uri, &description)?;

        info!(
            "ran {username} / {name}: {} source(s), {} track(s) -> {uri}",
            resolved.len(),
            output.len()
        );
        Ok(RunSummary {
            sources: resolved.len(),
            tracks: output.len(),
            uri,
            description,
        })
    }
}
