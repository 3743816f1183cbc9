//! Track aggregation: fetch every resolved source from the catalog, in order, and
//! optionally append a recommendation sample.
//!
//! A failing source contributes nothing and is logged. Only when every catalog
//! call for the composition fails does aggregation give up with
//! [`RunError::SourceUnavailable`].

use crate::catalog::Catalog;
use crate::error::{RunError, RunResult};
use crate::model::{ResolvedComposition, Track, TrackOrigin, User};
use log::{debug, warn};

/// Most seed tracks handed to the recommendation call.
pub const MAX_RECOMMENDATION_SEEDS: usize = 5;

pub struct TrackAggregator<'a> {
    catalog: &'a dyn Catalog,
}

impl<'a> TrackAggregator<'a> {
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self { catalog }
    }

    pub fn aggregate(
        &self,
        user: &User,
        resolved: &ResolvedComposition,
        want_recommendations: bool,
        sample_size: usize,
    ) -> RunResult<Vec<Track>> {
        let mut tracks = Vec::new();
        let mut failed = 0;

        for source in resolved.iter() {
            match self.catalog.tracks(user, source) {
                Ok(found) => {
                    debug!("{source}: {} track(s)", found.len());
                    tracks.extend(found);
                }
                Err(e) => {
                    warn!("skipping {source} for {}: {e:#}", user.username);
                    failed += 1;
                }
            }
        }

        if failed > 0 && failed == resolved.len() {
            return Err(RunError::SourceUnavailable { failed });
        }

        if want_recommendations && sample_size > 0 && !tracks.is_empty() {
            let seeds = recommendation_seeds(&tracks);
            match self.catalog.recommendations(user, &seeds, sample_size) {
                Ok(recommended) => {
                    debug!(
                        "{} recommendation(s) from {} seed(s)",
                        recommended.len(),
                        seeds.len()
                    );
                    tracks.extend(
                        recommended
                            .into_iter()
                            .take(sample_size)
                            .map(|t| t.with_origin(TrackOrigin::Recommendation)),
                    );
                }
                Err(e) => warn!("recommendations for {} unavailable: {e:#}", user.username),
            }
        }

        Ok(tracks)
    }
}

/// Evenly spaced seeds across the aggregated tracks, so reruns on unchanged
/// sources ask for the same recommendations.
fn recommendation_seeds(tracks: &[Track]) -> Vec<Track> {
    let count = tracks.len().min(MAX_RECOMMENDATION_SEEDS);
    if count == 0 {
        return Vec::new();
    }
    let step = tracks.len() / count;
    tracks.iter().step_by(step).take(count).cloned().collect()
}
