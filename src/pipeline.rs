//! # Processing Pipeline
//!
//! An ordered list of stateless [`Transform`]s applied left to right to the
//! aggregated tracks.
//!
//! | Transform                  | Effect                                                      |
//! |----------------------------|-------------------------------------------------------------|
//! | [`DeduplicateById`]        | keep the first occurrence of each id, order preserved       |
//! | [`SortReverseReleaseDate`] | newest first, stable on ties, undated tracks last           |
//! | [`Shuffle`]                | uniform permutation, optionally seeded                      |
//! | [`RecencyFilter`]          | keep releases inside the trailing window or allowed months  |
//!
//! Composition per playlist type:
//!
//! ```text
//! default: Dedup → (Shuffle | Sort)
//! recents: Dedup → Recency → (Shuffle | Sort)
//! ```
//!
//! Recommendation tracks never go through the transforms. [`Pipeline::run`] sets
//! them aside and appends them after the last transform, skipping any id that
//! already made it into the listing.

use crate::model::{Playlist, PlaylistType, RecentsOptions, Track};
use chrono::{Datelike, Days, NaiveDate};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;

/// A list-to-list step of the pipeline.
pub trait Transform {
    fn name(&self) -> &'static str;

    fn apply(&self, tracks: Vec<Track>) -> Vec<Track>;
}

/// Stable filter keeping the first occurrence of each track id.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeduplicateById;

impl Transform for DeduplicateById {
    fn name(&self) -> &'static str {
        "dedup"
    }

    fn apply(&self, tracks: Vec<Track>) -> Vec<Track> {
        let mut seen = HashSet::with_capacity(tracks.len());
        tracks
            .into_iter()
            .filter(|track| seen.insert(track.id.clone()))
            .collect()
    }
}

/// Descending release date. Ties keep their prior order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortReverseReleaseDate;

impl Transform for SortReverseReleaseDate {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn apply(&self, mut tracks: Vec<Track>) -> Vec<Track> {
        // Option orders None first, so reversing puts undated tracks at the end.
        tracks.sort_by(|a, b| b.release_date.cmp(&a.release_date));
        tracks
    }
}

/// Uniform random permutation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Shuffle {
    seed: Option<u64>,
}

impl Shuffle {
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }

    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }
}

impl Transform for Shuffle {
    fn name(&self) -> &'static str {
        "shuffle"
    }

    fn apply(&self, mut tracks: Vec<Track>) -> Vec<Track> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        tracks.shuffle(&mut rng);
        tracks
    }
}

/// Keeps tracks released on or after `today - day_boundary`, plus, when enabled,
/// anything released in the current or previous calendar month. Undated tracks
/// are dropped.
#[derive(Debug, Clone, Copy)]
pub struct RecencyFilter {
    boundary: NaiveDate,
    this_month: Option<(i32, u32)>,
    last_month: Option<(i32, u32)>,
}

impl RecencyFilter {
    #[must_use]
    pub fn new(today: NaiveDate, options: RecentsOptions) -> Self {
        let boundary = today
            .checked_sub_days(Days::new(u64::from(options.day_boundary)))
            .unwrap_or(NaiveDate::MIN);
        let previous = today
            .with_day(1)
            .and_then(|first| first.pred_opt())
            .map(|d| (d.year(), d.month()));

        Self {
            boundary,
            this_month: options
                .add_this_month
                .then_some((today.year(), today.month())),
            last_month: if options.add_last_month { previous } else { None },
        }
    }

    #[must_use]
    pub fn boundary(&self) -> NaiveDate {
        self.boundary
    }

    fn keeps(&self, released: NaiveDate) -> bool {
        let month = Some((released.year(), released.month()));
        released >= self.boundary
            || (self.this_month.is_some() && month == self.this_month)
            || (self.last_month.is_some() && month == self.last_month)
    }
}

impl Transform for RecencyFilter {
    fn name(&self) -> &'static str {
        "recency"
    }

    fn apply(&self, tracks: Vec<Track>) -> Vec<Track> {
        tracks
            .into_iter()
            .filter(|track| track.release_date.is_some_and(|d| self.keeps(d)))
            .collect()
    }
}

#[derive(Default)]
pub struct Pipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// The standard composition for `playlist`. `seed` fixes the shuffle order.
    #[must_use]
    pub fn for_playlist(playlist: &Playlist, today: NaiveDate, seed: Option<u64>) -> Self {
        let mut pipeline = Self::new().then(DeduplicateById);
        if playlist.kind == PlaylistType::Recents {
            pipeline = pipeline.then(RecencyFilter::new(today, playlist.recents_options()));
        }
        if playlist.shuffle {
            pipeline.then(Shuffle::new(seed))
        } else {
            pipeline.then(SortReverseReleaseDate)
        }
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    pub fn run(&self, tracks: Vec<Track>) -> Vec<Track> {
        let (recommended, primary): (Vec<Track>, Vec<Track>) =
            tracks.into_iter().partition(Track::is_recommendation);

        let mut output = primary;
        for transform in &self.transforms {
            let before = output.len();
            output = transform.apply(output);
            debug!("{}: {before} -> {} track(s)", transform.name(), output.len());
        }

        let mut present: HashSet<String> = output.iter().map(|t| t.id.clone()).collect();
        output.extend(
            recommended
                .into_iter()
                .filter(|track| present.insert(track.id.clone())),
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrackOrigin;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dated(id: &str, released: NaiveDate) -> Track {
        Track::new(id, id).released(released)
    }

    fn ids(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|t| t.id.as_str()).collect()
    }

    fn window(day_boundary: u32, add_this_month: bool, add_last_month: bool) -> RecentsOptions {
        RecentsOptions {
            day_boundary,
            add_this_month,
            add_last_month,
        }
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let tracks = vec![
            Track::new("a", "first"),
            Track::new("b", "b"),
            Track::new("a", "second"),
            Track::new("c", "c"),
            Track::new("b", "b again"),
        ];
        let deduped = DeduplicateById.apply(tracks);
        assert_eq!(ids(&deduped), vec!["a", "b", "c"]);
        assert_eq!(deduped[0].name, "first");
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let tracks: Vec<Track> = ["x", "y", "x", "z", "y", "x"]
            .iter()
            .map(|id| Track::new(*id, *id))
            .collect();
        let once = DeduplicateById.apply(tracks);
        let twice = DeduplicateById.apply(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_sort_is_descending_and_stable() {
        let tracks = vec![
            dated("old", date(2001, 1, 1)),
            Track::new("undated", "undated"),
            dated("tie1", date(2020, 5, 5)),
            dated("new", date(2023, 1, 1)),
            dated("tie2", date(2020, 5, 5)),
        ];
        let sorted = SortReverseReleaseDate.apply(tracks);
        assert_eq!(ids(&sorted), vec!["new", "tie1", "tie2", "old", "undated"]);
    }

    #[test]
    fn test_shuffle_preserves_multiset_and_length() {
        let tracks: Vec<Track> = (0..50)
            .map(|i| Track::new(format!("t{}", i % 40), "x"))
            .collect();
        let mut before = ids(&tracks).into_iter().map(String::from).collect::<Vec<_>>();

        let shuffled = Shuffle::seeded(7).apply(tracks.clone());
        let mut after = ids(&shuffled).into_iter().map(String::from).collect::<Vec<_>>();

        assert_eq!(shuffled.len(), tracks.len());
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let tracks: Vec<Track> = (0..20).map(|i| Track::new(format!("t{i}"), "x")).collect();
        let a = Shuffle::seeded(42).apply(tracks.clone());
        let b = Shuffle::seeded(42).apply(tracks);
        assert_eq!(a, b);
    }

    #[test]
    fn test_recency_window_boundaries() {
        let today = date(2024, 6, 15);
        let recent = dated("recent", date(2024, 6, 5));
        let old = dated("old", date(2024, 3, 17));

        let strict = RecencyFilter::new(today, window(30, false, false));
        assert_eq!(ids(&strict.apply(vec![recent.clone(), old.clone()])), vec!["recent"]);
        assert_eq!(strict.boundary(), date(2024, 5, 16));

        let on_boundary = dated("edge", date(2024, 5, 16));
        assert_eq!(ids(&strict.apply(vec![on_boundary])), vec!["edge"]);
    }

    #[test]
    fn test_recency_month_unions() {
        let today = date(2024, 6, 28);
        let this_month = dated("june", date(2024, 6, 1));
        let last_month = dated("may", date(2024, 5, 2));
        let older = dated("april", date(2024, 4, 30));
        let tracks = vec![this_month, last_month, older];

        let narrow = RecencyFilter::new(today, window(3, false, false));
        assert!(narrow.apply(tracks.clone()).is_empty());

        let with_this = RecencyFilter::new(today, window(3, true, false));
        assert_eq!(ids(&with_this.apply(tracks.clone())), vec!["june"]);

        let with_both = RecencyFilter::new(today, window(3, true, true));
        assert_eq!(ids(&with_both.apply(tracks)), vec!["june", "may"]);
    }

    #[test]
    fn test_last_month_wraps_the_year() {
        let today = date(2024, 1, 10);
        let december = dated("dec", date(2023, 12, 1));
        let filter = RecencyFilter::new(today, window(1, false, true));
        assert_eq!(ids(&filter.apply(vec![december])), vec!["dec"]);
    }

    #[test]
    fn test_recency_drops_undated() {
        let filter = RecencyFilter::new(date(2024, 6, 15), window(365, true, true));
        assert!(filter.apply(vec![Track::new("undated", "x")]).is_empty());
    }

    #[test]
    fn test_pipeline_composition_per_type() {
        let today = date(2024, 6, 15);
        let mut playlist = Playlist::new("alice", "mix");
        assert_eq!(Pipeline::for_playlist(&playlist, today, None).names(), vec!["dedup", "sort"]);

        playlist.shuffle = true;
        assert_eq!(
            Pipeline::for_playlist(&playlist, today, None).names(),
            vec!["dedup", "shuffle"]
        );

        playlist.kind = PlaylistType::Recents;
        playlist.shuffle = false;
        assert_eq!(
            Pipeline::for_playlist(&playlist, today, None).names(),
            vec!["dedup", "recency", "sort"]
        );
    }

    #[test]
    fn test_recommendations_bypass_recency_and_are_appended() {
        let today = date(2024, 6, 15);
        let mut playlist = Playlist::new("alice", "recent");
        playlist.kind = PlaylistType::Recents;
        playlist.recents = Some(window(30, false, false));

        let tracks = vec![
            dated("old", date(2020, 1, 1)),
            dated("fresh", date(2024, 6, 10)),
            dated("rec-old", date(1999, 1, 1)).with_origin(TrackOrigin::Recommendation),
            Track::new("fresh", "dup").with_origin(TrackOrigin::Recommendation),
        ];

        let output = Pipeline::for_playlist(&playlist, today, None).run(tracks);
        assert_eq!(ids(&output), vec!["fresh", "rec-old"]);
    }
}
