//! # Playlist Model
//!
//! Types shared by every stage of a playlist run:
//!
//! - [`Part`] / [`PartKind`]: one declared composition unit of a managed playlist
//! - [`SourceRef`]: a concrete catalog source, what a part becomes once references are expanded
//! - [`Playlist`]: the stored definition of a managed playlist
//! - [`User`]: an account with its external-service link state
//! - [`Track`]: a catalog track flowing through aggregation and the pipeline
//! - [`ResolvedComposition`]: the flattened sources of one playlist
//! - [`FieldUpdate`] / [`PlaylistUpdate`]: tagged partial-update operations
//!
//! None of these types carry behavior beyond small accessors; the work is done by
//! [`crate::resolver`], [`crate::aggregator`], [`crate::pipeline`] and [`crate::executor`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Trailing window used for new recents playlists.
pub const DEFAULT_DAY_BOUNDARY: u32 = 21;

/// Recommendation sample size used for new playlists.
pub const DEFAULT_RECOMMENDATION_SAMPLE: u32 = 10;

/// What a [`Part`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartKind {
    Track,
    Album,
    Artist,
    /// A playlist living in the catalog, not managed here.
    Playlist,
    /// Another managed playlist of the same owner, expanded by the resolver.
    PlaylistRef,
}

impl PartKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Artist => "artist",
            Self::Playlist => "playlist",
            Self::PlaylistRef => "playlist_ref",
        }
    }
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a part or playlist type cannot be parsed from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseModelError {
    #[error("invalid part `{0}`: expected `kind:id` with kind one of track, album, artist, playlist, ref")]
    Part(String),
    #[error("invalid playlist type `{0}`: expected `default` or `recents`")]
    PlaylistType(String),
}

/// A typed reference embedded in a playlist's part list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Part {
    pub kind: PartKind,
    pub id: String,
}

impl Part {
    pub fn new(kind: PartKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn track(id: impl Into<String>) -> Self {
        Self::new(PartKind::Track, id)
    }

    pub fn album(id: impl Into<String>) -> Self {
        Self::new(PartKind::Album, id)
    }

    pub fn artist(id: impl Into<String>) -> Self {
        Self::new(PartKind::Artist, id)
    }

    pub fn playlist(id: impl Into<String>) -> Self {
        Self::new(PartKind::Playlist, id)
    }

    /// Reference to another managed playlist, by name.
    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(PartKind::PlaylistRef, name)
    }

    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.kind == PartKind::PlaylistRef
    }

    /// The concrete source behind this part, `None` for references.
    #[must_use]
    pub fn source(&self) -> Option<SourceRef> {
        let kind = match self.kind {
            PartKind::Track => SourceKind::Track,
            PartKind::Album => SourceKind::Album,
            PartKind::Artist => SourceKind::Artist,
            PartKind::Playlist => SourceKind::Playlist,
            PartKind::PlaylistRef => return None,
        };
        Some(SourceRef::new(kind, self.id.clone()))
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for Part {
    type Err = ParseModelError;

    /// Parses `kind:id`, e.g. `album:Blue Train` or `ref:Weekly`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| ParseModelError::Part(s.to_string()))?;
        let id = id.trim();
        if id.is_empty() {
            return Err(ParseModelError::Part(s.to_string()));
        }
        let kind = match kind.trim().to_ascii_lowercase().as_str() {
            "track" => PartKind::Track,
            "album" => PartKind::Album,
            "artist" => PartKind::Artist,
            "playlist" => PartKind::Playlist,
            "ref" | "playlist_ref" => PartKind::PlaylistRef,
            _ => return Err(ParseModelError::Part(s.to_string())),
        };
        Ok(Self::new(kind, id))
    }
}

/// Kinds of concrete catalog source. Unlike [`PartKind`] there is no reference variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Track,
    Album,
    Artist,
    Playlist,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Artist => "artist",
            Self::Playlist => "playlist",
        };
        f.write_str(name)
    }
}

/// A concrete, non-referential source identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceRef {
    pub kind: SourceKind,
    pub id: String,
}

impl SourceRef {
    pub fn new(kind: SourceKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Flattened, cycle-free expansion of a playlist's parts, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedComposition {
    sources: Vec<SourceRef>,
}

impl ResolvedComposition {
    #[must_use]
    pub fn new(sources: Vec<SourceRef>) -> Self {
        Self { sources }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceRef> {
        self.sources.iter()
    }

    #[must_use]
    pub fn sources(&self) -> &[SourceRef] {
        &self.sources
    }

    /// Sorted, distinct names of every contributing source.
    #[must_use]
    pub fn part_names(&self) -> Vec<String> {
        self.sources
            .iter()
            .map(|source| source.id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistType {
    #[default]
    Default,
    Recents,
}

impl PlaylistType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Recents => "recents",
        }
    }
}

impl fmt::Display for PlaylistType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaylistType {
    type Err = ParseModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "recents" => Ok(Self::Recents),
            _ => Err(ParseModelError::PlaylistType(s.to_string())),
        }
    }
}

/// Window settings of a recents playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentsOptions {
    /// Trailing number of days a release must fall into. Always > 0.
    pub day_boundary: u32,
    pub add_this_month: bool,
    pub add_last_month: bool,
}

impl Default for RecentsOptions {
    fn default() -> Self {
        Self {
            day_boundary: DEFAULT_DAY_BOUNDARY,
            add_this_month: false,
            add_last_month: false,
        }
    }
}

/// A managed playlist, unique per `(owner, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub owner: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PlaylistType,
    pub parts: Vec<Part>,
    /// Names of other managed playlists of the same owner, expanded after `parts`.
    pub playlist_references: Vec<String>,
    pub shuffle: bool,
    pub include_recommendations: bool,
    pub recommendation_sample: u32,
    /// Remote playlist that receives the generated listing.
    pub target_uri: Option<String>,
    /// Present once the playlist has been a recents playlist.
    pub recents: Option<RecentsOptions>,
    pub description_overwrite: Option<String>,
    pub description_suffix: Option<String>,
}

impl Playlist {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            kind: PlaylistType::Default,
            parts: Vec::new(),
            playlist_references: Vec::new(),
            shuffle: false,
            include_recommendations: false,
            recommendation_sample: DEFAULT_RECOMMENDATION_SAMPLE,
            target_uri: None,
            recents: None,
            description_overwrite: None,
            description_suffix: None,
        }
    }

    /// Declared parts followed by the reference list, as the resolver walks them.
    #[must_use]
    pub fn composition_part(&self, index: usize) -> Option<Part> {
        match self.parts.get(index) {
            Some(part) => Some(part.clone()),
            None => self
                .playlist_references
                .get(index - self.parts.len())
                .map(|name| Part::reference(name.clone())),
        }
    }

    #[must_use]
    pub fn has_sources(&self) -> bool {
        !self.parts.is_empty() || !self.playlist_references.is_empty()
    }

    /// Eligible for bulk scheduling: something to resolve and somewhere to write it.
    #[must_use]
    pub fn is_schedulable(&self) -> bool {
        self.has_sources() && self.target_uri.is_some()
    }

    /// Recents settings, falling back to defaults for playlists switched to recents
    /// without explicit window settings.
    #[must_use]
    pub fn recents_options(&self) -> RecentsOptions {
        self.recents.unwrap_or_default()
    }
}

/// An account and the state of its link to the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// Active external-service link.
    pub linked: bool,
    /// Administrative lock.
    pub locked: bool,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            linked: false,
            locked: false,
        }
    }

    #[must_use]
    pub fn linked(mut self) -> Self {
        self.linked = true;
        self
    }

    /// Whether bulk refreshes should include this account.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.linked && !self.locked
    }
}

/// Where a track entered a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackOrigin {
    #[default]
    Part,
    Recommendation,
}

/// A catalog track. Lives for one run only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub release_date: Option<NaiveDate>,
    #[serde(default, skip_serializing)]
    pub origin: TrackOrigin,
}

impl Track {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            artist: String::new(),
            album: String::new(),
            release_date: None,
            origin: TrackOrigin::Part,
        }
    }

    #[must_use]
    pub fn by(mut self, artist: impl Into<String>, album: impl Into<String>) -> Self {
        self.artist = artist.into();
        self.album = album.into();
        self
    }

    #[must_use]
    pub fn released(mut self, date: NaiveDate) -> Self {
        self.release_date = Some(date);
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: TrackOrigin) -> Self {
        self.origin = origin;
        self
    }

    #[must_use]
    pub fn is_recommendation(&self) -> bool {
        self.origin == TrackOrigin::Recommendation
    }
}

/// One field of a partial update.
///
/// `Keep` leaves the stored value alone, `Clear` empties it (an empty list, a null,
/// or the type's default), `Set` replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> FieldUpdate<T> {
    #[must_use]
    pub const fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }

    /// `Some(v)` becomes `Set(v)`, `None` becomes `Keep`.
    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Self::Keep, Self::Set)
    }

    pub fn apply_to_option(self, target: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Clear => *target = None,
            Self::Set(value) => *target = Some(value),
        }
    }
}

impl<T: Default> FieldUpdate<T> {
    pub fn apply_or_default(self, target: &mut T) {
        match self {
            Self::Keep => {}
            Self::Clear => *target = T::default(),
            Self::Set(value) => *target = value,
        }
    }
}

/// A partial update of a stored playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistUpdate {
    pub parts: FieldUpdate<Vec<Part>>,
    pub playlist_references: FieldUpdate<Vec<String>>,
    pub target_uri: FieldUpdate<String>,
    pub kind: FieldUpdate<PlaylistType>,
    pub shuffle: FieldUpdate<bool>,
    pub include_recommendations: FieldUpdate<bool>,
    pub recommendation_sample: FieldUpdate<u32>,
    pub day_boundary: FieldUpdate<u32>,
    pub add_this_month: FieldUpdate<bool>,
    pub add_last_month: FieldUpdate<bool>,
    pub description_overwrite: FieldUpdate<String>,
    pub description_suffix: FieldUpdate<String>,
}

impl PlaylistUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_keep()
            && self.playlist_references.is_keep()
            && self.target_uri.is_keep()
            && self.kind.is_keep()
            && self.shuffle.is_keep()
            && self.include_recommendations.is_keep()
            && self.recommendation_sample.is_keep()
            && self.day_boundary.is_keep()
            && self.add_this_month.is_keep()
            && self.add_last_month.is_keep()
            && self.description_overwrite.is_keep()
            && self.description_suffix.is_keep()
    }

    pub fn apply(self, playlist: &mut Playlist) {
        self.parts.apply_or_default(&mut playlist.parts);
        self.playlist_references
            .apply_or_default(&mut playlist.playlist_references);
        self.target_uri.apply_to_option(&mut playlist.target_uri);
        self.kind.apply_or_default(&mut playlist.kind);
        self.shuffle.apply_or_default(&mut playlist.shuffle);
        self.include_recommendations
            .apply_or_default(&mut playlist.include_recommendations);
        match self.recommendation_sample {
            FieldUpdate::Keep => {}
            FieldUpdate::Clear => playlist.recommendation_sample = DEFAULT_RECOMMENDATION_SAMPLE,
            FieldUpdate::Set(sample) => playlist.recommendation_sample = sample,
        }

        let touches_window = !(self.day_boundary.is_keep()
            && self.add_this_month.is_keep()
            && self.add_last_month.is_keep());
        if touches_window || playlist.kind == PlaylistType::Recents {
            let mut window = playlist.recents_options();
            match self.day_boundary {
                FieldUpdate::Keep => {}
                FieldUpdate::Clear => window.day_boundary = DEFAULT_DAY_BOUNDARY,
                FieldUpdate::Set(days) => window.day_boundary = days.max(1),
            }
            self.add_this_month.apply_or_default(&mut window.add_this_month);
            self.add_last_month.apply_or_default(&mut window.add_last_month);
            playlist.recents = Some(window);
        }

        self.description_overwrite
            .apply_to_option(&mut playlist.description_overwrite);
        self.description_suffix
            .apply_to_option(&mut playlist.description_suffix);
    }
}
