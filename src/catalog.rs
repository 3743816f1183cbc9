//! # Catalog
//!
//! The external music catalog a run reads tracks from and writes playlists to.
//!
//! [`Catalog`] is the collaborator seam. Every call is made on behalf of one account
//! and may fail with a generic "service unavailable" condition. Implementations:
//!
//! - [`LocalCatalog`]: an offline catalog kept in SQLite, seeded with
//!   `mixtape catalog import`. Playlists it holds are the "remote" playlists
//!   runs write into.
//! - [`MemoryCatalog`]: a scripted in-process catalog for tests, with per-source
//!   failure injection and write rejection.
//!
//! ## Source lookup
//!
//! | Source     | Tracks returned                                      |
//! |------------|------------------------------------------------------|
//! | `track`    | the single track with that id                        |
//! | `album`    | every track whose album matches, in catalog order    |
//! | `artist`   | every track whose artist matches, in catalog order   |
//! | `playlist` | the playlist's listing, matched by URI or owned name |

use crate::model::{SourceKind, SourceRef, Track, User};
use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Per-account access to the catalog service.
pub trait Catalog {
    /// Constituent tracks of one concrete source.
    fn tracks(&self, user: &User, source: &SourceRef) -> Result<Vec<Track>>;

    /// Up to `limit` tracks related to `seeds`, excluding the seeds themselves.
    fn recommendations(&self, user: &User, seeds: &[Track], limit: usize) -> Result<Vec<Track>>;

    /// Overwrite the full listing of the playlist at `uri`.
    fn replace_tracks(&self, user: &User, uri: &str, track_ids: &[String]) -> Result<()>;

    fn set_description(&self, user: &User, uri: &str, description: &str) -> Result<()>;

    /// Provision a new, empty playlist and return its URI.
    fn create_playlist(&self, user: &User, name: &str) -> Result<String>;
}

fn ensure_linked(user: &User) -> Result<()> {
    if user.linked {
        Ok(())
    } else {
        Err(anyhow!(
            "service unavailable: account {} is not linked",
            user.username
        ))
    }
}

/// A remote playlist as stored in, or imported into, the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePlaylist {
    pub uri: String,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tracks: Vec<String>,
}

/// Shape of a `catalog import` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogImport {
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub playlists: Vec<RemotePlaylist>,
}

/// Offline catalog backed by SQLite.
pub struct LocalCatalog {
    conn: Connection,
}

fn row_to_track(row: &Row<'_>) -> rusqlite::Result<Track> {
    let release: Option<String> = row.get(4)?;
    Ok(Track {
        id: row.get(0)?,
        name: row.get(1)?,
        artist: row.get(2)?,
        album: row.get(3)?,
        release_date: release.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        origin: Default::default(),
    })
}

impl LocalCatalog {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open catalog database at {}", db_path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS catalog_tracks (
                seq          INTEGER PRIMARY KEY,
                id           TEXT    NOT NULL UNIQUE,
                name         TEXT    NOT NULL,
                artist       TEXT    NOT NULL,
                album        TEXT    NOT NULL,
                release_date TEXT
            );
            CREATE TABLE IF NOT EXISTS catalog_playlists (
                uri         TEXT PRIMARY KEY,
                owner       TEXT NOT NULL,
                name        TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS catalog_playlist_tracks (
                playlist_uri TEXT    NOT NULL,
                position     INTEGER NOT NULL,
                track_id     TEXT    NOT NULL,
                PRIMARY KEY (playlist_uri, position)
            );
            CREATE INDEX IF NOT EXISTS idx_catalog_tracks_album ON catalog_tracks(album);
            CREATE INDEX IF NOT EXISTS idx_catalog_tracks_artist ON catalog_tracks(artist);",
        )
        .context("Failed to create catalog tables")?;

        Ok(Self { conn })
    }

    /// Load tracks and playlists from a JSON import file.
    pub fn import_file(&mut self, path: &Path) -> Result<(usize, usize)> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog import {}", path.display()))?;
        let import: CatalogImport = serde_json::from_str(&text)
            .with_context(|| format!("Invalid catalog import {}", path.display()))?;
        self.import(&import)
    }

    /// Upsert tracks and playlists. Returns `(tracks, playlists)` written.
    pub fn import(&mut self, import: &CatalogImport) -> Result<(usize, usize)> {
        let tx = self.conn.transaction()?;

        {
            let mut track_stmt = tx.prepare(
                "INSERT INTO catalog_tracks (id, name, artist, album, release_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, artist = excluded.artist,
                    album = excluded.album, release_date = excluded.release_date",
            )?;
            for track in &import.tracks {
                let release = track.release_date.map(|d| d.format("%Y-%m-%d").to_string());
                track_stmt
                    .execute(params![track.id, track.name, track.artist, track.album, release])
                    .with_context(|| format!("Failed to import track {}", track.id))?;
            }

            let mut playlist_stmt = tx.prepare(
                "INSERT INTO catalog_playlists (uri, owner, name, description) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(uri) DO UPDATE SET owner = excluded.owner, name = excluded.name,
                    description = excluded.description",
            )?;
            let mut clear_stmt =
                tx.prepare("DELETE FROM catalog_playlist_tracks WHERE playlist_uri = ?1")?;
            let mut entry_stmt = tx.prepare(
                "INSERT INTO catalog_playlist_tracks (playlist_uri, position, track_id) VALUES (?1, ?2, ?3)",
            )?;
            for playlist in &import.playlists {
                playlist_stmt
                    .execute(params![playlist.uri, playlist.owner, playlist.name, playlist.description])
                    .with_context(|| format!("Failed to import playlist {}", playlist.uri))?;
                clear_stmt.execute([&playlist.uri])?;
                for (position, track_id) in playlist.tracks.iter().enumerate() {
                    entry_stmt.execute(params![playlist.uri, position as i64, track_id])?;
                }
            }
        }

        tx.commit().context("Committing catalog import failed.")?;
        info!(
            "imported {} track(s) and {} playlist(s) into the catalog",
            import.tracks.len(),
            import.playlists.len()
        );
        Ok((import.tracks.len(), import.playlists.len()))
    }

    /// A stored playlist with its current listing, if it exists.
    pub fn playlist(&self, uri: &str) -> Result<Option<RemotePlaylist>> {
        let head = self
            .conn
            .query_row(
                "SELECT uri, owner, name, description FROM catalog_playlists WHERE uri = ?1",
                [uri],
                |row| {
                    Ok(RemotePlaylist {
                        uri: row.get(0)?,
                        owner: row.get(1)?,
                        name: row.get(2)?,
                        description: row.get(3)?,
                        tracks: Vec::new(),
                    })
                },
            )
            .optional()
            .with_context(|| format!("Failed to query catalog playlist {uri}"))?;

        let Some(mut playlist) = head else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT track_id FROM catalog_playlist_tracks WHERE playlist_uri = ?1 ORDER BY position",
        )?;
        let ids = stmt.query_map([uri], |row| row.get::<_, String>(0))?;
        for id in ids {
            playlist.tracks.push(id?);
        }
        Ok(Some(playlist))
    }

    fn query_tracks<P: Params>(&self, sql: &str, args: P) -> Result<Vec<Track>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .context("Invalid SQL statement when SELECTing catalog tracks")?;
        let track_iter = stmt.query_map(args, row_to_track)?;

        let mut tracks = Vec::new();
        for track in track_iter {
            tracks.push(track.context("Queried catalog track could not be read")?);
        }
        Ok(tracks)
    }

    fn playlist_uri_for(&self, user: &User, id: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT uri FROM catalog_playlists WHERE uri = ?1 OR (owner = ?2 AND name = ?1)
                 ORDER BY uri = ?1 DESC LIMIT 1",
                [id, user.username.as_str()],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up catalog playlist")
    }

    fn owned_playlist(&self, user: &User, uri: &str) -> Result<()> {
        let owner: Option<String> = self
            .conn
            .query_row(
                "SELECT owner FROM catalog_playlists WHERE uri = ?1",
                [uri],
                |row| row.get(0),
            )
            .optional()?;

        match owner {
            None => bail!("playlist {uri} does not exist"),
            Some(owner) if owner != user.username => {
                bail!("playlist {uri} is not owned by {}", user.username)
            }
            Some(_) => Ok(()),
        }
    }
}

impl Catalog for LocalCatalog {
    fn tracks(&self, user: &User, source: &SourceRef) -> Result<Vec<Track>> {
        ensure_linked(user)?;

        const COLUMNS: &str = "SELECT id, name, artist, album, release_date FROM catalog_tracks";
        let tracks = match source.kind {
            SourceKind::Track => {
                self.query_tracks(&format!("{COLUMNS} WHERE id = ?1"), [&source.id])?
            }
            SourceKind::Album => {
                self.query_tracks(&format!("{COLUMNS} WHERE album = ?1 ORDER BY seq"), [&source.id])?
            }
            SourceKind::Artist => {
                self.query_tracks(&format!("{COLUMNS} WHERE artist = ?1 ORDER BY seq"), [&source.id])?
            }
            SourceKind::Playlist => {
                let uri = self
                    .playlist_uri_for(user, &source.id)?
                    .ok_or_else(|| anyhow!("catalog has no {source}"))?;
                self.query_tracks(
                    "SELECT t.id, t.name, t.artist, t.album, t.release_date
                     FROM catalog_playlist_tracks p JOIN catalog_tracks t ON t.id = p.track_id
                     WHERE p.playlist_uri = ?1 ORDER BY p.position",
                    [&uri],
                )?
            }
        };

        if tracks.is_empty() && source.kind != SourceKind::Playlist {
            bail!("catalog has no {source}");
        }
        debug!("{source} -> {} track(s)", tracks.len());
        Ok(tracks)
    }

    fn recommendations(&self, user: &User, seeds: &[Track], limit: usize) -> Result<Vec<Track>> {
        ensure_linked(user)?;

        let seed_ids: HashSet<&str> = seeds.iter().map(|t| t.id.as_str()).collect();
        let seed_artists: HashSet<&str> = seeds.iter().map(|t| t.artist.as_str()).collect();

        let all = self.query_tracks(
            "SELECT id, name, artist, album, release_date FROM catalog_tracks ORDER BY seq",
            [],
        )?;
        let (related, others): (Vec<Track>, Vec<Track>) = all
            .into_iter()
            .filter(|t| !seed_ids.contains(t.id.as_str()))
            .partition(|t| seed_artists.contains(t.artist.as_str()));

        let mut rng = thread_rng();
        let mut picked: Vec<Track> = related
            .choose_multiple(&mut rng, limit)
            .cloned()
            .collect();
        if picked.len() < limit {
            let missing = limit - picked.len();
            picked.extend(others.choose_multiple(&mut rng, missing).cloned());
        }
        Ok(picked)
    }

    fn replace_tracks(&self, user: &User, uri: &str, track_ids: &[String]) -> Result<()> {
        ensure_linked(user)?;
        self.owned_playlist(user, uri)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM catalog_playlist_tracks WHERE playlist_uri = ?1", [uri])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO catalog_playlist_tracks (playlist_uri, position, track_id) VALUES (?1, ?2, ?3)",
            )?;
            for (position, track_id) in track_ids.iter().enumerate() {
                stmt.execute(params![uri, position as i64, track_id])?;
            }
        }
        tx.commit().context("Committing playlist overwrite failed.")?;
        Ok(())
    }

    fn set_description(&self, user: &User, uri: &str, description: &str) -> Result<()> {
        ensure_linked(user)?;
        self.owned_playlist(user, uri)?;
        self.conn.execute(
            "UPDATE catalog_playlists SET description = ?2 WHERE uri = ?1",
            [uri, description],
        )?;
        Ok(())
    }

    fn create_playlist(&self, user: &User, name: &str) -> Result<String> {
        ensure_linked(user)?;
        let uri = format!("mixtape:playlist:{:016x}", thread_rng().gen::<u64>());
        self.conn
            .execute(
                "INSERT INTO catalog_playlists (uri, owner, name) VALUES (?1, ?2, ?3)",
                [uri.as_str(), user.username.as_str(), name],
            )
            .with_context(|| format!("Failed to create catalog playlist {name}"))?;
        info!("created remote playlist {uri} for {} / {name}", user.username);
        Ok(uri)
    }
}

/// Scripted catalog for tests.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    sources: RefCell<HashMap<SourceRef, Vec<Track>>>,
    failing: RefCell<HashSet<SourceRef>>,
    recommendation_pool: RefCell<Vec<Track>>,
    playlists: RefCell<HashMap<String, RemotePlaylist>>,
    reject_writes: RefCell<bool>,
    reject_descriptions: RefCell<bool>,
    writes: RefCell<usize>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&self, source: SourceRef, tracks: Vec<Track>) {
        self.sources.borrow_mut().insert(source, tracks);
    }

    /// Make every lookup of `source` fail.
    pub fn fail_source(&self, source: SourceRef) {
        self.failing.borrow_mut().insert(source);
    }

    /// Recommendations are served from this pool in order.
    pub fn set_recommendations(&self, tracks: Vec<Track>) {
        *self.recommendation_pool.borrow_mut() = tracks;
    }

    pub fn add_playlist(&self, owner: &str, uri: &str) {
        self.playlists.borrow_mut().insert(
            uri.to_string(),
            RemotePlaylist {
                uri: uri.to_string(),
                owner: owner.to_string(),
                name: uri.to_string(),
                description: String::new(),
                tracks: Vec::new(),
            },
        );
    }

    pub fn reject_writes(&self, reject: bool) {
        *self.reject_writes.borrow_mut() = reject;
    }

    /// Fail description updates only; listing writes still go through.
    pub fn reject_descriptions(&self, reject: bool) {
        *self.reject_descriptions.borrow_mut() = reject;
    }

    #[must_use]
    pub fn playlist(&self, uri: &str) -> Option<RemotePlaylist> {
        self.playlists.borrow().get(uri).cloned()
    }

    #[must_use]
    pub fn listing(&self, uri: &str) -> Vec<String> {
        self.playlist(uri).map(|p| p.tracks).unwrap_or_default()
    }

    /// Number of accepted writes (listing or description).
    #[must_use]
    pub fn write_count(&self) -> usize {
        *self.writes.borrow()
    }

    fn writable(&self, user: &User, uri: &str) -> Result<()> {
        ensure_linked(user)?;
        if *self.reject_writes.borrow() {
            bail!("write to {uri} rejected");
        }
        match self.playlists.borrow().get(uri) {
            None => bail!("playlist {uri} does not exist"),
            Some(p) if p.owner != user.username => {
                bail!("playlist {uri} is not owned by {}", user.username)
            }
            Some(_) => Ok(()),
        }
    }
}

impl Catalog for MemoryCatalog {
    fn tracks(&self, user: &User, source: &SourceRef) -> Result<Vec<Track>> {
        ensure_linked(user)?;
        if self.failing.borrow().contains(source) {
            bail!("service unavailable while fetching {source}");
        }
        self.sources
            .borrow()
            .get(source)
            .cloned()
            .ok_or_else(|| anyhow!("catalog has no {source}"))
    }

    fn recommendations(&self, user: &User, seeds: &[Track], limit: usize) -> Result<Vec<Track>> {
        ensure_linked(user)?;
        let seed_ids: HashSet<&str> = seeds.iter().map(|t| t.id.as_str()).collect();
        Ok(self
            .recommendation_pool
            .borrow()
            .iter()
            .filter(|t| !seed_ids.contains(t.id.as_str()))
            .take(limit)
            .cloned()
            .collect())
    }

    fn replace_tracks(&self, user: &User, uri: &str, track_ids: &[String]) -> Result<()> {
        self.writable(user, uri)?;
        if let Some(playlist) = self.playlists.borrow_mut().get_mut(uri) {
            playlist.tracks = track_ids.to_vec();
        }
        *self.writes.borrow_mut() += 1;
        Ok(())
    }

    fn set_description(&self, user: &User, uri: &str, description: &str) -> Result<()> {
        self.writable(user, uri)?;
        if *self.reject_descriptions.borrow() {
            bail!("description update for {uri} rejected");
        }
        if let Some(playlist) = self.playlists.borrow_mut().get_mut(uri) {
            playlist.description = description.to_string();
        }
        *self.writes.borrow_mut() += 1;
        Ok(())
    }

    fn create_playlist(&self, user: &User, name: &str) -> Result<String> {
        ensure_linked(user)?;
        let uri = format!("memory:playlist:{}:{name}", user.username);
        self.add_playlist(&user.username, &uri);
        Ok(uri)
    }
}
