//! # Playlist Store
//!
//! Persistence collaborator for accounts and managed playlist definitions.
//!
//! [`PlaylistStore`] is the seam every component talks to. Two implementations:
//!
//! - [`SqliteStore`]: the on-disk store used by the CLI and worker
//! - [`MemoryStore`]: an in-process store for tests and benchmarks
//!
//! ## Schema
//!
//! ```text
//! users     (id, username UNIQUE, linked, locked)
//! playlists (id, owner, name, kind, parts JSON, playlist_references JSON, shuffle,
//!            include_recommendations, recommendation_sample, target_uri,
//!            day_boundary, add_this_month, add_last_month,
//!            description_overwrite, description_suffix, UNIQUE(owner, name))
//! ```
//!
//! Listings come back in insertion order; the scheduler staggers in that order.

use crate::model::{Part, Playlist, PlaylistType, RecentsOptions, User};
use anyhow::{bail, Context, Result};
use log::debug;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::cell::RefCell;
use std::path::Path;

/// Read and write access to users and their playlists.
pub trait PlaylistStore {
    fn get_user(&self, username: &str) -> Result<Option<User>>;

    /// All accounts, in insertion order.
    fn list_users(&self) -> Result<Vec<User>>;

    /// Insert or replace an account.
    fn put_user(&self, user: &User) -> Result<()>;

    fn get_playlist(&self, owner: &str, name: &str) -> Result<Option<Playlist>>;

    /// All playlists of `owner`, in insertion order.
    fn list_playlists(&self, owner: &str) -> Result<Vec<Playlist>>;

    /// Fails if `(owner, name)` already exists.
    fn insert_playlist(&self, playlist: &Playlist) -> Result<()>;

    /// Overwrite the stored fields of an existing playlist.
    fn save_playlist(&self, playlist: &Playlist) -> Result<()>;

    /// Returns whether a playlist was removed.
    fn delete_playlist(&self, owner: &str, name: &str) -> Result<bool>;
}

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (and create if needed) the store at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open store database at {}", db_path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id       INTEGER PRIMARY KEY,
                username TEXT    NOT NULL UNIQUE,
                linked   INTEGER NOT NULL DEFAULT 0,
                locked   INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS playlists (
                id                      INTEGER PRIMARY KEY,
                owner                   TEXT    NOT NULL,
                name                    TEXT    NOT NULL,
                kind                    TEXT    NOT NULL DEFAULT 'default',
                parts                   TEXT    NOT NULL DEFAULT '[]',
                playlist_references     TEXT    NOT NULL DEFAULT '[]',
                shuffle                 INTEGER NOT NULL DEFAULT 0,
                include_recommendations INTEGER NOT NULL DEFAULT 0,
                recommendation_sample   INTEGER NOT NULL DEFAULT 10,
                target_uri              TEXT,
                day_boundary            INTEGER,
                add_this_month          INTEGER,
                add_last_month          INTEGER,
                description_overwrite   TEXT,
                description_suffix      TEXT,
                UNIQUE(owner, name)
            );
            CREATE INDEX IF NOT EXISTS idx_playlists_owner ON playlists(owner);",
        )
        .context("Failed to create store tables")?;

        Ok(Self { conn })
    }
}

const PLAYLIST_COLUMNS: &str = "owner, name, kind, parts, playlist_references, shuffle, \
     include_recommendations, recommendation_sample, target_uri, day_boundary, \
     add_this_month, add_last_month, description_overwrite, description_suffix";

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_playlist(row: &Row<'_>) -> rusqlite::Result<Playlist> {
    let kind_text: String = row.get(2)?;
    let kind: PlaylistType = kind_text
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let parts: Vec<Part> = json_column(row, 3)?;
    let playlist_references: Vec<String> = json_column(row, 4)?;

    let day_boundary: Option<u32> = row.get(9)?;
    let recents = day_boundary.map(|day_boundary| -> rusqlite::Result<RecentsOptions> {
        Ok(RecentsOptions {
            day_boundary,
            add_this_month: row.get::<_, Option<bool>>(10)?.unwrap_or(false),
            add_last_month: row.get::<_, Option<bool>>(11)?.unwrap_or(false),
        })
    });

    Ok(Playlist {
        owner: row.get(0)?,
        name: row.get(1)?,
        kind,
        parts,
        playlist_references,
        shuffle: row.get(5)?,
        include_recommendations: row.get(6)?,
        recommendation_sample: row.get(7)?,
        target_uri: row.get(8)?,
        recents: recents.transpose()?,
        description_overwrite: row.get(12)?,
        description_suffix: row.get(13)?,
    })
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        username: row.get(0)?,
        linked: row.get(1)?,
        locked: row.get(2)?,
    })
}

impl PlaylistStore for SqliteStore {
    fn get_user(&self, username: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT username, linked, locked FROM users WHERE username = ?1",
                [username],
                row_to_user,
            )
            .optional()
            .with_context(|| format!("Failed to query user {username}"))
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT username, linked, locked FROM users ORDER BY id")
            .context("Invalid SQL statement when SELECTing users")?;

        let user_iter = stmt.query_map([], row_to_user).context("Cannot query users.")?;

        let mut users = Vec::new();
        for user in user_iter {
            users.push(user.context("Queried user could not be read")?);
        }
        Ok(users)
    }

    fn put_user(&self, user: &User) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO users (username, linked, locked) VALUES (?1, ?2, ?3)
                 ON CONFLICT(username) DO UPDATE SET linked = excluded.linked, locked = excluded.locked",
                params![user.username, user.linked, user.locked],
            )
            .with_context(|| format!("Failed to write user {}", user.username))?;
        Ok(())
    }

    fn get_playlist(&self, owner: &str, name: &str) -> Result<Option<Playlist>> {
        let sql = format!("SELECT {PLAYLIST_COLUMNS} FROM playlists WHERE owner = ?1 AND name = ?2");
        self.conn
            .query_row(&sql, [owner, name], row_to_playlist)
            .optional()
            .with_context(|| format!("Failed to query playlist {owner} / {name}"))
    }

    fn list_playlists(&self, owner: &str) -> Result<Vec<Playlist>> {
        let sql = format!("SELECT {PLAYLIST_COLUMNS} FROM playlists WHERE owner = ?1 ORDER BY id");
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Invalid SQL statement when SELECTing playlists")?;

        let playlist_iter = stmt
            .query_map([owner], row_to_playlist)
            .with_context(|| format!("Cannot query playlists of {owner}"))?;

        let mut playlists = Vec::new();
        for playlist in playlist_iter {
            playlists.push(playlist.context("Queried playlist could not be read")?);
        }
        Ok(playlists)
    }

    fn insert_playlist(&self, playlist: &Playlist) -> Result<()> {
        if self.get_playlist(&playlist.owner, &playlist.name)?.is_some() {
            bail!("playlist {} / {} already exists", playlist.owner, playlist.name);
        }

        let sql = format!(
            "INSERT INTO playlists ({PLAYLIST_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        );
        let parts = serde_json::to_string(&playlist.parts)?;
        let references = serde_json::to_string(&playlist.playlist_references)?;
        let window = playlist.recents;

        self.conn
            .execute(
                &sql,
                params![
                    playlist.owner,
                    playlist.name,
                    playlist.kind.as_str(),
                    parts,
                    references,
                    playlist.shuffle,
                    playlist.include_recommendations,
                    playlist.recommendation_sample,
                    playlist.target_uri,
                    window.map(|w| w.day_boundary),
                    window.map(|w| w.add_this_month),
                    window.map(|w| w.add_last_month),
                    playlist.description_overwrite,
                    playlist.description_suffix,
                ],
            )
            .with_context(|| {
                format!("Failed to INSERT playlist {} / {}", playlist.owner, playlist.name)
            })?;

        debug!("stored {} / {}", playlist.owner, playlist.name);
        Ok(())
    }

    fn save_playlist(&self, playlist: &Playlist) -> Result<()> {
        let parts = serde_json::to_string(&playlist.parts)?;
        let references = serde_json::to_string(&playlist.playlist_references)?;
        let window = playlist.recents;

        let updated = self
            .conn
            .execute(
                "UPDATE playlists SET kind = ?3, parts = ?4, playlist_references = ?5, shuffle = ?6,
                    include_recommendations = ?7, recommendation_sample = ?8, target_uri = ?9,
                    day_boundary = ?10, add_this_month = ?11, add_last_month = ?12,
                    description_overwrite = ?13, description_suffix = ?14
                 WHERE owner = ?1 AND name = ?2",
                params![
                    playlist.owner,
                    playlist.name,
                    playlist.kind.as_str(),
                    parts,
                    references,
                    playlist.shuffle,
                    playlist.include_recommendations,
                    playlist.recommendation_sample,
                    playlist.target_uri,
                    window.map(|w| w.day_boundary),
                    window.map(|w| w.add_this_month),
                    window.map(|w| w.add_last_month),
                    playlist.description_overwrite,
                    playlist.description_suffix,
                ],
            )
            .with_context(|| {
                format!("Failed to UPDATE playlist {} / {}", playlist.owner, playlist.name)
            })?;

        if updated == 0 {
            bail!("playlist {} / {} does not exist", playlist.owner, playlist.name);
        }
        Ok(())
    }

    fn delete_playlist(&self, owner: &str, name: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM playlists WHERE owner = ?1 AND name = ?2",
                [owner, name],
            )
            .with_context(|| format!("Failed to DELETE playlist {owner} / {name}"))?;
        Ok(removed > 0)
    }
}

/// In-process store. Keeps insertion order like [`SqliteStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RefCell<Vec<User>>,
    playlists: RefCell<Vec<Playlist>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seeding for tests.
    #[must_use]
    pub fn with_user(self, user: User) -> Self {
        self.users.borrow_mut().push(user);
        self
    }

    #[must_use]
    pub fn with_playlist(self, playlist: Playlist) -> Self {
        self.playlists.borrow_mut().push(playlist);
        self
    }
}

impl PlaylistStore for MemoryStore {
    fn get_user(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .borrow()
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.users.borrow().clone())
    }

    fn put_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.borrow_mut();
        match users.iter_mut().find(|u| u.username == user.username) {
            Some(existing) => *existing = user.clone(),
            None => users.push(user.clone()),
        }
        Ok(())
    }

    fn get_playlist(&self, owner: &str, name: &str) -> Result<Option<Playlist>> {
        Ok(self
            .playlists
            .borrow()
            .iter()
            .find(|p| p.owner == owner && p.name == name)
            .cloned())
    }

    fn list_playlists(&self, owner: &str) -> Result<Vec<Playlist>> {
        Ok(self
            .playlists
            .borrow()
            .iter()
            .filter(|p| p.owner == owner)
            .cloned()
            .collect())
    }

    fn insert_playlist(&self, playlist: &Playlist) -> Result<()> {
        if self.get_playlist(&playlist.owner, &playlist.name)?.is_some() {
            bail!("playlist {} / {} already exists", playlist.owner, playlist.name);
        }
        self.playlists.borrow_mut().push(playlist.clone());
        Ok(())
    }

    fn save_playlist(&self, playlist: &Playlist) -> Result<()> {
        let mut playlists = self.playlists.borrow_mut();
        match playlists
            .iter_mut()
            .find(|p| p.owner == playlist.owner && p.name == playlist.name)
        {
            Some(existing) => {
                *existing = playlist.clone();
                Ok(())
            }
            None => bail!("playlist {} / {} does not exist", playlist.owner, playlist.name),
        }
    }

    fn delete_playlist(&self, owner: &str, name: &str) -> Result<bool> {
        let mut playlists = self.playlists.borrow_mut();
        let before = playlists.len();
        playlists.retain(|p| !(p.owner == owner && p.name == name));
        Ok(playlists.len() != before)
    }
}
