//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `mixtape` binary.
//!
//! ## Commands
//!
//! - `user`: add accounts and change their link/lock flags
//! - `playlist`: create, update, delete and inspect managed playlists
//! - `catalog`: seed and inspect the offline catalog
//! - `run`: execute one playlist now
//! - `schedule-user` / `schedule-all`: emit staggered deferred executions
//! - `worker`: deliver deferred executions in the foreground or background
//!
//! ## Examples
//!
//! ```bash
//! mixtape user add alice --linked
//! mixtape playlist add alice weekly --part "album:Blue Train" --reference chill --shuffle
//! mixtape playlist update alice weekly --clear-references --suffix auto
//! mixtape schedule-all
//! mixtape worker start
//! ```

use crate::model::{FieldUpdate, Part, PlaylistType, PlaylistUpdate};
use crate::manage::NewPlaylist;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "mixtape")]
#[command(about = "Mixtape: managed playlists composed from nested sources, refreshed on a staggered schedule")]
#[command(version)]
pub struct Args {
    /// Database file
    ///
    /// Defaults to `mixtape.db` in the platform data directory. The store, the
    /// offline catalog and the task queue all live in this file.
    #[arg(long, global = true, env = "MIXTAPE_DB", value_hint = clap::ValueHint::FilePath)]
    pub db: Option<PathBuf>,

    /// Run scheduled executions immediately instead of queueing them
    #[arg(long, global = true)]
    pub inline: bool,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Manage playlists
    Playlist {
        #[command(subcommand)]
        action: PlaylistAction,
    },

    /// Seed and inspect the offline catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Execute one playlist now
    ///
    /// Resolves the playlist's parts, fetches their tracks, runs the
    /// processing pipeline and overwrites the remote playlist.
    Run {
        user: String,
        playlist: String,

        /// Fix the shuffle order
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Schedule every eligible playlist of one account
    ///
    /// Playlists need at least one part or reference and a target. They are
    /// spaced 6 seconds apart by default.
    ScheduleUser { user: String },

    /// Schedule every linked, unlocked account
    ///
    /// Accounts are spaced 30 seconds apart by default. Each account execution
    /// in turn schedules that account's playlists.
    ScheduleAll,

    /// Deliver deferred executions
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },

    /// Generate shell completions
    ///
    /// Usage: mixtape completion bash > ~/.local/share/bash-completion/completions/mixtape
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// List an owner's playlist names for completion (hidden command)
    #[command(hide = true)]
    CompletePlaylists { owner: String },
}

#[derive(Subcommand, Debug)]
pub enum UserAction {
    Add {
        name: String,

        /// The account has an active catalog link
        #[arg(long)]
        linked: bool,

        /// The account is administratively locked
        #[arg(long)]
        locked: bool,
    },

    /// Change an account's flags
    Set {
        name: String,

        #[arg(long)]
        linked: Option<bool>,

        #[arg(long)]
        locked: Option<bool>,
    },

    List,
}

#[derive(Subcommand, Debug)]
pub enum PlaylistAction {
    /// Create a playlist, provisioning its remote playlist when the owner is linked
    Add(AddArgs),

    /// Change selected fields of a playlist
    Update(UpdateArgs),

    /// Delete a playlist definition (the remote playlist is kept)
    Delete { owner: String, name: String },

    /// Print a playlist definition as JSON
    Show { owner: String, name: String },

    /// List an owner's playlists
    List { owner: String },
}

#[derive(clap::Args, Debug)]
pub struct AddArgs {
    pub owner: String,
    pub name: String,

    /// Part as `kind:id`, kind one of track, album, artist, playlist, ref (repeatable)
    #[arg(long = "part")]
    pub parts: Vec<Part>,

    /// Name of another playlist of the same owner to include (repeatable)
    #[arg(long = "reference")]
    pub references: Vec<String>,

    #[arg(long = "type", default_value = "default")]
    pub kind: PlaylistType,

    #[arg(long)]
    pub shuffle: bool,

    /// Append recommendations seeded from the playlist's tracks
    #[arg(long)]
    pub recommendations: bool,

    /// Number of recommendations to append
    #[arg(long)]
    pub sample: Option<u32>,

    /// Recents window in days
    #[arg(long)]
    pub day_boundary: Option<u32>,

    /// Recents: also keep anything released this calendar month
    #[arg(long)]
    pub this_month: bool,

    /// Recents: also keep anything released last calendar month
    #[arg(long)]
    pub last_month: bool,

    /// Fixed description replacing the generated part list
    #[arg(long)]
    pub description: Option<String>,

    /// Text appended to the description
    #[arg(long)]
    pub suffix: Option<String>,
}

impl AddArgs {
    #[must_use]
    pub fn into_request(self) -> (String, NewPlaylist) {
        let request = NewPlaylist {
            name: self.name,
            kind: self.kind,
            parts: self.parts,
            playlist_references: self.references,
            shuffle: self.shuffle,
            include_recommendations: self.recommendations,
            recommendation_sample: self.sample,
            day_boundary: self.day_boundary,
            add_this_month: self.this_month,
            add_last_month: self.last_month,
            description_overwrite: self.description,
            description_suffix: self.suffix,
        };
        (self.owner, request)
    }
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    pub owner: String,
    pub name: String,

    /// Replace the part list (repeatable)
    #[arg(long = "part", conflicts_with = "clear_parts")]
    pub parts: Vec<Part>,

    #[arg(long)]
    pub clear_parts: bool,

    /// Replace the reference list (repeatable)
    #[arg(long = "reference", conflicts_with = "clear_references")]
    pub references: Vec<String>,

    #[arg(long)]
    pub clear_references: bool,

    #[arg(long, conflicts_with = "clear_target")]
    pub target_uri: Option<String>,

    #[arg(long)]
    pub clear_target: bool,

    #[arg(long = "type")]
    pub kind: Option<PlaylistType>,

    #[arg(long)]
    pub shuffle: Option<bool>,

    #[arg(long)]
    pub recommendations: Option<bool>,

    #[arg(long)]
    pub sample: Option<u32>,

    #[arg(long)]
    pub day_boundary: Option<u32>,

    #[arg(long)]
    pub this_month: Option<bool>,

    #[arg(long)]
    pub last_month: Option<bool>,

    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,

    #[arg(long)]
    pub clear_description: bool,

    #[arg(long, conflicts_with = "clear_suffix")]
    pub suffix: Option<String>,

    #[arg(long)]
    pub clear_suffix: bool,
}

fn list_update<T>(values: Vec<T>, clear: bool) -> FieldUpdate<Vec<T>> {
    if clear {
        FieldUpdate::Clear
    } else if values.is_empty() {
        FieldUpdate::Keep
    } else {
        FieldUpdate::Set(values)
    }
}

fn value_update<T>(value: Option<T>, clear: bool) -> FieldUpdate<T> {
    if clear {
        FieldUpdate::Clear
    } else {
        FieldUpdate::from_option(value)
    }
}

impl UpdateArgs {
    #[must_use]
    pub fn into_update(self) -> (String, String, PlaylistUpdate) {
        let update = PlaylistUpdate {
            parts: list_update(self.parts, self.clear_parts),
            playlist_references: list_update(self.references, self.clear_references),
            target_uri: value_update(self.target_uri, self.clear_target),
            kind: FieldUpdate::from_option(self.kind),
            shuffle: FieldUpdate::from_option(self.shuffle),
            include_recommendations: FieldUpdate::from_option(self.recommendations),
            recommendation_sample: FieldUpdate::from_option(self.sample),
            day_boundary: FieldUpdate::from_option(self.day_boundary),
            add_this_month: FieldUpdate::from_option(self.this_month),
            add_last_month: FieldUpdate::from_option(self.last_month),
            description_overwrite: value_update(self.description, self.clear_description),
            description_suffix: value_update(self.suffix, self.clear_suffix),
        };
        (self.owner, self.name, update)
    }
}

#[derive(Subcommand, Debug)]
pub enum CatalogAction {
    /// Load tracks and playlists from a JSON file
    ///
    /// Format: `{"tracks": [{"id", "name", "artist", "album", "release_date"}],
    /// "playlists": [{"uri", "owner", "name", "tracks": [ids]}]}`
    Import {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Print a catalog playlist's description and listing
    Show { uri: String },
}

/// Worker management actions
#[derive(Subcommand, Debug)]
pub enum WorkerAction {
    /// Deliver due executions in the foreground
    Run {
        /// Deliver what is due once and exit
        #[arg(long)]
        once: bool,
    },

    /// Start the worker in the background
    Start,

    /// Stop the background worker
    Stop,

    /// Report whether the background worker is running
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_add_parses_parts_and_type() {
        let args = Args::try_parse_from([
            "mixtape", "playlist", "add", "alice", "mix", "--part", "album:Blue Train", "--part",
            "ref:chill", "--type", "recents", "--this-month",
        ])
        .unwrap();

        let Command::Playlist {
            action: PlaylistAction::Add(add),
        } = args.command
        else {
            panic!("expected playlist add");
        };
        let (owner, request) = add.into_request();
        assert_eq!(owner, "alice");
        assert_eq!(request.parts, vec![Part::album("Blue Train"), Part::reference("chill")]);
        assert_eq!(request.kind, PlaylistType::Recents);
        assert!(request.add_this_month);
    }

    #[test]
    fn test_invalid_part_is_rejected() {
        assert!(Args::try_parse_from(["mixtape", "playlist", "add", "a", "b", "--part", "genre:x"]).is_err());
    }

    #[test]
    fn test_update_distinguishes_clear_from_absent() {
        let args = Args::try_parse_from([
            "mixtape", "playlist", "update", "alice", "mix", "--clear-references", "--shuffle", "true",
        ])
        .unwrap();

        let Command::Playlist {
            action: PlaylistAction::Update(update),
        } = args.command
        else {
            panic!("expected playlist update");
        };
        let (_, _, update) = update.into_update();
        assert_eq!(update.playlist_references, FieldUpdate::Clear);
        assert_eq!(update.parts, FieldUpdate::Keep);
        assert_eq!(update.shuffle, FieldUpdate::Set(true));
    }

    #[test]
    fn test_clear_conflicts_with_set() {
        assert!(Args::try_parse_from([
            "mixtape", "playlist", "update", "a", "b", "--reference", "x", "--clear-references",
        ])
        .is_err());
    }
}
