//! Managed playlists composed from nested sources, refreshed on a staggered
//! schedule.
//!
//! A managed playlist declares its content as parts (tracks, albums, artists,
//! catalog playlists) and references to other managed playlists of the same
//! owner. A run flattens that composition, fetches the tracks, filters and
//! orders them, and overwrites a remote playlist with the result. Bulk refreshes
//! are spread over time so the catalog's rate limits are never burst.
//!
//! ```text
//! BulkScheduler ──(deferred)──▶ PlaylistRunner
//!                                  │
//!                                  ├─ PartResolver      parts → sources
//!                                  ├─ TrackAggregator   sources → tracks
//!                                  ├─ Pipeline          dedup, recency, shuffle/sort
//!                                  └─ PlaylistExecutor  overwrite + description
//! ```
//!
//! Core modules:
//! - [`resolver`] - Cycle-safe flattening of playlist references
//! - [`aggregator`] - Catalog fetches with partial-failure recovery
//! - [`pipeline`] - Track transforms and their per-type composition
//! - [`executor`] - Remote overwrite and description text
//! - [`scheduler`] - Staggered bulk scheduling
//! - [`runner`] - The "run playlist" entry point
//!
//! ### Collaborators
//!
//! Every component receives its collaborators as trait objects at construction:
//!
//! - [`store::PlaylistStore`] - accounts and playlist definitions
//! - [`catalog::Catalog`] - the music catalog, per account
//! - [`tasks::TaskQueue`] - deferred execution transport
//! - [`scheduler::Clock`] - the current instant
//!
//! Each has a SQLite implementation used by the binary and an in-memory one for
//! tests.
//!
//! ### Supporting Modules
//!
//! - [`model`] - Playlists, parts, tracks and update operations
//! - [`error`] - Failure taxonomy of a run
//! - [`dispatch`] - Routing delivered tasks to entry points
//! - [`worker`] - Polling delivery of queued tasks
//! - [`manage`] - Playlist and account lifecycle
//! - [`config`] - Data directory and runtime settings
//! - [`cli`] - Command-line interface definitions
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use mixtape::catalog::MemoryCatalog;
//! use mixtape::model::{Part, Playlist, SourceKind, SourceRef, Track, User};
//! use mixtape::runner::PlaylistRunner;
//! use mixtape::scheduler::FixedClock;
//! use mixtape::store::MemoryStore;
//!
//! let mut weekly = Playlist::new("alice", "weekly");
//! weekly.parts = vec![Part::album("Blue Train")];
//! weekly.target_uri = Some("remote:weekly".to_string());
//!
//! let store = MemoryStore::new()
//!     .with_user(User::new("alice").linked())
//!     .with_playlist(weekly);
//! let catalog = MemoryCatalog::new();
//! catalog.add_source(
//!     SourceRef::new(SourceKind::Album, "Blue Train"),
//!     vec![Track::new("t1", "Moment's Notice")],
//! );
//! catalog.add_playlist("alice", "remote:weekly");
//! let clock = FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
//!
//! let summary = PlaylistRunner::new(&store, &catalog, &clock).run_playlist("alice", "weekly")?;
//! assert_eq!(summary.tracks, 1);
//! assert_eq!(catalog.listing("remote:weekly"), vec!["t1"]);
//! # Ok::<(), mixtape::error::RunError>(())
//! ```

pub mod aggregator;
pub mod catalog;
pub mod cli;
pub mod completion;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod manage;
pub mod model;
pub mod pipeline;
pub mod resolver;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod tasks;
pub mod worker;
