//! # Integration Tests for Mixtape
//!
//! End-to-end behavior from a user's perspective: full runs through the
//! in-memory collaborators, the SQLite-backed pieces working together, and the
//! `mixtape` binary driven against a temporary database.

use anyhow::Result;
use chrono::{NaiveDate, TimeZone, Utc};
use mixtape::catalog::{LocalCatalog, MemoryCatalog};
use mixtape::config::RuntimeConfig;
use mixtape::dispatch::Dispatcher;
use mixtape::error::RunError;
use mixtape::model::{Part, Playlist, PlaylistType, RecentsOptions, SourceKind, SourceRef, Track, User};
use mixtape::runner::PlaylistRunner;
use mixtape::scheduler::{BulkScheduler, FixedClock};
use mixtape::store::{MemoryStore, PlaylistStore, SqliteStore};
use mixtape::tasks::{MemoryTaskQueue, SqliteTaskQueue, TaskPayload};
use mixtape::worker::Worker;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap())
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn playlist(name: &str, parts: Vec<Part>, references: &[&str]) -> Playlist {
    let mut playlist = Playlist::new("alice", name);
    playlist.parts = parts;
    playlist.playlist_references = references.iter().map(|r| r.to_string()).collect();
    playlist.target_uri = Some(format!("remote:{name}"));
    playlist
}

/// Catalog with two albums and an artist whose tracks overlap one album.
fn seeded_catalog() -> MemoryCatalog {
    let catalog = MemoryCatalog::new();
    catalog.add_source(
        SourceRef::new(SourceKind::Album, "A"),
        vec![
            Track::new("a1", "One").by("X", "A").released(date(2024, 6, 10)),
            Track::new("a2", "Two").by("X", "A").released(date(2023, 1, 1)),
        ],
    );
    catalog.add_source(
        SourceRef::new(SourceKind::Album, "B"),
        vec![Track::new("b1", "Three").by("Y", "B").released(date(2024, 5, 30))],
    );
    catalog.add_source(
        SourceRef::new(SourceKind::Artist, "X"),
        vec![
            Track::new("a1", "One").by("X", "A").released(date(2024, 6, 10)),
            Track::new("x9", "Nine").by("X", "C").released(date(2024, 6, 1)),
        ],
    );
    for name in ["root", "mid", "leaf", "recent"] {
        catalog.add_playlist("alice", &format!("remote:{name}"));
    }
    catalog
}

#[cfg(test)]
mod end_to_end_tests {
    use super::*;

    #[test]
    fn test_nested_run_writes_sorted_unique_tracks() -> Result<()> {
        let store = MemoryStore::new()
            .with_user(User::new("alice").linked())
            .with_playlist(playlist("leaf", vec![Part::artist("X")], &[]))
            .with_playlist(playlist("mid", vec![Part::album("B")], &["leaf"]))
            .with_playlist(playlist("root", vec![Part::album("A")], &["mid"]));
        let catalog = seeded_catalog();
        let clock = clock();

        let summary = PlaylistRunner::new(&store, &catalog, &clock).run_playlist("alice", "root")?;

        assert_eq!(summary.sources, 3);
        assert_eq!(summary.tracks, 4);
        // Newest first, the duplicate a1 kept once
        assert_eq!(catalog.listing("remote:root"), vec!["a1", "x9", "b1", "a2"]);
        assert_eq!(summary.description, "A / B / X");
        Ok(())
    }

    #[test]
    fn test_rerun_is_idempotent() -> Result<()> {
        let store = MemoryStore::new()
            .with_user(User::new("alice").linked())
            .with_playlist(playlist("root", vec![Part::album("A"), Part::album("B")], &[]));
        let catalog = seeded_catalog();
        let clock = clock();
        let runner = PlaylistRunner::new(&store, &catalog, &clock);

        runner.run_playlist("alice", "root")?;
        let first = catalog.playlist("remote:root").unwrap();
        runner.run_playlist("alice", "root")?;
        let second = catalog.playlist("remote:root").unwrap();

        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_mutual_references_terminate() -> Result<()> {
        let store = MemoryStore::new()
            .with_user(User::new("alice").linked())
            .with_playlist(playlist("root", vec![Part::album("A")], &["mid"]))
            .with_playlist(playlist("mid", vec![Part::album("B")], &["root"]));
        let catalog = seeded_catalog();
        let clock = clock();

        let summary = PlaylistRunner::new(&store, &catalog, &clock).run_playlist("alice", "root")?;
        assert_eq!(summary.sources, 2);
        assert_eq!(catalog.listing("remote:root"), vec!["a1", "b1", "a2"]);
        Ok(())
    }

    #[test]
    fn test_recents_keeps_window_only() -> Result<()> {
        let mut recent = playlist("recent", vec![Part::album("A"), Part::album("B")], &[]);
        recent.kind = PlaylistType::Recents;
        recent.recents = Some(RecentsOptions {
            day_boundary: 10,
            add_this_month: false,
            add_last_month: false,
        });
        let store = MemoryStore::new()
            .with_user(User::new("alice").linked())
            .with_playlist(recent);
        let catalog = seeded_catalog();
        let clock = clock();

        PlaylistRunner::new(&store, &catalog, &clock).run_playlist("alice", "recent")?;
        // 2024-06-15 minus 10 days: only a1 (06-10) qualifies
        assert_eq!(catalog.listing("remote:recent"), vec!["a1"]);
        Ok(())
    }

    #[test]
    fn test_partial_source_failure_still_writes() -> Result<()> {
        let store = MemoryStore::new()
            .with_user(User::new("alice").linked())
            .with_playlist(playlist("root", vec![Part::album("A"), Part::album("B")], &[]));
        let catalog = seeded_catalog();
        catalog.fail_source(SourceRef::new(SourceKind::Album, "B"));
        let clock = clock();

        let summary = PlaylistRunner::new(&store, &catalog, &clock).run_playlist("alice", "root")?;
        assert_eq!(summary.tracks, 2);
        Ok(())
    }

    #[test]
    fn test_all_sources_failing_leaves_remote_untouched() {
        let store = MemoryStore::new()
            .with_user(User::new("alice").linked())
            .with_playlist(playlist("root", vec![Part::album("A")], &[]));
        let catalog = seeded_catalog();
        catalog.fail_source(SourceRef::new(SourceKind::Album, "A"));
        let clock = clock();

        let err = PlaylistRunner::new(&store, &catalog, &clock)
            .run_playlist("alice", "root")
            .unwrap_err();
        assert!(matches!(err, RunError::SourceUnavailable { failed: 1 }));
        assert_eq!(catalog.write_count(), 0);
    }

    #[test]
    fn test_inline_bulk_run_refreshes_every_playlist() {
        let store = MemoryStore::new()
            .with_user(User::new("alice").linked())
            .with_user(User {
                username: "bob".to_string(),
                linked: true,
                locked: true,
            })
            .with_playlist(playlist("root", vec![Part::album("A")], &[]))
            .with_playlist(playlist("mid", vec![Part::album("B")], &[]))
            .with_playlist(Playlist::new("alice", "draft"));
        let catalog = seeded_catalog();
        let queue = MemoryTaskQueue::new();
        let clock = clock();

        let emitted = BulkScheduler::new(&store, &queue, &clock)
            .schedule_all_users()
            .unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].payload, TaskPayload::run_user("alice"));

        let dispatcher = Dispatcher::new(
            BulkScheduler::new(&store, &queue, &clock),
            PlaylistRunner::new(&store, &catalog, &clock),
        );
        let report = dispatcher.drain(&queue);

        // One user execution plus the two schedulable playlists
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(catalog.listing("remote:root"), vec!["a1", "a2"]);
        assert_eq!(catalog.listing("remote:mid"), vec!["b1"]);
    }
}

#[cfg(test)]
mod sqlite_tests {
    use super::*;

    #[test]
    fn test_worker_delivers_queued_runs_against_local_catalog() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("mixtape.db");

        let mut catalog = LocalCatalog::open(&db_path)?;
        catalog.import(&serde_json::from_str(
            r#"{
                "tracks": [
                    {"id": "t1", "name": "Moment's Notice", "artist": "Coltrane", "album": "Blue Train", "release_date": "1958-01-01"},
                    {"id": "t2", "name": "Locomotion", "artist": "Coltrane", "album": "Blue Train", "release_date": "1958-01-01"}
                ]
            }"#,
        )?)?;

        let store = SqliteStore::open(&db_path)?;
        let config = RuntimeConfig::default().with_db_path(&db_path)?;
        let alice = User::new("alice").linked();
        store.put_user(&alice)?;

        let mut request = mixtape::manage::NewPlaylist::new("jazz");
        request.parts = vec![Part::album("Blue Train")];
        let created = mixtape::manage::create_playlist(&store, &catalog, &config, "alice", request)?;
        let uri = created.target_uri.expect("linked owner gets a remote playlist");

        let queue = SqliteTaskQueue::open(&db_path)?;
        let clock = clock();
        let scheduler = BulkScheduler::new(&store, &queue, &clock).with_staggers(0, 0);
        scheduler.schedule_all_users()?;

        let dispatcher = Dispatcher::new(
            BulkScheduler::new(&store, &queue, &clock).with_staggers(0, 0),
            PlaylistRunner::new(&store, &catalog, &clock),
        );
        let worker = Worker::new(&queue, dispatcher, &clock, &config);

        // First poll fans the user out, second runs the playlist
        assert_eq!(worker.run_once()?.completed, 1);
        assert_eq!(worker.run_once()?.completed, 1);
        assert_eq!(queue.pending_count()?, 0);

        let remote = catalog.playlist(&uri)?.unwrap();
        assert_eq!(remote.tracks, vec!["t1", "t2"]);
        assert_eq!(remote.description, "Blue Train");
        Ok(())
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    fn mixtape(data_home: &Path, db: &Path, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_mixtape"))
            .env("XDG_DATA_HOME", data_home)
            .env_remove("MIXTAPE_DB")
            .arg("--db")
            .arg(db)
            .args(args)
            .output()
            .expect("Failed to run mixtape")
    }

    fn stdout(output: &Output) -> String {
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    fn setup() -> Result<(TempDir, PathBuf)> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("mixtape.db");
        let catalog_file = temp_dir.path().join("catalog.json");
        std::fs::write(
            &catalog_file,
            r#"{
                "tracks": [
                    {"id": "t1", "name": "One", "artist": "X", "album": "A", "release_date": "2024-01-01"},
                    {"id": "t2", "name": "Two", "artist": "X", "album": "A", "release_date": "2024-02-01"},
                    {"id": "t3", "name": "Three", "artist": "Y", "album": "B"}
                ]
            }"#,
        )?;
        let output = mixtape(
            temp_dir.path(),
            &db_path,
            &["catalog", "import", catalog_file.to_str().unwrap()],
        );
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert!(stdout(&output).contains("Imported 3 track(s)"));
        Ok((temp_dir, db_path))
    }

    #[test]
    fn test_cli_help_displays_correctly() {
        let output = Command::new(env!("CARGO_BIN_EXE_mixtape"))
            .arg("--help")
            .output()
            .expect("Failed to run help command");

        let stdout = stdout(&output);
        assert!(stdout.contains("mixtape"));
        assert!(stdout.contains("schedule-all"));
    }

    #[test]
    fn test_completion_generation() {
        let output = Command::new(env!("CARGO_BIN_EXE_mixtape"))
            .args(["completion", "bash"])
            .output()
            .expect("Failed to run completion command");

        assert!(output.status.success());
        assert!(stdout(&output).contains("_mixtape"));
    }

    #[test]
    fn test_define_and_run_playlist() -> Result<()> {
        let (temp_dir, db) = setup()?;
        let home = temp_dir.path();

        assert!(mixtape(home, &db, &["user", "add", "alice", "--linked"]).status.success());
        let output = mixtape(home, &db, &["playlist", "add", "alice", "base", "--part", "album:B"]);
        assert!(output.status.success());
        let output = mixtape(
            home,
            &db,
            &["playlist", "add", "alice", "mix", "--part", "album:A", "--reference", "base"],
        );
        assert!(output.status.success());

        let output = mixtape(home, &db, &["run", "alice", "mix"]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        let out = stdout(&output);
        assert!(out.contains("Wrote 3 track(s) from 2 source(s)"));
        assert!(out.contains("A / B"));

        let output = mixtape(home, &db, &["playlist", "show", "alice", "mix"]);
        let shown: Playlist = serde_json::from_str(&stdout(&output))?;
        assert_eq!(shown.playlist_references, vec!["base"]);
        Ok(())
    }

    #[test]
    fn test_run_without_target_fails() -> Result<()> {
        let (temp_dir, db) = setup()?;
        let home = temp_dir.path();

        // Unlinked owners get no remote playlist at creation
        assert!(mixtape(home, &db, &["user", "add", "bob"]).status.success());
        assert!(mixtape(home, &db, &["playlist", "add", "bob", "mix", "--part", "album:A"])
            .status
            .success());

        let output = mixtape(home, &db, &["run", "bob", "mix"]);
        assert!(!output.status.success());
        Ok(())
    }

    #[test]
    fn test_schedule_all_deferred_then_inline() -> Result<()> {
        let (temp_dir, db) = setup()?;
        let home = temp_dir.path();
        assert!(mixtape(home, &db, &["user", "add", "alice", "--linked"]).status.success());
        assert!(mixtape(home, &db, &["user", "add", "carol", "--linked", "--locked"])
            .status
            .success());
        assert!(mixtape(home, &db, &["playlist", "add", "alice", "mix", "--part", "album:A"])
            .status
            .success());

        let output = mixtape(home, &db, &["schedule-all"]);
        assert!(output.status.success());
        assert!(stdout(&output).contains("Scheduled 1 execution(s)"));
        let queue = SqliteTaskQueue::open(&db)?;
        assert_eq!(queue.pending_count()?, 1);

        let output = mixtape(home, &db, &["--inline", "schedule-all"]);
        assert!(output.status.success());
        assert!(stdout(&output).contains("Ran inline: 2 succeeded, 0 failed"));
        // Inline runs never touch the persistent queue
        assert_eq!(queue.pending_count()?, 1);
        Ok(())
    }

    #[test]
    fn test_update_rejects_empty_change() -> Result<()> {
        let (temp_dir, db) = setup()?;
        let home = temp_dir.path();
        assert!(mixtape(home, &db, &["user", "add", "alice"]).status.success());
        assert!(mixtape(home, &db, &["playlist", "add", "alice", "mix"]).status.success());

        let output = mixtape(home, &db, &["playlist", "update", "alice", "mix"]);
        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("no changes to make"));
        Ok(())
    }
}
