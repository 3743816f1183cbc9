//! # Shell Completion Module
//!
//! Completion scripts generated from the clap definitions, plus the dynamic
//! playlist-name listing behind the hidden `complete-playlists` command.
//!
//! ## Usage
//!
//! ```bash
//! # Generate bash completions
//! mixtape completion bash > ~/.local/share/bash-completion/completions/mixtape
//!
//! # Generate zsh completions
//! mixtape completion zsh > ~/.config/zsh/completions/_mixtape
//! ```

use crate::store::{PlaylistStore, SqliteStore};
use anyhow::Result;
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io::{self, Write};
use std::path::Path;

/// Write completions for `cmd` to `out`.
pub fn write_completions<G: Generator>(gen: G, cmd: &mut Command, out: &mut dyn Write) {
    let name = cmd.get_name().to_string();
    generate(gen, cmd, name, out);
}

/// Generate shell completions for the given shell on stdout
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    write_completions(gen, cmd, &mut io::stdout());
}

/// Convert our Shell enum to clap_complete's Shell enum
pub fn shell_to_completion_shell(shell: &crate::cli::Shell) -> CompletionShell {
    match shell {
        crate::cli::Shell::Bash => CompletionShell::Bash,
        crate::cli::Shell::Zsh => CompletionShell::Zsh,
        crate::cli::Shell::Fish => CompletionShell::Fish,
        crate::cli::Shell::PowerShell => CompletionShell::PowerShell,
        crate::cli::Shell::Elvish => CompletionShell::Elvish,
    }
}

/// Sorted playlist names of `owner`. Empty when the database is missing or
/// unreadable, completion must never fail loudly.
#[must_use]
pub fn get_playlist_completions(db_path: &Path, owner: &str) -> Vec<String> {
    if !db_path.exists() {
        return Vec::new();
    }
    let Ok(store) = SqliteStore::open(db_path) else {
        return Vec::new();
    };

    match store.list_playlists(owner) {
        Ok(playlists) => {
            let mut names: Vec<String> = playlists.into_iter().map(|p| p.name).collect();
            names.sort();
            names
        }
        Err(_) => Vec::new(),
    }
}

fn quote_for_shell(name: &str) -> String {
    if name.contains(' ') || name.contains('\t') || name.contains('\n') {
        format!("\"{}\"", name.replace('"', "\\\""))
    } else {
        name.to_string()
    }
}

/// Print playlist names one per line, quoting names with whitespace.
pub fn print_playlist_completions(db_path: &Path, owner: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for name in get_playlist_completions(db_path, owner) {
        writeln!(out, "{}", quote_for_shell(&name))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use crate::model::Playlist;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_shell_conversion() {
        assert_eq!(
            shell_to_completion_shell(&crate::cli::Shell::Bash),
            CompletionShell::Bash
        );
        assert_eq!(
            shell_to_completion_shell(&crate::cli::Shell::Zsh),
            CompletionShell::Zsh
        );
    }

    #[test]
    fn test_bash_script_names_the_binary() {
        let mut out = Vec::new();
        write_completions(CompletionShell::Bash, &mut Args::command(), &mut out);
        let script = String::from_utf8(out).unwrap();
        assert!(script.contains("_mixtape"));
        assert!(script.contains("schedule-all"));
    }

    #[test]
    fn test_playlist_completions_missing_db() {
        let temp_dir = TempDir::new().unwrap();
        assert!(get_playlist_completions(&temp_dir.path().join("none.db"), "alice").is_empty());
    }

    #[test]
    fn test_playlist_completions_sorted() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("mixtape.db");
        let store = SqliteStore::open(&db_path)?;
        store.insert_playlist(&Playlist::new("alice", "zebra"))?;
        store.insert_playlist(&Playlist::new("alice", "Morning Mix"))?;
        store.insert_playlist(&Playlist::new("bob", "other"))?;

        assert_eq!(
            get_playlist_completions(&db_path, "alice"),
            vec!["Morning Mix", "zebra"]
        );
        assert_eq!(quote_for_shell("Morning Mix"), "\"Morning Mix\"");
        Ok(())
    }
}
