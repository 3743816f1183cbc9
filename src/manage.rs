//! Account and playlist lifecycle: creation with remote provisioning, partial
//! updates, deletion, and the account flags bulk scheduling looks at.
//!
//! Deleting a playlist removes the stored definition only; the remote playlist
//! it wrote to stays in the catalog.

use crate::catalog::Catalog;
use crate::config::RuntimeConfig;
use crate::model::{
    FieldUpdate, Part, Playlist, PlaylistType, PlaylistUpdate, RecentsOptions, User,
};
use crate::store::PlaylistStore;
use anyhow::{bail, Context, Result};
use log::{info, warn};

pub fn add_user(store: &dyn PlaylistStore, username: &str, linked: bool, locked: bool) -> Result<User> {
    let username = username.trim();
    if username.is_empty() {
        bail!("username cannot be empty");
    }
    if store.get_user(username)?.is_some() {
        bail!("user {username} already exists");
    }
    let user = User {
        username: username.to_string(),
        linked,
        locked,
    };
    store.put_user(&user)?;
    info!("added user {username}");
    Ok(user)
}

/// Change the link and lock flags of an account. `None` leaves a flag alone.
pub fn set_account_flags(
    store: &dyn PlaylistStore,
    username: &str,
    linked: Option<bool>,
    locked: Option<bool>,
) -> Result<User> {
    if linked.is_none() && locked.is_none() {
        bail!("no changes to make");
    }
    let mut user = store
        .get_user(username)?
        .with_context(|| format!("user {username} not found"))?;
    if let Some(linked) = linked {
        user.linked = linked;
    }
    if let Some(locked) = locked {
        user.locked = locked;
    }
    store.put_user(&user)?;
    info!(
        "{username}: linked={} locked={}",
        user.linked, user.locked
    );
    Ok(user)
}

/// A playlist creation request. Unset numbers take the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPlaylist {
    pub name: String,
    pub kind: PlaylistType,
    pub parts: Vec<Part>,
    pub playlist_references: Vec<String>,
    pub shuffle: bool,
    pub include_recommendations: bool,
    pub recommendation_sample: Option<u32>,
    pub day_boundary: Option<u32>,
    pub add_this_month: bool,
    pub add_last_month: bool,
    pub description_overwrite: Option<String>,
    pub description_suffix: Option<String>,
}

impl NewPlaylist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Every name referenced by `parts` and `references` must be another playlist
/// of `owner`.
fn check_references(
    store: &dyn PlaylistStore,
    owner: &str,
    name: &str,
    parts: &[Part],
    references: &[String],
) -> Result<()> {
    let referenced = parts
        .iter()
        .filter(|part| part.is_reference())
        .map(|part| part.id.as_str())
        .chain(references.iter().map(String::as_str));

    for target in referenced {
        if target == name {
            bail!("{owner} / {name} cannot reference itself");
        }
        if store.get_playlist(owner, target)?.is_none() {
            bail!("referenced playlist {owner} / {target} not found");
        }
    }
    Ok(())
}

pub fn create_playlist(
    store: &dyn PlaylistStore,
    catalog: &dyn Catalog,
    config: &RuntimeConfig,
    owner: &str,
    request: NewPlaylist,
) -> Result<Playlist> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        bail!("playlist name cannot be empty");
    }
    let user = store
        .get_user(owner)?
        .with_context(|| format!("user {owner} not found"))?;
    if store.get_playlist(owner, &name)?.is_some() {
        bail!("playlist {owner} / {name} already exists");
    }
    check_references(store, owner, &name, &request.parts, &request.playlist_references)?;

    let mut playlist = Playlist::new(owner, name.as_str());
    playlist.kind = request.kind;
    playlist.parts = request.parts;
    playlist.playlist_references = request.playlist_references;
    playlist.shuffle = request.shuffle;
    playlist.include_recommendations = request.include_recommendations;
    playlist.recommendation_sample = request
        .recommendation_sample
        .unwrap_or(config.default_recommendation_sample);
    playlist.description_overwrite = request.description_overwrite;
    playlist.description_suffix = request.description_suffix;
    if playlist.kind == PlaylistType::Recents || request.day_boundary.is_some() {
        playlist.recents = Some(RecentsOptions {
            day_boundary: request
                .day_boundary
                .unwrap_or(config.default_day_boundary)
                .max(1),
            add_this_month: request.add_this_month,
            add_last_month: request.add_last_month,
        });
    }

    if user.linked {
        match catalog.create_playlist(&user, &name) {
            Ok(uri) => playlist.target_uri = Some(uri),
            Err(e) => warn!("could not provision remote playlist for {owner} / {name}: {e:#}"),
        }
    }

    store.insert_playlist(&playlist)?;
    info!("created {owner} / {name}");
    Ok(playlist)
}

pub fn update_playlist(
    store: &dyn PlaylistStore,
    owner: &str,
    name: &str,
    update: PlaylistUpdate,
) -> Result<Playlist> {
    if update.is_empty() {
        bail!("no changes to make");
    }
    let mut playlist = store
        .get_playlist(owner, name)?
        .with_context(|| format!("playlist {owner} / {name} not found"))?;

    let parts: &[Part] = match &update.parts {
        FieldUpdate::Set(parts) => parts.as_slice(),
        _ => &[],
    };
    let references: &[String] = match &update.playlist_references {
        FieldUpdate::Set(references) => references.as_slice(),
        _ => &[],
    };
    check_references(store, owner, name, parts, references)?;

    update.apply(&mut playlist);
    store.save_playlist(&playlist)?;
    info!("updated {owner} / {name}");
    Ok(playlist)
}

pub fn delete_playlist(store: &dyn PlaylistStore, owner: &str, name: &str) -> Result<()> {
    if !store.delete_playlist(owner, name)? {
        bail!("playlist {owner} / {name} not found");
    }
    info!("deleted {owner} / {name}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::store::MemoryStore;

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_user(User::new("alice").linked())
            .with_user(User::new("bob"))
    }

    #[test]
    fn test_create_applies_defaults_and_provisions() -> Result<()> {
        let store = store();
        let catalog = MemoryCatalog::new();
        let config = RuntimeConfig::default();

        let mut request = NewPlaylist::new("mix");
        request.parts = vec![Part::album("A")];
        let created = create_playlist(&store, &catalog, &config, "alice", request)?;

        assert_eq!(created.kind, PlaylistType::Default);
        assert_eq!(created.recommendation_sample, 10);
        assert!(created.recents.is_none());
        let uri = created.target_uri.clone().expect("provisioned");
        assert!(catalog.playlist(&uri).is_some());
        assert_eq!(store.get_playlist("alice", "mix")?, Some(created));
        Ok(())
    }

    #[test]
    fn test_create_recents_defaults() -> Result<()> {
        let store = store();
        let mut request = NewPlaylist::new("new");
        request.kind = PlaylistType::Recents;

        let created = create_playlist(
            &store,
            &MemoryCatalog::new(),
            &RuntimeConfig::default(),
            "alice",
            request,
        )?;
        assert_eq!(created.recents, Some(RecentsOptions::default()));
        Ok(())
    }

    #[test]
    fn test_unlinked_owner_gets_no_target() -> Result<()> {
        let store = store();
        let created = create_playlist(
            &store,
            &MemoryCatalog::new(),
            &RuntimeConfig::default(),
            "bob",
            NewPlaylist::new("draft"),
        )?;
        assert!(created.target_uri.is_none());
        Ok(())
    }

    #[test]
    fn test_create_rejects_duplicates_and_unknown_references() -> Result<()> {
        let store = store();
        let catalog = MemoryCatalog::new();
        let config = RuntimeConfig::default();
        create_playlist(&store, &catalog, &config, "alice", NewPlaylist::new("mix"))?;

        assert!(create_playlist(&store, &catalog, &config, "alice", NewPlaylist::new("mix")).is_err());
        assert!(create_playlist(&store, &catalog, &config, "ghost", NewPlaylist::new("x")).is_err());

        let mut dangling = NewPlaylist::new("other");
        dangling.playlist_references = vec!["nope".to_string()];
        assert!(create_playlist(&store, &catalog, &config, "alice", dangling).is_err());

        let mut nested = NewPlaylist::new("nested");
        nested.parts = vec![Part::reference("mix")];
        assert!(create_playlist(&store, &catalog, &config, "alice", nested).is_ok());
        Ok(())
    }

    #[test]
    fn test_update_requires_changes() {
        let store = store();
        let err = update_playlist(&store, "alice", "mix", PlaylistUpdate::default()).unwrap_err();
        assert_eq!(err.to_string(), "no changes to make");
    }

    #[test]
    fn test_update_clears_references() -> Result<()> {
        let store = store();
        let catalog = MemoryCatalog::new();
        let config = RuntimeConfig::default();
        create_playlist(&store, &catalog, &config, "alice", NewPlaylist::new("base"))?;
        let mut request = NewPlaylist::new("mix");
        request.playlist_references = vec!["base".to_string()];
        create_playlist(&store, &catalog, &config, "alice", request)?;

        let updated = update_playlist(
            &store,
            "alice",
            "mix",
            PlaylistUpdate {
                playlist_references: FieldUpdate::Clear,
                ..PlaylistUpdate::default()
            },
        )?;
        assert!(updated.playlist_references.is_empty());

        let self_reference = PlaylistUpdate {
            playlist_references: FieldUpdate::Set(vec!["mix".to_string()]),
            ..PlaylistUpdate::default()
        };
        assert!(update_playlist(&store, "alice", "mix", self_reference).is_err());
        Ok(())
    }

    #[test]
    fn test_delete() -> Result<()> {
        let store = store();
        create_playlist(
            &store,
            &MemoryCatalog::new(),
            &RuntimeConfig::default(),
            "alice",
            NewPlaylist::new("mix"),
        )?;
        delete_playlist(&store, "alice", "mix")?;
        assert!(delete_playlist(&store, "alice", "mix").is_err());
        Ok(())
    }

    #[test]
    fn test_account_flags() -> Result<()> {
        let store = store();
        assert!(add_user(&store, "alice", false, false).is_err());
        add_user(&store, "carol", true, false)?;

        let carol = set_account_flags(&store, "carol", None, Some(true))?;
        assert!(carol.linked && carol.locked);
        assert!(!carol.is_eligible());
        assert!(set_account_flags(&store, "carol", None, None).is_err());
        assert!(set_account_flags(&store, "ghost", Some(true), None).is_err());
        Ok(())
    }
}
