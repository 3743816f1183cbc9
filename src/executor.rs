//! Playlist execution: overwrite the remote listing with the final tracks, then
//! refresh the description.
//!
//! The listing is replaced wholesale, never diffed, so rerunning a delivery ends in
//! the same remote state. A rejected listing write is returned to the caller as
//! [`RunError::RemoteWriteFailed`] and not retried here. Once the listing is
//! written the run counts as done; a failed description update is only logged.

use crate::catalog::Catalog;
use crate::error::{RunError, RunResult};
use crate::model::{Track, User};
use log::{debug, info, warn};

/// Separator between part names in a generated description.
pub const NAME_SEPARATOR: &str = " / ";

/// Description text for a run.
///
/// `overwrite` replaces the generated part list entirely; `suffix` is appended
/// after ` - ` either way. `part_names` is expected sorted and distinct.
#[must_use]
pub fn describe(part_names: &[String], overwrite: Option<&str>, suffix: Option<&str>) -> String {
    let mut description = match overwrite {
        Some(text) => text.to_string(),
        None => part_names.join(NAME_SEPARATOR),
    };
    if let Some(suffix) = suffix {
        description.push_str(" - ");
        description.push_str(suffix);
    }
    description
}

pub struct PlaylistExecutor<'a> {
    catalog: &'a dyn Catalog,
}

impl<'a> PlaylistExecutor<'a> {
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self { catalog }
    }

    pub fn execute(
        &self,
        user: &User,
        tracks: &[Track],
        target_uri: &str,
        description: &str,
    ) -> RunResult<()> {
        let ids: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();

        self.catalog
            .replace_tracks(user, target_uri, &ids)
            .map_err(|e| RunError::RemoteWriteFailed {
                uri: target_uri.to_string(),
                reason: format!("{e:#}"),
            })?;
        debug!("wrote {} track(s) to {target_uri}", ids.len());

        // Listing already replaced: the run has succeeded from here on.
        if let Err(e) = self.catalog.set_description(user, target_uri, description) {
            warn!("listing of {target_uri} written but description update failed: {e:#}");
        }

        info!("updated {target_uri} for {}: {description}", user.username);
        Ok(())
    }
}
