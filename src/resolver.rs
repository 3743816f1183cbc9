//! # Part Resolver
//!
//! Flattens a playlist's parts, nested playlist references included, into the
//! ordered list of concrete sources the aggregator fetches.
//!
//! ## Walk
//!
//! The walk is an explicit depth-first traversal with its own frame stack, over an
//! arena of playlist records loaded from the store on first reference:
//!
//! ```text
//! weekly: [album:A, ref:chill, track:T]          stack          output
//! chill:  [artist:B, ref:weekly]                 [weekly@0]     album:A
//!                                                [weekly@1]     (push chill)
//!                                                [weekly, chill@0] artist:B
//!                                                [weekly, chill@1] ref:weekly is on stack, skipped
//!                                                [weekly@2]     track:T
//! ```
//!
//! Nested expansions land where the reference was declared, so output order is
//! declaration order. Only a nested playlist's composition matters; its own
//! `shuffle` and `type` are ignored.
//!
//! ## Recovery
//!
//! - a reference back into a playlist on the current stack is a cycle: that branch
//!   is skipped with a warning
//! - a reference to a playlist that no longer exists is skipped with a warning
//! - references nested deeper than [`DEFAULT_MAX_DEPTH`] are skipped
//! - a store failure aborts with [`RunError::Store`]
//! - an empty result is [`RunError::EmptyComposition`]

use crate::error::{RunError, RunResult};
use crate::model::{Playlist, ResolvedComposition};
use crate::store::PlaylistStore;
use log::{debug, trace, warn};
use std::collections::{HashMap, HashSet};

/// Nesting limit for playlist references.
pub const DEFAULT_MAX_DEPTH: usize = 32;

struct Frame {
    name: String,
    /// Next composition index to visit.
    index: usize,
}

pub struct PartResolver<'a> {
    store: &'a dyn PlaylistStore,
    max_depth: usize,
}

impl<'a> PartResolver<'a> {
    pub fn new(store: &'a dyn PlaylistStore) -> Self {
        Self {
            store,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn resolve(&self, playlist: &Playlist) -> RunResult<ResolvedComposition> {
        let owner = playlist.owner.as_str();
        let mut arena: HashMap<String, Playlist> = HashMap::new();
        arena.insert(playlist.name.clone(), playlist.clone());

        let mut on_stack: HashSet<String> = HashSet::new();
        on_stack.insert(playlist.name.clone());
        let mut stack = vec![Frame {
            name: playlist.name.clone(),
            index: 0,
        }];
        let mut sources = Vec::new();

        while let Some(frame) = stack.last_mut() {
            let part = arena
                .get(&frame.name)
                .and_then(|current| current.composition_part(frame.index));
            frame.index += 1;

            let Some(part) = part else {
                if let Some(done) = stack.pop() {
                    trace!("finished {owner} / {}", done.name);
                    on_stack.remove(&done.name);
                }
                continue;
            };

            if let Some(source) = part.source() {
                sources.push(source);
                continue;
            }

            let target = part.id;
            if on_stack.contains(&target) {
                warn!(
                    "cycle in {owner} / {}: reference to {target} is already being resolved, skipping",
                    playlist.name
                );
                continue;
            }
            if stack.len() >= self.max_depth {
                warn!(
                    "references in {owner} / {} nest deeper than {}, skipping {target}",
                    playlist.name, self.max_depth
                );
                continue;
            }
            if !arena.contains_key(&target) {
                match self.store.get_playlist(owner, &target).map_err(RunError::Store)? {
                    Some(nested) => {
                        arena.insert(target.clone(), nested);
                    }
                    None => {
                        warn!(
                            "{owner} / {} references missing playlist {target}, skipping",
                            playlist.name
                        );
                        continue;
                    }
                }
            }

            debug!("expanding {owner} / {target}");
            on_stack.insert(target.clone());
            stack.push(Frame {
                name: target,
                index: 0,
            });
        }

        if sources.is_empty() {
            return Err(RunError::EmptyComposition {
                owner: owner.to_string(),
                name: playlist.name.clone(),
            });
        }

        debug!(
            "{owner} / {} resolved to {} source(s)",
            playlist.name,
            sources.len()
        );
        Ok(ResolvedComposition::new(sources))
    }
}
