//! Positional guess of the remote script behind an inline match.
//!
//! When a term only shows up inline, the library that defines it most likely
//! failed to load. The guess is the closest remote script tag preceding the
//! inline script, preferring tags whose fetch failed. No guess is made on
//! pages where every remote script responded.

use crate::document::DocumentIndex;
use crate::matcher::MatchOutcome;
use crate::page::NodeKey;
use crate::result::SuspectScript;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

struct Resolver<'a> {
    index: &'a DocumentIndex,
    remote_scripts: &'a HashMap<NodeKey, String>,
    non_responding: &'a HashSet<NodeKey>,
}

impl Resolver<'_> {
    fn resolve(&self, node: NodeKey) -> Option<SuspectScript> {
        let guess = self
            .index
            .closest_preceding(node, |n| self.non_responding.contains(&n))
            .or_else(|| {
                self.index
                    .closest_preceding(node, |n| self.remote_scripts.contains_key(&n))
            })?;

        let url = self.remote_scripts.get(&guess)?.clone();
        let distance = match self.index.distance(guess, node) {
            Ok(distance) => distance,
            Err(e) => {
                warn!("Skipping suspect script for {}: {}", node, e);
                return None;
            }
        };

        Some(SuspectScript {
            url,
            responded: !self.non_responding.contains(&guess),
            distance,
        })
    }
}

/// Attach a [`SuspectScript`] to every inline match of a term that has no
/// remote match.
pub fn attribute_suspects(outcome: &mut MatchOutcome, index: &DocumentIndex) {
    if outcome.non_responding.is_empty() {
        return;
    }

    let MatchOutcome {
        inline,
        remote,
        remote_scripts,
        non_responding,
        ..
    } = outcome;

    let resolver = Resolver {
        index,
        remote_scripts,
        non_responding,
    };

    for (term, matches) in inline.iter_mut() {
        if remote.get(term).is_some_and(|m| !m.is_empty()) {
            continue;
        }

        for inline_match in matches.iter_mut() {
            inline_match.suspect_script = resolver.resolve(inline_match.node);
            if let Some(suspect) = &inline_match.suspect_script {
                debug!(
                    "Attributed {} in inline script {} to {} (responded: {}, distance: {})",
                    term, inline_match.node, suspect.url, suspect.responded, suspect.distance
                );
            }
        }
    }
}
