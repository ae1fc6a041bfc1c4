//! Registry reconciliation.
//!
//! The merge combines fresh per-server listings with the previously known
//! registry. It is registry-first and never destructive: a server that
//! failed to respond keeps its existing entries, and a hash only moves to
//! the trash when a complete cycle across every known server confirms it
//! is hosted nowhere.

use std::collections::{BTreeMap, HashSet};

use super::Blob;

/// Result of listing one server.
#[derive(Debug, Clone)]
pub struct ServerListing {
    /// Server root this listing came from.
    pub server_url: String,
    /// Blobs collected, possibly partial when the listing failed mid-way.
    pub blobs: Vec<Blob>,
    /// Whether the listing ran to completion.
    pub outcome: ListingOutcome,
}

/// Caller-visible distinction between "server returned empty" and
/// "server fetch failed". The merge must never treat the latter as
/// confirmation of absence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingOutcome {
    /// Every page was fetched; absence from `blobs` means absence from
    /// the server.
    Complete,
    /// The listing aborted; `blobs` holds whatever was collected.
    Failed(String),
}

impl ListingOutcome {
    /// Whether the listing completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Output of one merge cycle.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// New registry, deduplicated by `(hash, server)` and sorted by
    /// creation time descending (unknown timestamps last).
    pub registry: Vec<Blob>,
    /// New trash set, one record per hash, `server_url = None`.
    pub trash: Vec<Blob>,
    /// Hashes demoted to trash this cycle.
    pub demoted: Vec<String>,
    /// Hashes restored from trash this cycle.
    pub restored: Vec<String>,
}

/// Merge fresh per-server listings into the known registry.
///
/// `known_servers` is the full configured server set; demotion to trash
/// requires a completed listing from every one of them. `vaulted_hashes`
/// extends local knowledge with vault-only content so a vaulted file whose
/// last remote copy disappeared still lands in the trash instead of
/// vanishing.
#[must_use]
pub fn merge(
    current_registry: &[Blob],
    current_trash: &[Blob],
    listings: &[ServerListing],
    known_servers: &[String],
    vaulted_hashes: &HashSet<String>,
) -> MergeOutcome {
    // Upsert: replace the existing entry for the exact (hash, server) key
    // if present, else append. BTreeMap keeps the keying exact while the
    // insertion order is restored by the sort below.
    let mut entries: BTreeMap<String, Blob> = current_registry
        .iter()
        .map(|b| (b.registry_key(), b.clone()))
        .collect();

    for listing in listings {
        for blob in &listing.blobs {
            let mut blob = blob.clone();
            blob.server_url = Some(listing.server_url.clone());
            entries.insert(blob.registry_key(), blob);
        }
    }

    // A completed listing is authoritative for its server: entries that
    // disappeared from it are dropped. Failed listings keep theirs.
    for listing in listings {
        if !listing.outcome.is_complete() {
            continue;
        }
        let fresh: HashSet<&str> = listing
            .blobs
            .iter()
            .map(|b| b.content_hash.as_str())
            .collect();
        entries.retain(|_, blob| {
            blob.server_url.as_deref() != Some(listing.server_url.as_str())
                || fresh.contains(blob.content_hash.as_str())
        });
    }

    let mut registry: Vec<Blob> = entries.into_values().collect();
    registry.sort_by(|a, b| b.creation_time.cmp(&a.creation_time));

    let hosted: HashSet<&str> = registry.iter().map(|b| b.content_hash.as_str()).collect();

    // A hash that reappeared on any server leaves the trash in the same
    // cycle it re-enters the registry.
    let mut trash: Vec<Blob> = Vec::new();
    let mut restored = Vec::new();
    for record in current_trash {
        if hosted.contains(record.content_hash.as_str()) {
            restored.push(record.content_hash.clone());
        } else {
            trash.push(record.clone());
        }
    }

    // Demotion needs a complete cycle: one failed server must never turn
    // a transient error into a trashed file.
    let cycle_complete = known_servers.iter().all(|server| {
        listings
            .iter()
            .any(|l| l.server_url == *server && l.outcome.is_complete())
    });

    let mut demoted = Vec::new();
    if cycle_complete {
        let trashed: HashSet<String> = trash.iter().map(|b| b.content_hash.clone()).collect();
        let mut local_knowledge: Vec<&Blob> = current_registry.iter().collect();
        let prior_hashes: HashSet<&str> = current_registry
            .iter()
            .map(|b| b.content_hash.as_str())
            .collect();
        let vault_only: Vec<Blob> = vaulted_hashes
            .iter()
            .filter(|h| !prior_hashes.contains(h.as_str()))
            .map(|h| Blob {
                content_hash: h.clone(),
                url: String::new(),
                size_bytes: None,
                mime_type: None,
                server_url: None,
                creation_time: 0,
                tags: Vec::new(),
            })
            .collect();
        local_knowledge.extend(vault_only.iter());

        for blob in local_knowledge {
            let hash = blob.content_hash.as_str();
            if hosted.contains(hash) || trashed.contains(hash) || demoted.iter().any(|d| d == hash)
            {
                continue;
            }
            trash.push(blob.clone().into_trash_record());
            demoted.push(hash.to_string());
        }
    }

    // One trash record per hash.
    let mut seen = HashSet::new();
    trash.retain(|b| seen.insert(b.content_hash.clone()));

    MergeOutcome {
        registry,
        trash,
        demoted,
        restored,
    }
}

/// Upsert one blob into a registry vector, replacing any existing entry
/// for the same `(hash, server)` key.
///
/// Uploads go through this same path as discovered blobs so the two never
/// diverge.
pub fn upsert_blob(registry: &mut Vec<Blob>, blob: Blob) {
    let key = blob.registry_key();
    match registry.iter_mut().find(|b| b.registry_key() == key) {
        Some(existing) => *existing = blob,
        None => registry.push(blob),
    }
    registry.sort_by(|a, b| b.creation_time.cmp(&a.creation_time));
}

/// Check the trash/registry exclusivity invariant: after a completed
/// merge, a hash is hosted on at least one server XOR present in trash.
#[must_use]
pub fn exclusivity_holds(registry: &[Blob], trash: &[Blob]) -> bool {
    let hosted: HashSet<&str> = registry
        .iter()
        .filter(|b| b.server_url.is_some())
        .map(|b| b.content_hash.as_str())
        .collect();
    trash.iter().all(|b| !hosted.contains(b.content_hash.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::registry_key;
    use crate::registry::test_support::{hosted, hosted_at};

    const S1: &str = "https://s1.example.com";
    const S2: &str = "https://s2.example.com";

    fn servers() -> Vec<String> {
        vec![S1.to_string(), S2.to_string()]
    }

    fn complete(server: &str, blobs: Vec<Blob>) -> ServerListing {
        ServerListing {
            server_url: server.to_string(),
            blobs,
            outcome: ListingOutcome::Complete,
        }
    }

    fn failed(server: &str) -> ServerListing {
        ServerListing {
            server_url: server.to_string(),
            blobs: Vec::new(),
            outcome: ListingOutcome::Failed("connection refused".to_string()),
        }
    }

    #[test]
    fn failed_fetch_is_non_destructive() {
        let registry = vec![hosted("aa", S1), hosted("bb", S2)];
        let trash = vec![hosted("cc", S1).into_trash_record()];

        let outcome = merge(
            &registry,
            &trash,
            &[failed(S1), failed(S2)],
            &servers(),
            &HashSet::new(),
        );

        assert_eq!(outcome.registry.len(), 2);
        assert_eq!(outcome.trash.len(), 1);
        assert!(outcome.demoted.is_empty());
        assert!(outcome.restored.is_empty());
    }

    #[test]
    fn partial_demotion_keeps_hash_out_of_trash() {
        // h hosted on S1 and S2; fresh cycle sees it only on S2.
        let registry = vec![hosted("hh", S1), hosted("hh", S2)];

        let outcome = merge(
            &registry,
            &[],
            &[
                complete(S1, vec![]),
                complete(S2, vec![hosted("hh", S2)]),
            ],
            &servers(),
            &HashSet::new(),
        );

        assert_eq!(outcome.registry.len(), 1);
        assert_eq!(outcome.registry[0].server_url.as_deref(), Some(S2));
        assert!(outcome.trash.is_empty());
        assert!(outcome.demoted.is_empty());
    }

    #[test]
    fn full_demotion_moves_hash_to_trash() {
        let registry = vec![hosted("hh", S1)];

        let outcome = merge(
            &registry,
            &[],
            &[complete(S1, vec![])],
            &[S1.to_string()],
            &HashSet::new(),
        );

        assert!(outcome.registry.is_empty());
        assert_eq!(outcome.trash.len(), 1);
        assert_eq!(outcome.trash[0].content_hash, "hh");
        assert!(outcome.trash[0].server_url.is_none());
        assert_eq!(outcome.demoted, vec!["hh".to_string()]);
    }

    #[test]
    fn one_failed_server_prevents_demotion() {
        let registry = vec![hosted("hh", S1)];

        let outcome = merge(
            &registry,
            &[],
            &[complete(S1, vec![]), failed(S2)],
            &servers(),
            &HashSet::new(),
        );

        // Entry removed from the completed server, but no trashing while
        // the other server's state is unknown.
        assert!(outcome.registry.is_empty());
        assert!(outcome.trash.is_empty());
        assert!(outcome.demoted.is_empty());
    }

    #[test]
    fn reappearing_hash_leaves_trash_atomically() {
        let trash = vec![hosted("hh", S1).into_trash_record()];

        let outcome = merge(
            &[],
            &trash,
            &[complete(S1, vec![hosted("hh", S1)]), complete(S2, vec![])],
            &servers(),
            &HashSet::new(),
        );

        assert_eq!(outcome.registry.len(), 1);
        assert!(outcome.trash.is_empty());
        assert_eq!(outcome.restored, vec!["hh".to_string()]);
        assert!(exclusivity_holds(&outcome.registry, &outcome.trash));
    }

    #[test]
    fn vault_only_hash_lands_in_trash_on_complete_cycle() {
        let vaulted: HashSet<String> = ["vv".to_string()].into_iter().collect();

        let outcome = merge(
            &[],
            &[],
            &[complete(S1, vec![]), complete(S2, vec![])],
            &servers(),
            &vaulted,
        );

        assert_eq!(outcome.trash.len(), 1);
        assert_eq!(outcome.trash[0].content_hash, "vv");
    }

    #[test]
    fn refresh_replaces_existing_entry() {
        let registry = vec![hosted_at("hh", S1, 100)];
        let mut fresh = hosted_at("hh", S1, 100);
        fresh.size_bytes = Some(4096);

        let outcome = merge(
            &registry,
            &[],
            &[complete(S1, vec![fresh])],
            &[S1.to_string()],
            &HashSet::new(),
        );

        assert_eq!(outcome.registry.len(), 1);
        assert_eq!(outcome.registry[0].size_bytes, Some(4096));
    }

    #[test]
    fn registry_sorted_by_recency_with_unknown_last() {
        let outcome = merge(
            &[],
            &[],
            &[complete(
                S1,
                vec![
                    hosted_at("old", S1, 10),
                    hosted_at("unknown", S1, 0),
                    hosted_at("new", S1, 99),
                ],
            )],
            &[S1.to_string()],
            &HashSet::new(),
        );

        let hashes: Vec<&str> = outcome
            .registry
            .iter()
            .map(|b| b.content_hash.as_str())
            .collect();
        assert_eq!(hashes, vec!["new", "old", "unknown"]);
    }

    #[test]
    fn two_server_end_to_end_scenario() {
        // Server A hosts {x, y}; server B hosts {y, z}.
        let outcome = merge(
            &[],
            &[],
            &[
                complete(S1, vec![hosted("xx", S1), hosted("yy", S1)]),
                complete(S2, vec![hosted("yy", S2), hosted("zz", S2)]),
            ],
            &servers(),
            &HashSet::new(),
        );

        assert_eq!(outcome.registry.len(), 4);
        let keys: HashSet<String> = outcome.registry.iter().map(Blob::registry_key).collect();
        for expected in [
            registry_key("xx", Some(S1)),
            registry_key("yy", Some(S1)),
            registry_key("yy", Some(S2)),
            registry_key("zz", Some(S2)),
        ] {
            assert!(keys.contains(&expected));
        }
        assert!(outcome.trash.is_empty());

        let unique: HashSet<&str> = outcome
            .registry
            .iter()
            .map(|b| b.content_hash.as_str())
            .collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut registry = vec![hosted("aa", S1)];
        let mut updated = hosted("aa", S1);
        updated.size_bytes = Some(9);
        upsert_blob(&mut registry, updated);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry[0].size_bytes, Some(9));

        upsert_blob(&mut registry, hosted("aa", S2));
        assert_eq!(registry.len(), 2);
    }
}
