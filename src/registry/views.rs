//! Derived views over the registry and trash.
//!
//! Tier selection happens first, then media-type and tag filters.

use std::collections::HashSet;

use super::{Blob, MediaKind};

/// Storage tier selecting which records a view shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaTier {
    /// Everything known, deduplicated by hash.
    All,
    /// Registry entries on one server.
    Server(String),
    /// Trash records only.
    Trash,
    /// Registry and trash records present in the local network cache.
    LocalCache,
}

/// Filters applied after tier selection.
#[derive(Debug, Clone, Default)]
pub struct MediaFilter {
    /// Keep only blobs of this media kind.
    pub kind: Option<MediaKind>,
    /// Keep only blobs carrying a tag with this key.
    pub tag_key: Option<String>,
}

impl MediaFilter {
    fn matches(&self, blob: &Blob) -> bool {
        if let Some(kind) = self.kind
            && blob.media_kind() != Some(kind)
        {
            return false;
        }
        if let Some(key) = &self.tag_key
            && blob.tag(key).is_none()
        {
            return false;
        }
        true
    }
}

/// Select a tier view over the registry and trash.
///
/// `All` deduplicates by content hash, keeping the most recent record per
/// hash (the registry is already sorted by recency, so the first entry
/// wins). Per-server views keep one record per hash by construction.
#[must_use]
pub fn tier_view(
    registry: &[Blob],
    trash: &[Blob],
    locally_cached: &HashSet<String>,
    tier: &MediaTier,
    filter: &MediaFilter,
) -> Vec<Blob> {
    let selected: Vec<Blob> = match tier {
        MediaTier::All => {
            let mut seen = HashSet::new();
            registry
                .iter()
                .filter(|b| seen.insert(b.content_hash.clone()))
                .cloned()
                .collect()
        },
        MediaTier::Server(server) => registry
            .iter()
            .filter(|b| b.server_url.as_deref() == Some(server.as_str()))
            .cloned()
            .collect(),
        MediaTier::Trash => trash.to_vec(),
        MediaTier::LocalCache => {
            let mut seen = HashSet::new();
            registry
                .iter()
                .chain(trash.iter())
                .filter(|b| locally_cached.contains(&b.content_hash))
                .filter(|b| seen.insert(b.content_hash.clone()))
                .cloned()
                .collect()
        },
    };

    selected.into_iter().filter(|b| filter.matches(b)).collect()
}
