//! Tier view listing.

use anyhow::Result;

use crate::engine::ReconcileEngine;
use crate::metadata::effective_tags;
use crate::registry::views::{MediaFilter, MediaTier};
use crate::registry::MediaKind;
use crate::utils::{format_bytes, short_hash};

/// Print one tier view of the registry.
pub fn execute(
    engine: &ReconcileEngine,
    tier: &MediaTier,
    kind: Option<MediaKind>,
) -> Result<()> {
    let filter = MediaFilter {
        kind,
        tag_key: None,
    };
    let blobs = engine.view(tier, &filter);
    let snapshot = engine.snapshot();

    if blobs.is_empty() {
        println!("No media in this view.");
        return Ok(());
    }

    for blob in &blobs {
        let labels = snapshot
            .labels
            .get(&blob.content_hash)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let tags = effective_tags(blob, labels);
        let name = tags
            .iter()
            .find(|t| t.key == "name" || t.key == "alt")
            .map_or("", |t| t.value.as_str());

        println!(
            "{}  {:>10}  {:<12}  {}  {}",
            short_hash(&blob.content_hash),
            blob.size_bytes.map_or_else(|| "?".to_string(), format_bytes),
            blob.mime_type.as_deref().unwrap_or("-"),
            blob.server_url.as_deref().unwrap_or("(not hosted)"),
            name,
        );
    }
    println!("{} item(s)", blobs.len());

    Ok(())
}
