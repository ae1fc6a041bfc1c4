//! Durable file metadata: labels, names, and thumbnails per content hash.
//!
//! Labels live independently of which servers currently host a hash. New
//! information merges in; it never destructively overwrites. For the same
//! key, a user-authored edit beats a relay-sourced edit unless the relay
//! edit is newer by more than a grace window, so a slow background refresh
//! can never silently erase a fresh local edit.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::constants::LABEL_GRACE_WINDOW_SECS;
use crate::registry::{Blob, BlobTag};

/// Where a tag edit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagSource {
    /// Authored on this device.
    Local,
    /// Derived from a relay event or server-embedded metadata.
    Relay,
}

/// One tag edit with enough context to merge deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub key: String,
    pub value: String,
    pub source: TagSource,
    /// Unix seconds of the edit (local clock for local edits, event
    /// `created_at` for relay edits).
    pub edited_at: u64,
}

impl TagRecord {
    /// Create a local edit stamped now.
    #[must_use]
    pub fn local_now(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            source: TagSource::Local,
            edited_at: chrono::Utc::now().timestamp().max(0) as u64,
        }
    }
}

/// Decide which of two records for the same key survives a merge.
///
/// A local edit wins over a relay edit unless the relay edit is newer by
/// more than the grace window. Same-source conflicts go to the newer
/// timestamp; a full tie goes to the lexicographically greater value so
/// the merge is commutative.
#[must_use]
pub fn pick_winner(a: &TagRecord, b: &TagRecord) -> TagRecord {
    let winner = match (a.source, b.source) {
        (TagSource::Local, TagSource::Relay) => {
            if b.edited_at > a.edited_at + LABEL_GRACE_WINDOW_SECS {
                b
            } else {
                a
            }
        },
        (TagSource::Relay, TagSource::Local) => {
            if a.edited_at > b.edited_at + LABEL_GRACE_WINDOW_SECS {
                a
            } else {
                b
            }
        },
        _ => match a.edited_at.cmp(&b.edited_at) {
            std::cmp::Ordering::Greater => a,
            std::cmp::Ordering::Less => b,
            std::cmp::Ordering::Equal => {
                if a.value >= b.value {
                    a
                } else {
                    b
                }
            },
        },
    };
    winner.clone()
}

/// Merge incoming records into an existing tag list.
///
/// Per key the winner is chosen by [`pick_winner`]; order is preserved as
/// first-appearance (existing keys keep their position, new keys append).
#[must_use]
pub fn merge_tags(existing: &[TagRecord], incoming: &[TagRecord]) -> Vec<TagRecord> {
    let mut merged: Vec<TagRecord> = existing.to_vec();
    for record in incoming {
        match merged.iter_mut().find(|r| r.key == record.key) {
            Some(current) => *current = pick_winner(current, record),
            None => merged.push(record.clone()),
        }
    }
    merged
}

/// Effective display tags for a blob: server-embedded tags overlaid with
/// the durable label store, user-authored entries winning per key.
#[must_use]
pub fn effective_tags(blob: &Blob, labels: &[TagRecord]) -> Vec<BlobTag> {
    let server_records: Vec<TagRecord> = blob
        .tags
        .iter()
        .map(|t| TagRecord {
            key: t.key.clone(),
            value: t.value.clone(),
            source: TagSource::Relay,
            edited_at: blob.creation_time,
        })
        .collect();

    merge_tags(&server_records, labels)
        .into_iter()
        .map(|r| BlobTag::new(r.key, r.value))
        .collect()
}

/// Event kind for file metadata (labels, names, fallback URLs).
pub const FILE_METADATA_KIND: u32 = 1063;

/// Build the unsigned file-metadata event for an uploaded blob.
///
/// Carries the primary URL, the content hash, MIME type and size, any
/// successfully mirrored URLs as `fallback` tags, and the current label
/// set.
#[must_use]
pub fn build_file_metadata_event(
    pubkey: &str,
    blob: &Blob,
    mirror_urls: &[String],
    labels: &[TagRecord],
) -> String {
    let mut tags: Vec<Vec<String>> = vec![
        vec!["url".to_string(), blob.url.clone()],
        vec!["x".to_string(), blob.content_hash.clone()],
    ];
    if let Some(mime) = &blob.mime_type {
        tags.push(vec!["m".to_string(), mime.clone()]);
    }
    if let Some(size) = blob.size_bytes {
        tags.push(vec!["size".to_string(), size.to_string()]);
    }
    for mirror in mirror_urls {
        tags.push(vec!["fallback".to_string(), mirror.clone()]);
    }
    for label in labels {
        tags.push(vec![label.key.clone(), label.value.clone()]);
    }

    let content = labels
        .iter()
        .find(|l| l.key == "alt")
        .map_or(String::new(), |l| l.value.clone());

    json!({
        "pubkey": pubkey,
        "created_at": chrono::Utc::now().timestamp(),
        "kind": FILE_METADATA_KIND,
        "tags": tags,
        "content": content,
    })
    .to_string()
}

/// Extract `(hash, records)` from a relay file-metadata event.
///
/// Returns `None` for events without an `x` tag or of a different kind;
/// malformed events are skipped, not fatal.
#[must_use]
pub fn ingest_metadata_event(event_json: &str) -> Option<(String, Vec<TagRecord>)> {
    let event: serde_json::Value = serde_json::from_str(event_json).ok()?;
    if event["kind"].as_u64() != Some(u64::from(FILE_METADATA_KIND)) {
        return None;
    }
    let created_at = event["created_at"].as_u64().unwrap_or(0);
    let tags = event["tags"].as_array()?;

    let mut hash = None;
    let mut records = Vec::new();
    for tag in tags {
        let Some(key) = tag.get(0).and_then(|v| v.as_str()) else {
            continue;
        };
        let value = tag.get(1).and_then(|v| v.as_str()).unwrap_or("");
        match key {
            "x" => hash = Some(value.to_string()),
            // Transport tags, not labels.
            "url" | "m" | "size" | "fallback" => {},
            _ => records.push(TagRecord {
                key: key.to_string(),
                value: value.to_string(),
                source: TagSource::Relay,
                edited_at: created_at,
            }),
        }
    }

    hash.map(|h| (h, records))
}
