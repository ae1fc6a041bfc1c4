//! Canonical blob registry model.
//!
//! A [`Blob`] is one server-hosted copy of a file, identified by the
//! SHA-256 of its canonical bytes. The registry holds one entry per
//! `(content_hash, server_url)` pair; the trash holds records with no
//! `server_url` for hashes known locally but hosted nowhere.

pub mod merge;
pub mod store;
pub mod views;

use serde::{Deserialize, Serialize};

/// One `(key, value)` tag attached to a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobTag {
    pub key: String,
    pub value: String,
}

impl BlobTag {
    /// Create a tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One server-hosted copy of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    /// Lowercase hex SHA-256 of the canonical bytes. Never mutated.
    pub content_hash: String,
    /// Fetch location, specific to `server_url`.
    pub url: String,
    /// Size in bytes, when the server reported one.
    #[serde(default)]
    pub size_bytes: Option<u64>,
    /// MIME type, when the server reported one.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Hosting server root. `None` means not currently confirmed on any
    /// remote server (vault/trash-only record).
    #[serde(default)]
    pub server_url: Option<String>,
    /// Unix seconds, used only for sort ordering. Zero sorts last.
    #[serde(default)]
    pub creation_time: u64,
    /// Ordered `(key, value)` tags from attached metadata.
    #[serde(default)]
    pub tags: Vec<BlobTag>,
}

impl Blob {
    /// Stable key identifying this entry in the registry.
    #[must_use]
    pub fn registry_key(&self) -> String {
        registry_key(&self.content_hash, self.server_url.as_deref())
    }

    /// A copy of this record detached from any server, for the trash.
    #[must_use]
    pub fn into_trash_record(mut self) -> Self {
        self.server_url = None;
        self
    }

    /// Media kind derived from the MIME type.
    #[must_use]
    pub fn media_kind(&self) -> Option<MediaKind> {
        let mime = self.mime_type.as_deref()?;
        if mime.starts_with("image/") {
            Some(MediaKind::Image)
        } else if mime.starts_with("video/") {
            Some(MediaKind::Video)
        } else {
            Some(MediaKind::Other)
        }
    }

    /// Value of the first tag with `key`, if any.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}

/// Coarse media classification used by tier filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

/// Registry key for a `(hash, server)` pair.
///
/// NUL never appears in a hex hash or a URL, so it is a safe separator.
#[must_use]
pub fn registry_key(content_hash: &str, server_url: Option<&str>) -> String {
    format!("{content_hash}\u{0}{}", server_url.unwrap_or(""))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build a hosted blob record for tests.
    pub(crate) fn hosted(hash: &str, server: &str) -> Blob {
        hosted_at(hash, server, 0)
    }

    /// Build a hosted blob record with a creation time.
    pub(crate) fn hosted_at(hash: &str, server: &str, creation_time: u64) -> Blob {
        Blob {
            content_hash: hash.to_string(),
            url: format!("{server}/{hash}"),
            size_bytes: Some(1024),
            mime_type: Some("image/jpeg".to_string()),
            server_url: Some(server.to_string()),
            creation_time,
            tags: Vec::new(),
        }
    }
}
