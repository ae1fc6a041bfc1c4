//! Wire-format blob descriptors.
//!
//! Server dialects disagree on field names and JSON types: sizes and
//! timestamps arrive as numbers or strings, MIME types as `type` or
//! `mime`, timestamps as `uploaded` or `created_at`. The decoder accepts
//! all shapes here and normalizes to one internal form at the boundary so
//! the ambiguity is never carried inward.

use serde::Deserialize;

use crate::registry::Blob;

/// A number that some servers send as a JSON string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FlexibleNumber {
    Unsigned(u64),
    Float(f64),
    Text(String),
}

impl FlexibleNumber {
    /// Normalize to `u64`, if the payload parses as one.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Unsigned(n) => Some(*n),
            Self::Float(f) if *f >= 0.0 => Some(*f as u64),
            Self::Float(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// One blob descriptor as returned by `/list/{pubkey}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlobDescriptor {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub size: Option<FlexibleNumber>,
    #[serde(default, rename = "type", alias = "mime")]
    pub mime_type: Option<String>,
    #[serde(default, alias = "created_at")]
    pub uploaded: Option<FlexibleNumber>,
}

impl BlobDescriptor {
    /// Normalize into a [`Blob`] hosted on `server_url`.
    ///
    /// Returns `None` when the required `sha256` field is missing or not
    /// hex; such entries are skipped, not fatal. A missing `url` is
    /// derived from the server root and hash.
    #[must_use]
    pub fn normalize(&self, server_url: &str) -> Option<Blob> {
        let hash = self.sha256.as_deref()?.trim().to_lowercase();
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let url = self
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("{server_url}/{hash}"));

        Some(Blob {
            content_hash: hash,
            url,
            size_bytes: self.size.as_ref().and_then(FlexibleNumber::as_u64),
            mime_type: self.mime_type.clone(),
            server_url: Some(server_url.to_string()),
            creation_time: self
                .uploaded
                .as_ref()
                .and_then(FlexibleNumber::as_u64)
                .unwrap_or(0),
            tags: Vec::new(),
        })
    }
}
