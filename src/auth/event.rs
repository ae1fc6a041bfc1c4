//! Unsigned authorization event construction.
//!
//! Servers authorize blob operations with a short-lived signed event
//! (kind 24242) whose tags name the action (`t`), the content hash (`x`),
//! and an expiration timestamp. The engine builds the unsigned JSON and
//! hands it to the external signer capability.

use chrono::Utc;
use serde_json::json;

use crate::constants::AUTH_EVENT_TTL_SECS;

/// Event kind for blob-server authorization.
pub const AUTH_EVENT_KIND: u32 = 24242;

/// Blob operation named in the authorization event's `t` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    List,
    Upload,
    Delete,
    Get,
}

impl AuthAction {
    /// Tag value for this action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Upload => "upload",
            Self::Delete => "delete",
            Self::Get => "get",
        }
    }
}

/// Build the unsigned authorization event JSON for one operation.
///
/// `content_hash` is included as an `x` tag when the action targets a
/// specific blob (upload, delete, get); listings omit it.
#[must_use]
pub fn build_auth_event(pubkey: &str, action: AuthAction, content_hash: Option<&str>) -> String {
    let created_at = Utc::now().timestamp();
    let expiration = created_at + AUTH_EVENT_TTL_SECS;

    let mut tags = vec![vec!["t".to_string(), action.as_str().to_string()]];
    if let Some(hash) = content_hash {
        tags.push(vec!["x".to_string(), hash.to_string()]);
    }
    tags.push(vec!["expiration".to_string(), expiration.to_string()]);

    json!({
        "pubkey": pubkey,
        "created_at": created_at,
        "kind": AUTH_EVENT_KIND,
        "tags": tags,
        "content": format!("{} blob", action.as_str()),
    })
    .to_string()
}
