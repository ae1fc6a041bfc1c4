//! Paginated blob listing.
//!
//! Fetches a user's full listing from one server, paginating with a
//! cursor derived from the last item of each full page. Never panics and
//! never loses what it already collected: an unrecoverable error returns
//! the partial listing marked `Failed` so the merge layer treats the
//! server as unknown rather than empty.

use tracing::{debug, warn};

use super::ServerClient;
use crate::constants::{FULL_PAGE_THRESHOLD, LIST_PAGE_LIMIT, MAX_LIST_PAGES};
use crate::error::Error;
use crate::registry::Blob;
use crate::registry::merge::{ListingOutcome, ServerListing};
use crate::reliability::{RetryConfig, retry_typed};

/// Fetch the complete blob listing for `pubkey` from one server.
///
/// Pagination rules:
/// - a page under the full-page threshold is the last page;
/// - the next cursor is the content hash of the page's last item;
/// - two identical consecutive cursors mean the server is not advancing,
///   so the listing stops rather than loop;
/// - a hard page ceiling guards against misbehaving servers; hitting it
///   marks the listing failed since the tail was never seen.
///
/// Each page is retried on transport errors with a short fixed backoff;
/// a 401 triggers the auth-prefix fallback inside the client before the
/// retries are exhausted.
pub async fn fetch_all(
    client: &ServerClient,
    server: &str,
    pubkey: &str,
    auth_json: &str,
) -> ServerListing {
    let mut collected: Vec<Blob> = Vec::new();
    let mut cursor: Option<String> = None;

    for page in 0..MAX_LIST_PAGES {
        let result = retry_typed(RetryConfig::page(), "list-page", || {
            let cursor = cursor.clone();
            async move {
                client
                    .list_page(server, pubkey, LIST_PAGE_LIMIT, cursor.as_deref(), auth_json)
                    .await
            }
        })
        .await;

        let descriptors = match result {
            Ok(descriptors) => descriptors,
            Err(Error::ProtocolMismatch { detail, .. }) => {
                // Unexpected shape is an empty page, not a crash.
                warn!(server = %server, detail = %detail, "Malformed listing page, treating as empty");
                Vec::new()
            },
            Err(e) => {
                warn!(server = %server, page = page, error = %e, "Listing aborted");
                return ServerListing {
                    server_url: server.to_string(),
                    blobs: collected,
                    outcome: ListingOutcome::Failed(e.to_string()),
                };
            },
        };

        let page_len = descriptors.len();
        collected.extend(
            descriptors
                .iter()
                .filter_map(|d| d.normalize(server)),
        );

        if page_len < FULL_PAGE_THRESHOLD {
            debug!(server = %server, pages = page + 1, blobs = collected.len(), "Listing complete");
            return ServerListing {
                server_url: server.to_string(),
                blobs: collected,
                outcome: ListingOutcome::Complete,
            };
        }

        let next_cursor = collected.last().map(|b| b.content_hash.clone());
        if next_cursor == cursor || next_cursor.is_none() {
            // Server returned a full page but the cursor is stuck.
            debug!(server = %server, "Cursor not advancing, stopping pagination");
            return ServerListing {
                server_url: server.to_string(),
                blobs: collected,
                outcome: ListingOutcome::Complete,
            };
        }
        cursor = next_cursor;
    }

    // The page ceiling means the tail was never confirmed; marking the
    // listing failed keeps the merge from dropping unseen entries.
    warn!(server = %server, pages = MAX_LIST_PAGES, "Page ceiling reached");
    ServerListing {
        server_url: server.to_string(),
        blobs: collected,
        outcome: ListingOutcome::Failed(format!("page ceiling of {MAX_LIST_PAGES} reached")),
    }
}
