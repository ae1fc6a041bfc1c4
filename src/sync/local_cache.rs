//! Local network cache synchronization.
//!
//! An optional nearby cache server (typically on the LAN or the device
//! itself) can hold blob copies for cheap access. The synchronizer
//! probes for presence first and otherwise instructs the cache to pull
//! the blob from its origin server; "locally cached" is recorded durably
//! only after one of the two succeeds.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::SyncReport;
use crate::client::{ServerClient, origin_root};
use crate::constants::{LOCAL_CACHE_HOSTS, LOCAL_CACHE_PORT, SYNC_CONCURRENCY};
use crate::registry::Blob;
use crate::registry::store::Store;

/// Probe for a local network cache.
///
/// Any of 2xx/401/404 from a HEAD against the root counts as "present":
/// a cache that rejects anonymous probes or has nothing at `/` is still a
/// cache.
pub async fn detect_local_cache(client: &ServerClient) -> Option<String> {
    for host in LOCAL_CACHE_HOSTS {
        let root = format!("http://{host}:{LOCAL_CACHE_PORT}");
        match client.head_status(&root).await {
            Ok(status) if matches!(status, 200..=299 | 401 | 404) => {
                info!(cache = %root, "Local network cache detected");
                return Some(root);
            },
            Ok(status) => debug!(cache = %root, status = status, "Host answered but is not a cache"),
            Err(e) => debug!(cache = %root, error = %e, "No local cache at host"),
        }
    }
    None
}

/// Ensure every registered hash is present in the local cache.
///
/// The done-set comes from durable storage at the start of every run, not
/// from memory. For each missing hash: cheap HEAD probe first, then a
/// proxy-fetch instructing the cache to pull from the blob's origin
/// server. At most [`SYNC_CONCURRENCY`] transfers run at once and one
/// failure never aborts the batch.
pub async fn sync_local_cache(
    client: &ServerClient,
    store: &Store,
    local_server: &str,
    registry: &[Blob],
    mut progress: impl FnMut(usize, usize),
) -> Result<SyncReport> {
    let cached = store
        .cached_hashes()
        .await
        .context("Failed to load cached-hash set")?;

    let mut seen = HashSet::new();
    let pending: Vec<Blob> = registry
        .iter()
        .filter(|b| b.server_url.is_some())
        .filter(|b| !cached.contains(&b.content_hash))
        .filter(|b| seen.insert(b.content_hash.clone()))
        .cloned()
        .collect();

    let total = pending.len();
    if total == 0 {
        debug!("Local cache already consistent with registry");
        return Ok(SyncReport::default());
    }
    info!(missing = total, cache = %local_server, "Local cache sync starting");

    let semaphore = Arc::new(Semaphore::new(SYNC_CONCURRENCY));
    let mut stream = futures::stream::iter(pending.into_iter().map(|blob| {
        let semaphore = semaphore.clone();
        let client = client.clone();
        let local_server = local_server.to_string();
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore never closed");
            let result = ensure_cached(&client, &local_server, &blob).await;
            (blob.content_hash, result)
        }
    }))
    .buffer_unordered(SYNC_CONCURRENCY);

    let mut report = SyncReport {
        total,
        ..SyncReport::default()
    };
    while let Some((hash, result)) = stream.next().await {
        match result {
            Ok(()) => {
                // Recorded only after the probe or the pull succeeded.
                if let Err(e) = store.record_cached(hash.clone()).await {
                    warn!(hash = %hash, error = %e, "Failed to record cached hash");
                    report.failed += 1;
                } else {
                    report.completed += 1;
                }
            },
            Err(e) => {
                warn!(hash = %hash, error = %e, "Local cache sync failed for hash");
                report.failed += 1;
            },
        }
        progress(report.completed + report.failed, total);
    }

    info!(summary = %report.summary(), "Local cache sync finished");
    Ok(report)
}

/// Probe the cache for one hash, pulling from origin when absent.
async fn ensure_cached(client: &ServerClient, local_server: &str, blob: &Blob) -> Result<()> {
    if client
        .has_blob(local_server, &blob.content_hash)
        .await
        .unwrap_or(false)
    {
        debug!(hash = %blob.content_hash, "Already in local cache");
        return Ok(());
    }

    let origin = origin_root(&blob.url)
        .or_else(|| blob.server_url.clone())
        .context("Blob has no origin to pull from")?;
    let extension = blob
        .mime_type
        .as_deref()
        .and_then(|m| mime_guess::get_mime_extensions_str(m))
        .and_then(|exts| exts.first().copied());

    client
        .proxy_fetch(local_server, &blob.content_hash, extension, &origin)
        .await
        .with_context(|| format!("Proxy-fetch failed for {}", blob.content_hash))?;
    debug!(hash = %blob.content_hash, origin = %origin, "Pulled into local cache");
    Ok(())
}
