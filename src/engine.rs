//! The reconciliation engine.
//!
//! [`ReconcileEngine`] owns the registry, trash, and label store; every
//! other component reads snapshots and issues intents through it. A
//! refresh fans out one listing task per server, fans in to the merge,
//! and lands in a single atomic commit. Issuing a new refresh cancels the
//! in-flight one, and a superseded refresh can never commit: commits are
//! guarded by a generation check, so the winner is the last *completed*
//! cycle that is not stale.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, warn};

use crate::auth::event::{AuthAction, build_auth_event};
use crate::auth::{AuthNegotiator, AuthPrefix};
use crate::client::{ServerClient, list};
use crate::config::Config;
use crate::constants::BULK_CONCURRENCY;
use crate::error::{Error, Result};
use crate::metadata::{TagRecord, ingest_metadata_event, merge_tags};
use crate::registry::merge::{ServerListing, exclusivity_holds, merge, upsert_blob};
use crate::registry::store::Store;
use crate::registry::views::{MediaFilter, MediaTier, tier_view};
use crate::registry::Blob;
use crate::relay::Relay;
use crate::signer::Signer;
use crate::sync::upload::{UploadCoordinator, UploadOutcome, UploadPhase};
use crate::sync::vault::VaultStore;
use crate::sync::{SyncReport, local_cache, vault};

/// Read-only view of engine state, cheap to clone behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub registry: Vec<Blob>,
    pub trash: Vec<Blob>,
    pub locally_cached: HashSet<String>,
    pub vaulted: HashSet<String>,
    pub labels: HashMap<String, Vec<TagRecord>>,
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    /// Registry entries after the merge.
    pub total_entries: usize,
    /// Unique content hashes after the merge.
    pub unique_hashes: usize,
    /// Hashes demoted to trash this cycle.
    pub demoted: usize,
    /// Hashes restored from trash this cycle.
    pub restored: usize,
    /// Whether every known server reported a completed listing.
    pub complete: bool,
    /// Per-server failures, `(server, reason)`.
    pub failures: Vec<(String, String)>,
}

impl RefreshReport {
    /// Diagnostic string naming which servers failed and why, so a
    /// silently empty result is distinguishable from "no files".
    #[must_use]
    pub fn diagnostic(&self) -> String {
        if self.failures.is_empty() {
            format!(
                "refresh complete: {} entries, {} unique",
                self.total_entries, self.unique_hashes
            )
        } else {
            let failures: Vec<String> = self
                .failures
                .iter()
                .map(|(server, reason)| format!("{server}: {reason}"))
                .collect();
            format!(
                "refresh partial: {} entries, {} unique; failed servers: {}",
                self.total_entries,
                self.unique_hashes,
                failures.join("; ")
            )
        }
    }
}

/// Outcome of a bulk operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchReport {
    pub success: usize,
    pub failed: usize,
}

impl BatchReport {
    /// The user-visible batch summary.
    #[must_use]
    pub fn summary(&self, operation: &str) -> String {
        format!(
            "{operation} completed: {} success, {} failed",
            self.success, self.failed
        )
    }
}

struct EngineState {
    registry: Vec<Blob>,
    trash: Vec<Blob>,
    labels: HashMap<String, Vec<TagRecord>>,
    locally_cached: HashSet<String>,
    vaulted: HashSet<String>,
}

struct EngineInner {
    pubkey: String,
    servers: Vec<String>,
    decode_cache_dir: Option<std::path::PathBuf>,
    store: Store,
    vault: VaultStore,
    client: ServerClient,
    signer: Arc<dyn Signer>,
    relay: Arc<dyn Relay>,
    state: RwLock<EngineState>,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    refresh_generation: AtomicU64,
    inflight: Mutex<Option<tokio::task::AbortHandle>>,
    /// Serializes commits so mutators and refreshes can't interleave
    /// their read-modify-write cycles.
    commit_lock: tokio::sync::Mutex<()>,
}

/// The reconciliation service.
///
/// Clone-cheap handle; all mutation goes through the merge/upsert paths,
/// never direct field assignment from other components.
#[derive(Clone)]
pub struct ReconcileEngine {
    inner: Arc<EngineInner>,
}

impl ReconcileEngine {
    /// Open the engine: load persisted state, seed the auth negotiator,
    /// and build the shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the state database or vault cannot be opened.
    pub fn open(
        config: &Config,
        db_path: &std::path::Path,
        signer: Arc<dyn Signer>,
        relay: Arc<dyn Relay>,
    ) -> Result<Self> {
        let store = Store::open(db_path).map_err(|e| Error::store("open", e))?;
        let vault = VaultStore::open(
            config
                .vault_dir()
                .map_err(|e| Error::Config(e.to_string()))?,
        )
        .map_err(|e| Error::store("vault", e))?;

        let known_prefixes = store
            .load_prefixes_sync()
            .map_err(|e| Error::store("prefixes", e))?
            .into_iter()
            .filter_map(|(host, prefix)| prefix.parse::<AuthPrefix>().ok().map(|p| (host, p)));
        let negotiator = Arc::new(AuthNegotiator::with_known(known_prefixes));
        let client = ServerClient::new(negotiator)?;

        let registry = store
            .load_registry_sync()
            .map_err(|e| Error::store("registry", e))?;
        let trash = store
            .load_trash_sync()
            .map_err(|e| Error::store("trash", e))?;
        let labels = store
            .load_all_labels_sync()
            .map_err(|e| Error::store("labels", e))?;
        let locally_cached = store
            .cached_hashes_sync()
            .map_err(|e| Error::store("local cache", e))?;
        let vaulted = vault.scan().map_err(|e| Error::store("vault scan", e))?;

        let state = EngineState {
            registry,
            trash,
            labels,
            locally_cached,
            vaulted,
        };
        let (snapshot_tx, _) = watch::channel(Arc::new(snapshot_of(&state)));

        Ok(Self {
            inner: Arc::new(EngineInner {
                pubkey: config.pubkey.clone(),
                servers: config.normalized_servers(),
                decode_cache_dir: config.decode_cache_dir.clone(),
                store,
                vault,
                client,
                signer,
                relay,
                state: RwLock::new(state),
                snapshot_tx,
                refresh_generation: AtomicU64::new(0),
                inflight: Mutex::new(None),
                commit_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Current state snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Subscribe to state changes. Each commit publishes a new snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Configured servers.
    #[must_use]
    pub fn servers(&self) -> &[String] {
        &self.inner.servers
    }

    /// Tier view over the current snapshot.
    #[must_use]
    pub fn view(&self, tier: &MediaTier, filter: &MediaFilter) -> Vec<Blob> {
        let snapshot = self.snapshot();
        tier_view(
            &snapshot.registry,
            &snapshot.trash,
            &snapshot.locally_cached,
            tier,
            filter,
        )
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Run a full refresh cycle, superseding any in-flight one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Superseded`] when a newer refresh started before
    /// this one could commit, and [`Error::SignatureUnavailable`] when
    /// the signer declined to authorize the listings.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let inner = self.inner.clone();
        let generation = inner.refresh_generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(handle) = inner.inflight.lock().take() {
            debug!("Cancelling in-flight refresh");
            handle.abort();
        }

        let task = tokio::spawn(run_refresh(inner.clone(), generation));
        *inner.inflight.lock() = Some(task.abort_handle());

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(Error::Superseded),
            Err(e) => Err(Error::store("refresh task", e)),
        }
    }

    // =========================================================================
    // Upload
    // =========================================================================

    /// Upload one file and register the resulting copies.
    ///
    /// The registry update goes through the same upsert as discovered
    /// blobs; an upload is not a special case.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        observer: impl FnMut(&UploadPhase),
    ) -> Result<UploadOutcome> {
        let labels = {
            let processed = crate::content::process(&bytes, mime_type);
            let state = self.inner.state.read();
            state
                .labels
                .get(&processed.hash)
                .cloned()
                .unwrap_or_default()
        };

        let coordinator = UploadCoordinator::new(
            self.inner.client.clone(),
            self.inner.signer.clone(),
            self.inner.relay.clone(),
            self.inner.pubkey.clone(),
            self.inner.servers.clone(),
        );
        let outcome = coordinator
            .upload(bytes, mime_type, &labels, observer)
            .await?;

        let mut blobs = vec![outcome.blob.clone()];
        blobs.extend(outcome.mirrored.iter().cloned());
        self.commit_mutation(move |registry, trash| {
            for blob in blobs {
                trash.retain(|t| t.content_hash != blob.content_hash);
                upsert_blob(registry, blob);
            }
        })
        .await?;

        Ok(outcome)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete hashes from every server hosting them.
    ///
    /// Per-item tasks fan out with bounded concurrency; the registry is
    /// written once at the end of the batch. A hash whose last hosting
    /// server confirms deletion moves to the trash in the same commit as
    /// the registry removal.
    pub async fn delete(&self, hashes: &[String]) -> Result<BatchReport> {
        let registry = self.snapshot().registry.clone();
        let semaphore = Arc::new(Semaphore::new(BULK_CONCURRENCY));

        let results = join_all(hashes.iter().map(|hash| {
            let inner = self.inner.clone();
            let registry = registry.clone();
            let semaphore = semaphore.clone();
            let hash = hash.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                let removed = delete_one(&inner, &registry, &hash).await;
                (hash, removed)
            }
        }))
        .await;

        let mut report = BatchReport::default();
        let mut confirmed: Vec<(String, String)> = Vec::new();
        for (hash, (servers, error)) in results {
            // Confirmed removals apply even when another server failed;
            // only the item's success/failure accounting changes.
            confirmed.extend(servers.into_iter().map(|s| (hash.clone(), s)));
            match error {
                None => report.success += 1,
                Some(e) => {
                    warn!(hash = %hash, error = %e, "Delete failed");
                    report.failed += 1;
                },
            }
        }

        if !confirmed.is_empty() {
            self.commit_mutation(move |registry, trash| {
                for (hash, server) in &confirmed {
                    if let Some(index) = registry.iter().position(|b| {
                        b.content_hash == *hash && b.server_url.as_deref() == Some(server.as_str())
                    }) {
                        let removed = registry.remove(index);
                        let still_hosted =
                            registry.iter().any(|b| b.content_hash == *hash);
                        if !still_hosted && !trash.iter().any(|t| t.content_hash == *hash) {
                            // The last copy's removal and the trash record
                            // land in the same commit.
                            trash.push(removed.into_trash_record());
                        }
                    }
                }
            })
            .await?;
        }

        info!("{}", report.summary("delete"));
        Ok(report)
    }

    // =========================================================================
    // Mirror
    // =========================================================================

    /// Mirror each hash to every configured server not yet hosting it.
    ///
    /// Fan-out per item, one registry write for the whole batch.
    pub async fn mirror_missing(&self, hashes: &[String]) -> Result<BatchReport> {
        let registry = self.snapshot().registry.clone();
        let semaphore = Arc::new(Semaphore::new(BULK_CONCURRENCY));

        let results = join_all(hashes.iter().map(|hash| {
            let inner = self.inner.clone();
            let registry = registry.clone();
            let semaphore = semaphore.clone();
            let hash = hash.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                mirror_one(&inner, &registry, &hash).await
            }
        }))
        .await;

        let mut report = BatchReport::default();
        let mut mirrored: Vec<Blob> = Vec::new();
        for result in results {
            match result {
                Ok(blobs) => {
                    report.success += 1;
                    mirrored.extend(blobs);
                },
                Err(e) => {
                    warn!(error = %e, "Mirror failed");
                    report.failed += 1;
                },
            }
        }

        if !mirrored.is_empty() {
            self.commit_mutation(move |registry, _trash| {
                for blob in mirrored {
                    upsert_blob(registry, blob);
                }
            })
            .await?;
        }

        info!("{}", report.summary("mirror"));
        Ok(report)
    }

    // =========================================================================
    // Labels
    // =========================================================================

    /// Record a user-authored label for one hash.
    pub async fn set_label(&self, content_hash: &str, key: &str, value: &str) -> Result<()> {
        let record = TagRecord::local_now(key, value);
        self.merge_labels(content_hash, vec![record]).await
    }

    /// Apply one label to many hashes; labels persist per hash but the
    /// snapshot publishes once at the end of the batch.
    pub async fn set_label_bulk(
        &self,
        hashes: &[String],
        key: &str,
        value: &str,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for hash in hashes {
            let record = TagRecord::local_now(key, value);
            match self.merge_labels_quiet(hash, vec![record]).await {
                Ok(()) => report.success += 1,
                Err(e) => {
                    warn!(hash = %hash, error = %e, "Label failed");
                    report.failed += 1;
                },
            }
        }
        self.publish_snapshot();
        info!("{}", report.summary("label"));
        Ok(report)
    }

    /// Pull file-metadata events from the relays and merge their tags.
    ///
    /// Returns how many hashes gained or changed labels.
    pub async fn ingest_relay_metadata(&self) -> Result<usize> {
        let filter = serde_json::json!({
            "kinds": [crate::metadata::FILE_METADATA_KIND],
            "authors": [self.inner.pubkey],
        })
        .to_string();

        let events = self
            .inner
            .relay
            .query(&filter)
            .await
            .map_err(|e| Error::Relay(e.to_string()))?;

        let mut updated = 0;
        for event in &events {
            if let Some((hash, records)) = ingest_metadata_event(event) {
                self.merge_labels_quiet(&hash, records).await?;
                updated += 1;
            }
        }
        if updated > 0 {
            self.publish_snapshot();
        }
        debug!(events = events.len(), updated = updated, "Relay metadata ingested");
        Ok(updated)
    }

    async fn merge_labels(&self, content_hash: &str, records: Vec<TagRecord>) -> Result<()> {
        self.merge_labels_quiet(content_hash, records).await?;
        self.publish_snapshot();
        Ok(())
    }

    async fn merge_labels_quiet(&self, content_hash: &str, records: Vec<TagRecord>) -> Result<()> {
        let merged = {
            let state = self.inner.state.read();
            let existing = state
                .labels
                .get(content_hash)
                .cloned()
                .unwrap_or_default();
            merge_tags(&existing, &records)
        };

        self.inner
            .store
            .save_labels(content_hash.to_string(), merged.clone())
            .await
            .map_err(|e| Error::store("labels", e))?;

        self.inner
            .state
            .write()
            .labels
            .insert(content_hash.to_string(), merged);
        Ok(())
    }

    // =========================================================================
    // Tier sync
    // =========================================================================

    /// Fill the vault with registered blobs it is missing.
    pub async fn sync_vault(&self, progress: impl FnMut(usize, usize)) -> Result<SyncReport> {
        let registry = self.snapshot().registry.clone();
        let report = vault::sync_vault(
            &self.inner.client,
            &self.inner.vault,
            &registry,
            self.inner.decode_cache_dir.as_deref(),
            progress,
        )
        .await
        .map_err(|e| Error::store("vault sync", e))?;

        let vaulted = self
            .inner
            .vault
            .scan()
            .map_err(|e| Error::store("vault scan", e))?;
        self.inner.state.write().vaulted = vaulted;
        self.publish_snapshot();
        Ok(report)
    }

    /// Sync the local network cache, if one is present.
    ///
    /// Returns `None` when no cache answers the detection probe.
    pub async fn sync_local_cache(
        &self,
        progress: impl FnMut(usize, usize),
    ) -> Result<Option<SyncReport>> {
        let Some(local_server) = local_cache::detect_local_cache(&self.inner.client).await else {
            debug!("No local network cache detected");
            return Ok(None);
        };

        let registry = self.snapshot().registry.clone();
        let report = local_cache::sync_local_cache(
            &self.inner.client,
            &self.inner.store,
            &local_server,
            &registry,
            progress,
        )
        .await
        .map_err(|e| Error::store("local cache sync", e))?;

        let cached = self
            .inner
            .store
            .cached_hashes()
            .await
            .map_err(|e| Error::store("local cache", e))?;
        self.inner.state.write().locally_cached = cached;
        self.publish_snapshot();
        Ok(Some(report))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Read-modify-write the registry and trash, with one persisted
    /// commit and one snapshot publish.
    async fn commit_mutation(
        &self,
        mutate: impl FnOnce(&mut Vec<Blob>, &mut Vec<Blob>),
    ) -> Result<()> {
        let _guard = self.inner.commit_lock.lock().await;

        let (mut registry, mut trash) = {
            let state = self.inner.state.read();
            (state.registry.clone(), state.trash.clone())
        };
        mutate(&mut registry, &mut trash);
        debug_assert!(exclusivity_holds(&registry, &trash));

        self.inner
            .store
            .commit_snapshot(registry.clone(), trash.clone())
            .await
            .map_err(|e| Error::store("commit", e))?;

        {
            let mut state = self.inner.state.write();
            state.registry = registry;
            state.trash = trash;
        }
        self.publish_snapshot();
        Ok(())
    }

    fn publish_snapshot(&self) {
        let snapshot = {
            let state = self.inner.state.read();
            Arc::new(snapshot_of(&state))
        };
        // Send only fails with no receivers, which is fine: the sender
        // itself still serves `snapshot()` borrows.
        let _ = self.inner.snapshot_tx.send(snapshot);
    }
}

fn snapshot_of(state: &EngineState) -> Snapshot {
    Snapshot {
        registry: state.registry.clone(),
        trash: state.trash.clone(),
        locally_cached: state.locally_cached.clone(),
        vaulted: state.vaulted.clone(),
        labels: state.labels.clone(),
    }
}

/// One full refresh cycle, commit guarded by the generation check.
async fn run_refresh(inner: Arc<EngineInner>, generation: u64) -> Result<RefreshReport> {
    let auth_event = build_auth_event(&inner.pubkey, AuthAction::List, None);
    let signed = inner
        .signer
        .sign(&auth_event, &inner.pubkey)
        .await
        .map_err(|e| Error::Signer(e.to_string()))?
        .ok_or(Error::SignatureUnavailable)?;

    // One listing task per server, no shared mutable state.
    let listings: Vec<ServerListing> = join_all(inner.servers.iter().map(|server| {
        let client = inner.client.clone();
        let pubkey = inner.pubkey.clone();
        let signed = signed.clone();
        let server = server.clone();
        async move { list::fetch_all(&client, &server, &pubkey, &signed).await }
    }))
    .await;

    // Re-derive vault knowledge from disk for the demotion decision.
    let vault = inner.vault.clone();
    let vaulted = tokio::task::spawn_blocking(move || vault.scan())
        .await
        .map_err(|e| Error::store("vault scan", e))?
        .map_err(|e| Error::store("vault scan", e))?;

    let _guard = inner.commit_lock.lock().await;

    // Staleness check: if a newer refresh started, this one's results
    // must not overwrite fresher state.
    if inner.refresh_generation.load(Ordering::SeqCst) != generation {
        debug!(generation = generation, "Refresh superseded before commit");
        return Err(Error::Superseded);
    }

    let (current_registry, current_trash) = {
        let state = inner.state.read();
        (state.registry.clone(), state.trash.clone())
    };

    let outcome = merge(
        &current_registry,
        &current_trash,
        &listings,
        &inner.servers,
        &vaulted,
    );
    debug_assert!(exclusivity_holds(&outcome.registry, &outcome.trash));

    inner
        .store
        .commit_snapshot(outcome.registry.clone(), outcome.trash.clone())
        .await
        .map_err(|e| Error::store("commit", e))?;

    {
        let mut state = inner.state.write();
        state.registry = outcome.registry.clone();
        state.trash = outcome.trash.clone();
        state.vaulted = vaulted;
    }
    {
        let snapshot = {
            let state = inner.state.read();
            Arc::new(snapshot_of(&state))
        };
        let _ = inner.snapshot_tx.send(snapshot);
    }

    persist_prefixes(&inner).await;

    let unique: HashSet<&str> = outcome
        .registry
        .iter()
        .map(|b| b.content_hash.as_str())
        .collect();
    let failures: Vec<(String, String)> = listings
        .iter()
        .filter_map(|l| match &l.outcome {
            crate::registry::merge::ListingOutcome::Failed(reason) => {
                Some((l.server_url.clone(), reason.clone()))
            },
            crate::registry::merge::ListingOutcome::Complete => None,
        })
        .collect();

    let report = RefreshReport {
        total_entries: outcome.registry.len(),
        unique_hashes: unique.len(),
        demoted: outcome.demoted.len(),
        restored: outcome.restored.len(),
        complete: failures.is_empty(),
        failures,
    };
    info!("{}", report.diagnostic());
    Ok(report)
}

/// Persist negotiated auth prefixes, best-effort.
async fn persist_prefixes(inner: &Arc<EngineInner>) {
    let pairs = inner.client.negotiator().snapshot();
    let store = inner.store.clone();
    let result = tokio::task::spawn_blocking(move || {
        for (host, prefix) in pairs {
            store.save_prefix_sync(&host, prefix.as_str())?;
        }
        anyhow::Ok(())
    })
    .await;
    if let Ok(Err(e)) = result {
        debug!(error = %e, "Failed to persist auth prefixes");
    }
}

/// Delete one hash from every server hosting it.
///
/// Returns the servers that confirmed deletion plus the first error, if
/// any. Confirmed removals are never discarded: a partially-deleted hash
/// drops its confirmed entries and keeps the surviving ones.
async fn delete_one(
    inner: &Arc<EngineInner>,
    registry: &[Blob],
    hash: &str,
) -> (Vec<String>, Option<Error>) {
    let hosts: Vec<String> = registry
        .iter()
        .filter(|b| b.content_hash == hash)
        .filter_map(|b| b.server_url.clone())
        .collect();
    if hosts.is_empty() {
        return (
            Vec::new(),
            Some(Error::Config(format!("hash {hash} is not hosted anywhere"))),
        );
    }

    let auth_event = build_auth_event(&inner.pubkey, AuthAction::Delete, Some(hash));
    let signed = match inner.signer.sign(&auth_event, &inner.pubkey).await {
        Ok(Some(signed)) => signed,
        Ok(None) => return (Vec::new(), Some(Error::SignatureUnavailable)),
        Err(e) => return (Vec::new(), Some(Error::Signer(e.to_string()))),
    };

    let mut confirmed = Vec::new();
    let mut first_error = None;
    for server in hosts {
        match inner.client.delete(&server, hash, &signed).await {
            Ok(()) => confirmed.push(server),
            Err(e) => {
                warn!(server = %server, hash = %hash, error = %e, "Server delete failed");
                first_error.get_or_insert(e);
            },
        }
    }
    (confirmed, first_error)
}

/// Mirror one hash from a hosting server to every server lacking it.
async fn mirror_one(
    inner: &Arc<EngineInner>,
    registry: &[Blob],
    hash: &str,
) -> Result<Vec<Blob>> {
    let source = registry
        .iter()
        .find(|b| b.content_hash == hash && b.server_url.is_some())
        .ok_or_else(|| Error::Config(format!("hash {hash} is not hosted anywhere")))?;

    let hosted_on: HashSet<&str> = registry
        .iter()
        .filter(|b| b.content_hash == hash)
        .filter_map(|b| b.server_url.as_deref())
        .collect();
    let targets: Vec<&String> = inner
        .servers
        .iter()
        .filter(|s| !hosted_on.contains(s.as_str()))
        .collect();
    if targets.is_empty() {
        return Ok(Vec::new());
    }

    let auth_event = build_auth_event(&inner.pubkey, AuthAction::Upload, Some(hash));
    let signed = inner
        .signer
        .sign(&auth_event, &inner.pubkey)
        .await
        .map_err(|e| Error::Signer(e.to_string()))?
        .ok_or(Error::SignatureUnavailable)?;

    let mut mirrored = Vec::new();
    for server in targets {
        match inner.client.mirror(server, &source.url, &signed).await {
            Ok(()) => {
                let mut copy = source.clone();
                copy.url = format!("{server}/{hash}");
                copy.server_url = Some(server.clone());
                mirrored.push(copy);
            },
            Err(e) => warn!(server = %server, hash = %hash, error = %e, "Mirror failed"),
        }
    }
    Ok(mirrored)
}
