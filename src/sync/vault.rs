//! Vault synchronization.
//!
//! The vault is the permanent on-device copy of every registered blob,
//! one file per content hash. The synchronizer fills gaps by copying from
//! an existing decode/disk cache when possible and downloading otherwise.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::SyncReport;
use crate::client::ServerClient;
use crate::constants::SYNC_CONCURRENCY;
use crate::registry::Blob;

/// Filesystem vault holding one file per content hash.
#[derive(Debug, Clone)]
pub struct VaultStore {
    dir: PathBuf,
}

impl VaultStore {
    /// Open or create the vault directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create vault directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// The vault directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a hash is stored at.
    #[must_use]
    pub fn path_for(&self, hash: &str) -> PathBuf {
        self.dir.join(hash)
    }

    /// Re-derive the vaulted-hash set by scanning the directory.
    ///
    /// The vault is its own source of truth; this scan runs at the start
    /// of every sync so the in-memory set can never go stale across
    /// restarts.
    pub fn scan(&self) -> Result<HashSet<String>> {
        let mut hashes = HashSet::new();
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read vault directory: {}", self.dir.display()))?;
        for entry in entries {
            let entry = entry.context("Failed to read vault entry")?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.len() == 64 && name.chars().all(|c| c.is_ascii_hexdigit()) {
                hashes.insert(name);
            }
        }
        Ok(hashes)
    }

    /// Write blob bytes into the vault.
    ///
    /// Writes to a temporary sibling first so a crash mid-write never
    /// leaves a plausible-looking partial file under a hash name.
    pub async fn write(&self, hash: &str, bytes: &[u8]) -> Result<()> {
        let final_path = self.path_for(hash);
        let tmp_path = self.dir.join(format!(".{hash}.part"));

        tokio::fs::write(&tmp_path, bytes)
            .await
            .with_context(|| format!("Failed to write vault file: {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .with_context(|| format!("Failed to finalize vault file: {}", final_path.display()))?;
        Ok(())
    }

    /// Copy a file from the decode cache into the vault, if present.
    async fn copy_from_decode_cache(&self, cache_dir: &Path, hash: &str) -> Result<bool> {
        let source = cache_dir.join(hash);
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return Ok(false);
        }
        tokio::fs::copy(&source, self.path_for(hash))
            .await
            .with_context(|| format!("Failed to copy from decode cache: {}", source.display()))?;
        Ok(true)
    }
}

/// Fill the vault with every registered hash it is missing.
///
/// At most [`SYNC_CONCURRENCY`] transfers run at once. One hash failing
/// never aborts the batch; `progress` is invoked with
/// `(completed_or_failed, total)` after every item.
pub async fn sync_vault(
    client: &ServerClient,
    vault: &VaultStore,
    registry: &[Blob],
    decode_cache_dir: Option<&Path>,
    mut progress: impl FnMut(usize, usize),
) -> Result<SyncReport> {
    let vaulted = vault.scan()?;

    // One download per hash, whichever server hosts it first.
    let mut seen = HashSet::new();
    let pending: Vec<Blob> = registry
        .iter()
        .filter(|b| b.server_url.is_some())
        .filter(|b| !vaulted.contains(&b.content_hash))
        .filter(|b| seen.insert(b.content_hash.clone()))
        .cloned()
        .collect();

    let total = pending.len();
    if total == 0 {
        debug!("Vault already consistent with registry");
        return Ok(SyncReport::default());
    }
    info!(missing = total, "Vault sync starting");

    let semaphore = Arc::new(Semaphore::new(SYNC_CONCURRENCY));
    let mut stream = futures::stream::iter(pending.into_iter().map(|blob| {
        let semaphore = semaphore.clone();
        let client = client.clone();
        let vault = vault.clone();
        let decode_cache_dir = decode_cache_dir.map(Path::to_path_buf);
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore never closed");
            let result = fetch_into_vault(&client, &vault, &blob, decode_cache_dir.as_deref()).await;
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
            Ok(()) => report.completed += 1,
            Err(e) => {
                warn!(hash = %hash, error = %e, "Vault sync failed for hash");
                report.failed += 1;
            },
        }
        progress(report.completed + report.failed, total);
    }

    info!(summary = %report.summary(), "Vault sync finished");
    Ok(report)
}

/// Bring one blob into the vault: decode cache first, network second.
async fn fetch_into_vault(
    client: &ServerClient,
    vault: &VaultStore,
    blob: &Blob,
    decode_cache_dir: Option<&Path>,
) -> Result<()> {
    if let Some(cache_dir) = decode_cache_dir
        && vault.copy_from_decode_cache(cache_dir, &blob.content_hash).await?
    {
        debug!(hash = %blob.content_hash, "Vaulted from decode cache");
        return Ok(());
    }

    let bytes = client
        .download(&blob.url)
        .await
        .with_context(|| format!("Failed to download {}", blob.url))?;
    vault.write(&blob.content_hash, &bytes).await?;
    debug!(hash = %blob.content_hash, bytes = bytes.len(), "Vaulted from network");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scan_only_reports_hash_named_files() {
        let dir = tempfile::tempdir().unwrap();
        let vault = VaultStore::open(dir.path()).unwrap();

        let hash = "a".repeat(64);
        vault.write(&hash, b"bytes").await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"junk").unwrap();

        let scanned = vault.scan().unwrap();
        assert_eq!(scanned.len(), 1);
        assert!(scanned.contains(&hash));
    }

    #[tokio::test]
    async fn write_is_atomic_rename() {
        let dir = tempfile::tempdir().unwrap();
        let vault = VaultStore::open(dir.path()).unwrap();

        let hash = "b".repeat(64);
        vault.write(&hash, b"payload").await.unwrap();

        assert_eq!(std::fs::read(vault.path_for(&hash)).unwrap(), b"payload");
        // No leftover temp files.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn decode_cache_copy_short_circuits() {
        let vault_dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let vault = VaultStore::open(vault_dir.path()).unwrap();

        let hash = "c".repeat(64);
        std::fs::write(cache_dir.path().join(&hash), b"cached bytes").unwrap();

        let copied = vault
            .copy_from_decode_cache(cache_dir.path(), &hash)
            .await
            .unwrap();
        assert!(copied);
        assert_eq!(
            std::fs::read(vault.path_for(&hash)).unwrap(),
            b"cached bytes"
        );
    }
}
