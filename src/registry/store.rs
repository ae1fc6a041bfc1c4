//! Redb-backed persistence for registry, trash, labels, and caches.
//!
//! Everything the engine must survive a restart with lives in one redb
//! database: the registry and trash (written together in a single
//! transaction so readers never observe a half-merged cycle), the durable
//! label store, the locally-cached-hash set, and the negotiated auth
//! prefixes.

use anyhow::{Context, Result};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use super::Blob;
use crate::metadata::TagRecord;

/// Registry entries keyed by `"{hash}\0{server}"`.
const REGISTRY_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("registry");

/// Trash records keyed by content hash.
const TRASH_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("trash");

/// Durable label store keyed by content hash.
const LABELS_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("labels");

/// Hashes confirmed present in the local network cache.
const CACHED_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("local_cache");

/// Accepted auth prefix per server host.
const PREFIX_TABLE: TableDefinition<'static, &'static str, &'static str> =
    TableDefinition::new("auth_prefixes");

/// Persistent state store.
///
/// # Thread Safety
///
/// `Store` is `Clone` and can be shared across threads. Blocking redb work
/// runs under `tokio::task::spawn_blocking` in the async wrappers.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Opens or creates the state database at the given path.
    ///
    /// Creates parent directories if needed and initializes all tables so
    /// first reads don't fail on missing tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created or
    /// the initialization transaction fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create state directory: {}", parent.display())
            })?;
        }

        let db = Database::create(path)
            .with_context(|| format!("Failed to open state database: {}", path.display()))?;

        let write_txn = db
            .begin_write()
            .context("Failed to begin initialization transaction")?;
        {
            write_txn
                .open_table(REGISTRY_TABLE)
                .context("Failed to initialize registry table")?;
            write_txn
                .open_table(TRASH_TABLE)
                .context("Failed to initialize trash table")?;
            write_txn
                .open_table(LABELS_TABLE)
                .context("Failed to initialize labels table")?;
            write_txn
                .open_table(CACHED_TABLE)
                .context("Failed to initialize local-cache table")?;
            write_txn
                .open_table(PREFIX_TABLE)
                .context("Failed to initialize auth-prefix table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initialization transaction")?;

        Ok(Self { db: Arc::new(db) })
    }

    // =========================================================================
    // Registry + Trash
    // =========================================================================

    /// Load the persisted registry, sorted by creation time descending.
    pub fn load_registry_sync(&self) -> Result<Vec<Blob>> {
        let mut registry = self.load_blob_table(REGISTRY_TABLE, "registry")?;
        registry.sort_by(|a, b| b.creation_time.cmp(&a.creation_time));
        Ok(registry)
    }

    /// Load the persisted trash set.
    pub fn load_trash_sync(&self) -> Result<Vec<Blob>> {
        self.load_blob_table(TRASH_TABLE, "trash")
    }

    fn load_blob_table(
        &self,
        table_def: TableDefinition<'static, &'static str, &'static [u8]>,
        name: &str,
    ) -> Result<Vec<Blob>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(table_def)
            .with_context(|| format!("Failed to open {name} table"))?;

        let mut blobs = Vec::new();
        for item in table
            .iter()
            .with_context(|| format!("Failed to iterate {name} table"))?
        {
            let (_, value) = item.with_context(|| format!("Failed to read {name} entry"))?;
            let blob: Blob = serde_json::from_slice(value.value())
                .with_context(|| format!("Failed to deserialize {name} entry"))?;
            blobs.push(blob);
        }
        Ok(blobs)
    }

    /// Replace registry and trash in one transaction.
    ///
    /// The single commit is what makes a refresh cycle atomic for readers:
    /// either the whole merged snapshot lands or none of it does.
    pub fn commit_snapshot_sync(&self, registry: &[Blob], trash: &[Blob]) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin snapshot transaction")?;

        // Dropping and re-opening the tables replaces the previous
        // snapshot wholesale within the same transaction.
        write_txn
            .delete_table(REGISTRY_TABLE)
            .context("Failed to clear registry table")?;
        write_txn
            .delete_table(TRASH_TABLE)
            .context("Failed to clear trash table")?;
        {
            let mut reg_table = write_txn
                .open_table(REGISTRY_TABLE)
                .context("Failed to open registry table")?;
            for blob in registry {
                let json = serde_json::to_vec(blob).context("Failed to serialize registry entry")?;
                reg_table
                    .insert(blob.registry_key().as_str(), json.as_slice())
                    .with_context(|| {
                        format!("Failed to insert registry entry: {}", blob.content_hash)
                    })?;
            }

            let mut trash_table = write_txn
                .open_table(TRASH_TABLE)
                .context("Failed to open trash table")?;
            for blob in trash {
                let json = serde_json::to_vec(blob).context("Failed to serialize trash entry")?;
                trash_table
                    .insert(blob.content_hash.as_str(), json.as_slice())
                    .with_context(|| {
                        format!("Failed to insert trash entry: {}", blob.content_hash)
                    })?;
            }
        }
        write_txn
            .commit()
            .context("Failed to commit snapshot transaction")?;

        Ok(())
    }

    // =========================================================================
    // Labels
    // =========================================================================

    /// Persist the label records for one hash.
    pub fn save_labels_sync(&self, content_hash: &str, records: &[TagRecord]) -> Result<()> {
        let json = serde_json::to_vec(records).context("Failed to serialize label records")?;
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin label transaction")?;
        {
            let mut table = write_txn
                .open_table(LABELS_TABLE)
                .context("Failed to open labels table")?;
            table
                .insert(content_hash, json.as_slice())
                .with_context(|| format!("Failed to insert labels for {content_hash}"))?;
        }
        write_txn
            .commit()
            .context("Failed to commit label transaction")?;
        Ok(())
    }

    /// Load the label records for one hash.
    pub fn load_labels_sync(&self, content_hash: &str) -> Result<Vec<TagRecord>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(LABELS_TABLE)
            .context("Failed to open labels table")?;

        match table
            .get(content_hash)
            .with_context(|| format!("Failed to read labels for {content_hash}"))?
        {
            Some(guard) => serde_json::from_slice(guard.value())
                .with_context(|| format!("Failed to deserialize labels for {content_hash}")),
            None => Ok(Vec::new()),
        }
    }

    /// Load every hash's label records.
    pub fn load_all_labels_sync(&self) -> Result<HashMap<String, Vec<TagRecord>>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(LABELS_TABLE)
            .context("Failed to open labels table")?;

        let mut labels = HashMap::new();
        for item in table.iter().context("Failed to iterate labels table")? {
            let (key, value) = item.context("Failed to read label entry")?;
            let records: Vec<TagRecord> = serde_json::from_slice(value.value())
                .with_context(|| format!("Failed to deserialize labels for {}", key.value()))?;
            labels.insert(key.value().to_string(), records);
        }
        Ok(labels)
    }

    // =========================================================================
    // Local cache bookkeeping
    // =========================================================================

    /// Record that a hash is present in the local network cache.
    pub fn record_cached_sync(&self, content_hash: &str) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin cache transaction")?;
        {
            let mut table = write_txn
                .open_table(CACHED_TABLE)
                .context("Failed to open local-cache table")?;
            table
                .insert(content_hash, b"".as_slice())
                .with_context(|| format!("Failed to record cached hash {content_hash}"))?;
        }
        write_txn
            .commit()
            .context("Failed to commit cache transaction")?;
        Ok(())
    }

    /// All hashes recorded as present in the local network cache.
    pub fn cached_hashes_sync(&self) -> Result<HashSet<String>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(CACHED_TABLE)
            .context("Failed to open local-cache table")?;

        let mut hashes = HashSet::new();
        for item in table.iter().context("Failed to iterate local-cache table")? {
            let (key, _) = item.context("Failed to read cached hash")?;
            hashes.insert(key.value().to_string());
        }
        Ok(hashes)
    }

    // =========================================================================
    // Auth prefixes
    // =========================================================================

    /// Persist the accepted auth prefix for a host.
    pub fn save_prefix_sync(&self, host: &str, prefix: &str) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin prefix transaction")?;
        {
            let mut table = write_txn
                .open_table(PREFIX_TABLE)
                .context("Failed to open auth-prefix table")?;
            table
                .insert(host, prefix)
                .with_context(|| format!("Failed to save prefix for {host}"))?;
        }
        write_txn
            .commit()
            .context("Failed to commit prefix transaction")?;
        Ok(())
    }

    /// All persisted `(host, prefix)` pairs.
    pub fn load_prefixes_sync(&self) -> Result<Vec<(String, String)>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(PREFIX_TABLE)
            .context("Failed to open auth-prefix table")?;

        let mut prefixes = Vec::new();
        for item in table.iter().context("Failed to iterate auth-prefix table")? {
            let (key, value) = item.context("Failed to read prefix entry")?;
            prefixes.push((key.value().to_string(), value.value().to_string()));
        }
        Ok(prefixes)
    }

    // =========================================================================
    // Async wrappers
    // =========================================================================

    /// Async wrapper around [`Self::load_registry_sync`].
    pub async fn load_registry(&self) -> Result<Vec<Blob>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_registry_sync())
            .await
            .context("Task join error")?
    }

    /// Async wrapper around [`Self::load_trash_sync`].
    pub async fn load_trash(&self) -> Result<Vec<Blob>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_trash_sync())
            .await
            .context("Task join error")?
    }

    /// Async wrapper around [`Self::commit_snapshot_sync`].
    pub async fn commit_snapshot(&self, registry: Vec<Blob>, trash: Vec<Blob>) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.commit_snapshot_sync(&registry, &trash))
            .await
            .context("Task join error")?
    }

    /// Async wrapper around [`Self::save_labels_sync`].
    pub async fn save_labels(&self, content_hash: String, records: Vec<TagRecord>) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.save_labels_sync(&content_hash, &records))
            .await
            .context("Task join error")?
    }

    /// Async wrapper around [`Self::record_cached_sync`].
    pub async fn record_cached(&self, content_hash: String) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.record_cached_sync(&content_hash))
            .await
            .context("Task join error")?
    }

    /// Async wrapper around [`Self::cached_hashes_sync`].
    pub async fn cached_hashes(&self) -> Result<HashSet<String>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.cached_hashes_sync())
            .await
            .context("Task join error")?
    }
}
