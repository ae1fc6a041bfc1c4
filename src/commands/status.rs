//! Registry and tier statistics.

use std::collections::HashSet;

use anyhow::Result;

use crate::config::Config;
use crate::engine::ReconcileEngine;
use crate::utils::format_bytes;

/// Print registry, vault, and cache statistics.
pub fn execute(engine: &ReconcileEngine, config: &Config) -> Result<()> {
    let snapshot = engine.snapshot();

    let unique: HashSet<&str> = snapshot
        .registry
        .iter()
        .map(|b| b.content_hash.as_str())
        .collect();
    let total_bytes: u64 = {
        let mut seen = HashSet::new();
        snapshot
            .registry
            .iter()
            .filter(|b| seen.insert(b.content_hash.as_str()))
            .filter_map(|b| b.size_bytes)
            .sum()
    };

    println!("Registry");
    println!("========");
    println!("Entries:       {}", snapshot.registry.len());
    println!("Unique files:  {}", unique.len());
    println!("Total size:    {}", format_bytes(total_bytes));
    println!("Trash:         {}", snapshot.trash.len());
    println!("Labeled:       {}", snapshot.labels.len());

    println!();
    println!("Servers");
    println!("=======");
    for server in engine.servers() {
        let count = snapshot
            .registry
            .iter()
            .filter(|b| b.server_url.as_deref() == Some(server.as_str()))
            .count();
        println!("{server}: {count} blob(s)");
    }

    println!();
    println!("Local tiers");
    println!("===========");
    println!("Vaulted:        {}", snapshot.vaulted.len());
    println!("Locally cached: {}", snapshot.locally_cached.len());
    if let Ok(vault_dir) = config.vault_dir() {
        println!("Vault dir:      {}", vault_dir.display());
    }

    Ok(())
}
