//! Vault and local-cache synchronization.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::ReconcileEngine;

/// Run the tier synchronizers.
///
/// With neither flag set, both run.
pub async fn execute(engine: &ReconcileEngine, vault: bool, local_cache: bool) -> Result<()> {
    let run_both = !vault && !local_cache;

    if vault || run_both {
        let bar = progress_bar("vault");
        let report = engine
            .sync_vault(|done, total| {
                bar.set_length(total as u64);
                bar.set_position(done as u64);
            })
            .await
            .context("Vault sync failed")?;
        bar.finish_and_clear();
        println!("vault sync: {}", report.summary());
    }

    if local_cache || run_both {
        let bar = progress_bar("local cache");
        let result = engine
            .sync_local_cache(|done, total| {
                bar.set_length(total as u64);
                bar.set_position(done as u64);
            })
            .await
            .context("Local cache sync failed")?;
        bar.finish_and_clear();
        match result {
            Some(report) => println!("local cache sync: {}", report.summary()),
            None => println!("local cache sync: no cache detected"),
        }
    }

    Ok(())
}

fn progress_bar(name: &str) -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{prefix:>12} [{bar:30}] {pos}/{len}")
            .expect("static template is valid"),
    );
    bar.set_prefix(name.to_string());
    bar
}
