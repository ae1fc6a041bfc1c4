//! Full registry refresh.

use anyhow::{Context, Result};

use crate::engine::ReconcileEngine;

/// Execute a full refresh cycle and print the outcome.
pub async fn execute(engine: &ReconcileEngine) -> Result<()> {
    let report = engine.refresh().await.context("Refresh failed")?;

    println!("{}", report.diagnostic());
    if report.demoted > 0 {
        println!("  moved to trash: {}", report.demoted);
    }
    if report.restored > 0 {
        println!("  restored from trash: {}", report.restored);
    }

    // Label discovery is best-effort; a relay outage is not a refresh
    // failure.
    match engine.ingest_relay_metadata().await {
        Ok(0) => {},
        Ok(updated) => println!("  labels updated from relays: {updated}"),
        Err(e) => eprintln!("  relay metadata skipped: {e}"),
    }

    Ok(())
}
