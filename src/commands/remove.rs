//! Blob deletion.

use anyhow::{Context, Result};

use crate::engine::ReconcileEngine;

/// Delete hashes from every server hosting them.
///
/// Registry entries disappear only on confirmed deletion; a hash whose
/// last copy is deleted lands in the trash rather than vanishing.
pub async fn execute(engine: &ReconcileEngine, hashes: &[String]) -> Result<()> {
    let report = engine.delete(hashes).await.context("Delete failed")?;
    println!("{}", report.summary("delete"));
    Ok(())
}
