//! User-authored labels.

use anyhow::{Context, Result};

use crate::engine::ReconcileEngine;

/// Attach a label to one or more hashes.
pub async fn execute(
    engine: &ReconcileEngine,
    hashes: &[String],
    key: &str,
    value: &str,
) -> Result<()> {
    match hashes {
        [hash] => {
            engine
                .set_label(hash, key, value)
                .await
                .context("Label failed")?;
            println!("labeled {hash}: {key}={value}");
        },
        _ => {
            let report = engine
                .set_label_bulk(hashes, key, value)
                .await
                .context("Bulk label failed")?;
            println!("{}", report.summary("label"));
        },
    }
    Ok(())
}
