//! File upload.

use std::path::PathBuf;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::{BatchReport, ReconcileEngine};
use crate::sync::upload::UploadPhase;
use crate::utils::short_hash;

/// Upload files, mirroring each to every configured server.
pub async fn execute(engine: &ReconcileEngine, files: &[PathBuf]) -> Result<()> {
    let mut report = BatchReport::default();

    for path in files {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let mime_type = mime_guess::from_path(path)
            .first()
            .map_or_else(|| "application/octet-stream".to_string(), |m| m.to_string());

        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {prefix}: {msg}")
                .expect("static template is valid"),
        );
        bar.set_prefix(path.display().to_string());

        let result = engine
            .upload(bytes, &mime_type, |phase| {
                bar.set_message(phase_label(phase).to_string());
                bar.tick();
            })
            .await;

        match result {
            Ok(outcome) => {
                report.success += 1;
                let note = if outcome.already_hosted {
                    "already hosted"
                } else {
                    "uploaded"
                };
                bar.finish_with_message(format!(
                    "{note} as {} ({} mirror(s))",
                    short_hash(&outcome.blob.content_hash),
                    outcome.mirrored.len(),
                ));
            },
            Err(e) => {
                report.failed += 1;
                bar.finish_with_message(format!("failed: {e}"));
            },
        }
    }

    println!("{}", report.summary("upload"));
    Ok(())
}

fn phase_label(phase: &UploadPhase) -> &'static str {
    match phase {
        UploadPhase::Prepared => "prepared",
        UploadPhase::Hashing => "hashing",
        UploadPhase::AwaitingSignature => "awaiting signature",
        UploadPhase::Uploading { .. } => "uploading",
        UploadPhase::Mirroring => "mirroring",
        UploadPhase::PublishingMetadata => "publishing metadata",
        UploadPhase::Done => "done",
        UploadPhase::Failed => "failed",
    }
}
