//! Upload coordination.
//!
//! Drives one file through hash → authorize → upload → mirror → publish,
//! with sequential per-server failover on the upload leg and parallel
//! best-effort mirroring afterwards. A server that already hosts the hash
//! short-circuits the transfer entirely.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::event::{AuthAction, build_auth_event};
use crate::client::ServerClient;
use crate::content;
use crate::error::{Error, Result};
use crate::metadata::{TagRecord, build_file_metadata_event};
use crate::registry::Blob;
use crate::relay::Relay;
use crate::signer::Signer;

/// Phases of one queued upload, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadPhase {
    Prepared,
    Hashing,
    AwaitingSignature,
    /// Uploading to `servers[index]`; failure advances to the next one.
    Uploading { server_index: usize },
    Mirroring,
    PublishingMetadata,
    Done,
    /// Reached only after every configured server was exhausted.
    Failed,
}

/// Result of a completed upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Unique id of this upload task.
    pub id: Uuid,
    /// The primary hosted copy.
    pub blob: Blob,
    /// Confirmed mirror copies on other servers.
    pub mirrored: Vec<Blob>,
    /// The primary server already had the hash; no bytes were sent.
    pub already_hosted: bool,
    /// Whether the file-metadata event reached a relay.
    pub published: bool,
}

/// Coordinates uploads against the configured server set.
pub struct UploadCoordinator {
    client: ServerClient,
    signer: Arc<dyn Signer>,
    relay: Arc<dyn Relay>,
    pubkey: String,
    servers: Vec<String>,
}

impl UploadCoordinator {
    /// Create a coordinator for one identity and server set.
    #[must_use]
    pub fn new(
        client: ServerClient,
        signer: Arc<dyn Signer>,
        relay: Arc<dyn Relay>,
        pubkey: String,
        servers: Vec<String>,
    ) -> Self {
        Self {
            client,
            signer,
            relay,
            pubkey,
            servers,
        }
    }

    /// Upload one file's bytes, observing each phase transition.
    ///
    /// The bytes are canonicalized before hashing, so the hash matches
    /// what a later refresh will discover. Mirror failures are tolerated;
    /// the metadata event carries whichever mirrors succeeded as
    /// fallbacks.
    ///
    /// # Errors
    ///
    /// Fails when no server accepted the upload, the signer declined, or
    /// the signer itself errored.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        labels: &[TagRecord],
        mut observer: impl FnMut(&UploadPhase),
    ) -> Result<UploadOutcome> {
        let id = Uuid::new_v4();
        observer(&UploadPhase::Prepared);

        if self.servers.is_empty() {
            observer(&UploadPhase::Failed);
            return Err(Error::Config("no servers configured".to_string()));
        }

        observer(&UploadPhase::Hashing);
        let processed = content::process(&bytes, mime_type);
        debug!(id = %id, hash = %processed.hash, size = processed.size_bytes, "Content hashed");

        observer(&UploadPhase::AwaitingSignature);
        let auth_event = build_auth_event(&self.pubkey, AuthAction::Upload, Some(&processed.hash));
        let signed = self
            .signer
            .sign(&auth_event, &self.pubkey)
            .await
            .map_err(|e| Error::Signer(e.to_string()))?
            .ok_or(Error::SignatureUnavailable)?;

        let (blob, already_hosted) = match self
            .upload_with_failover(&processed, mime_type, &signed, &mut observer)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                observer(&UploadPhase::Failed);
                return Err(e);
            },
        };

        observer(&UploadPhase::Mirroring);
        let mirrored = self.mirror_to_others(&blob, &signed).await;

        observer(&UploadPhase::PublishingMetadata);
        let mirror_urls: Vec<String> = mirrored.iter().map(|b| b.url.clone()).collect();
        let published = self.publish_metadata(&blob, &mirror_urls, labels).await;

        observer(&UploadPhase::Done);
        info!(
            id = %id,
            hash = %blob.content_hash,
            server = blob.server_url.as_deref().unwrap_or(""),
            mirrors = mirrored.len(),
            published = published,
            "Upload complete"
        );

        Ok(UploadOutcome {
            id,
            blob,
            mirrored,
            already_hosted,
            published,
        })
    }

    /// Try each server in order until one hosts the blob.
    async fn upload_with_failover(
        &self,
        processed: &content::Processed,
        mime_type: &str,
        signed: &str,
        observer: &mut impl FnMut(&UploadPhase),
    ) -> Result<(Blob, bool)> {
        let mut last_error = None;

        for (server_index, server) in self.servers.iter().enumerate() {
            observer(&UploadPhase::Uploading { server_index });

            // Idempotent upload: a server that already has the hash gets
            // no bytes, just a synthesized success.
            if self
                .client
                .has_blob(server, &processed.hash)
                .await
                .unwrap_or(false)
            {
                debug!(server = %server, hash = %processed.hash, "Already hosted, skipping transfer");
                return Ok((
                    self.hosted_blob(server, &format!("{server}/{}", processed.hash), processed, mime_type),
                    true,
                ));
            }

            match self
                .client
                .upload(server, processed.canonical_bytes.clone(), mime_type, signed)
                .await
            {
                Ok(response) => {
                    if response.sha256.to_lowercase() != processed.hash {
                        // The result is discarded; the original bytes are
                        // never assumed corrupted.
                        warn!(
                            server = %server,
                            expected = %processed.hash,
                            actual = %response.sha256,
                            "Server reported a different hash"
                        );
                        last_error = Some(Error::DataIntegrity {
                            expected: processed.hash.clone(),
                            actual: response.sha256.to_lowercase(),
                        });
                        continue;
                    }
                    return Ok((
                        self.hosted_blob(server, &response.url, processed, mime_type),
                        false,
                    ));
                },
                Err(e) => {
                    warn!(server = %server, error = %e, "Upload failed, trying next server");
                    last_error = Some(e);
                },
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Config("no servers configured".to_string())))
    }

    fn hosted_blob(
        &self,
        server: &str,
        url: &str,
        processed: &content::Processed,
        mime_type: &str,
    ) -> Blob {
        Blob {
            content_hash: processed.hash.clone(),
            url: url.to_string(),
            size_bytes: Some(processed.size_bytes),
            mime_type: Some(mime_type.to_string()),
            server_url: Some(server.to_string()),
            creation_time: Utc::now().timestamp().max(0) as u64,
            tags: Vec::new(),
        }
    }

    /// Mirror the primary copy to every other server in parallel.
    ///
    /// Mirroring hands the source URL to the target server; the bytes are
    /// never re-uploaded from the device.
    async fn mirror_to_others(&self, blob: &Blob, signed: &str) -> Vec<Blob> {
        let primary = blob.server_url.as_deref().unwrap_or("");
        let targets: Vec<&String> = self
            .servers
            .iter()
            .filter(|s| s.as_str() != primary)
            .collect();

        let results = join_all(targets.iter().map(|server| {
            let client = self.client.clone();
            let source_url = blob.url.clone();
            async move {
                client
                    .mirror(server, &source_url, signed)
                    .await
                    .map(|()| (*server).clone())
            }
        }))
        .await;

        let mut mirrored = Vec::new();
        for result in results {
            match result {
                Ok(server) => {
                    let mut copy = blob.clone();
                    copy.url = format!("{server}/{}", blob.content_hash);
                    copy.server_url = Some(server);
                    mirrored.push(copy);
                },
                Err(e) => warn!(error = %e, "Mirror failed"),
            }
        }
        mirrored
    }

    /// Sign and publish the file-metadata event; best-effort.
    async fn publish_metadata(
        &self,
        blob: &Blob,
        mirror_urls: &[String],
        labels: &[TagRecord],
    ) -> bool {
        let event = build_file_metadata_event(&self.pubkey, blob, mirror_urls, labels);
        match self.signer.sign(&event, &self.pubkey).await {
            Ok(Some(signed)) => match self.relay.publish(&signed).await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Metadata publish failed");
                    false
                },
            },
            Ok(None) => {
                debug!("Signer declined metadata event");
                false
            },
            Err(e) => {
                warn!(error = %e, "Signer failed for metadata event");
                false
            },
        }
    }
}
