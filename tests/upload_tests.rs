//! Upload coordination integration tests.

#[path = "common.rs"]
mod common;

use std::sync::Arc;

use blobsync::auth::AuthNegotiator;
use blobsync::client::ServerClient;
use blobsync::content;
use blobsync::relay::MemoryRelay;
use blobsync::signer::EchoSigner;
use blobsync::sync::upload::{UploadCoordinator, UploadPhase};
use common::{MockState, spawn};

fn coordinator(servers: Vec<String>) -> (UploadCoordinator, Arc<MemoryRelay>) {
    let client = ServerClient::new(Arc::new(AuthNegotiator::new())).expect("client builds");
    let relay = Arc::new(MemoryRelay::new());
    let coordinator = UploadCoordinator::new(
        client,
        Arc::new(EchoSigner),
        relay.clone(),
        "ab".repeat(32),
        servers,
    );
    (coordinator, relay)
}

#[tokio::test]
async fn upload_walks_the_phase_machine() {
    let state = MockState::empty();
    let server = spawn(state.clone()).await;
    let (coordinator, _relay) = coordinator(vec![server.url.clone()]);

    let mut phases = Vec::new();
    let outcome = coordinator
        .upload(b"fresh bytes".to_vec(), "application/octet-stream", &[], |p| {
            phases.push(p.clone());
        })
        .await
        .expect("upload succeeds");

    assert_eq!(
        phases,
        vec![
            UploadPhase::Prepared,
            UploadPhase::Hashing,
            UploadPhase::AwaitingSignature,
            UploadPhase::Uploading { server_index: 0 },
            UploadPhase::Mirroring,
            UploadPhase::PublishingMetadata,
            UploadPhase::Done,
        ]
    );
    assert!(!outcome.already_hosted);
    assert_eq!(state.uploads.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn idempotent_upload_never_transfers() {
    let bytes = b"already known bytes".to_vec();
    let hash = content::sha256_hex(&bytes);

    let state = MockState::hosting(&[&hash]);
    let server = spawn(state.clone()).await;
    let (coordinator, _relay) = coordinator(vec![server.url.clone()]);

    let outcome = coordinator
        .upload(bytes, "application/octet-stream", &[], |_| {})
        .await
        .expect("upload succeeds");

    // HEAD said the hash exists, so no PUT was ever issued and the
    // synthesized result references the pre-existing copy.
    assert!(outcome.already_hosted);
    assert!(state.uploads.lock().unwrap().is_empty());
    assert_eq!(outcome.blob.content_hash, hash);
    assert_eq!(outcome.blob.url, format!("{}/{hash}", server.url));
}

#[tokio::test]
async fn upload_fails_over_to_next_server() {
    let broken = MockState::empty();
    *broken.fail_upload.lock().unwrap() = true;
    let healthy = MockState::empty();

    let broken_server = spawn(broken.clone()).await;
    let healthy_server = spawn(healthy.clone()).await;
    let (coordinator, _relay) = coordinator(vec![
        broken_server.url.clone(),
        healthy_server.url.clone(),
    ]);

    let mut upload_phases = Vec::new();
    let outcome = coordinator
        .upload(b"failover bytes".to_vec(), "application/octet-stream", &[], |p| {
            if let UploadPhase::Uploading { server_index } = p {
                upload_phases.push(*server_index);
            }
        })
        .await
        .expect("upload succeeds on second server");

    // Sequential failover, not parallel fan-out.
    assert_eq!(upload_phases, vec![0, 1]);
    assert_eq!(
        outcome.blob.server_url.as_deref(),
        Some(healthy_server.url.as_str())
    );
    assert!(broken.uploads.lock().unwrap().is_empty());
    assert_eq!(healthy.uploads.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn upload_fails_only_after_every_server() {
    let s1 = MockState::empty();
    let s2 = MockState::empty();
    *s1.fail_upload.lock().unwrap() = true;
    *s2.fail_upload.lock().unwrap() = true;

    let server1 = spawn(s1).await;
    let server2 = spawn(s2).await;
    let (coordinator, _relay) = coordinator(vec![server1.url, server2.url]);

    let mut phases = Vec::new();
    let result = coordinator
        .upload(b"doomed bytes".to_vec(), "application/octet-stream", &[], |p| {
            phases.push(p.clone());
        })
        .await;

    assert!(result.is_err());
    assert_eq!(phases.last(), Some(&UploadPhase::Failed));
    assert!(phases.contains(&UploadPhase::Uploading { server_index: 1 }));
}

#[tokio::test]
async fn upload_mirrors_to_other_servers_and_publishes() {
    let primary = MockState::empty();
    let secondary = MockState::empty();

    let primary_server = spawn(primary.clone()).await;
    let secondary_server = spawn(secondary.clone()).await;
    let (coordinator, relay) = coordinator(vec![
        primary_server.url.clone(),
        secondary_server.url.clone(),
    ]);

    let outcome = coordinator
        .upload(b"mirrored bytes".to_vec(), "image/png", &[], |_| {})
        .await
        .expect("upload succeeds");

    // The secondary got a mirror request, not a re-upload.
    assert!(secondary.uploads.lock().unwrap().is_empty());
    assert_eq!(secondary.mirrors.lock().unwrap().len(), 1);
    assert_eq!(outcome.mirrored.len(), 1);
    assert_eq!(
        outcome.mirrored[0].server_url.as_deref(),
        Some(secondary_server.url.as_str())
    );

    // The metadata event carries the mirror as a fallback.
    let published = relay.published();
    assert_eq!(published.len(), 1);
    let event: serde_json::Value = serde_json::from_str(&published[0]).unwrap();
    assert_eq!(event["kind"], 1063);
    let tags = event["tags"].as_array().unwrap();
    assert!(tags.iter().any(|t| t[0] == "fallback"));
    assert!(
        tags.iter()
            .any(|t| t[0] == "x" && t[1] == outcome.blob.content_hash.as_str())
    );
}
