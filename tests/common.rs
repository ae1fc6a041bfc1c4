//! In-process mock blob server for integration tests.
//!
//! Speaks just enough of the blob-server protocol for the client layer:
//! paginated listings, existence probes, uploads, mirrors, and deletes,
//! with configurable auth-prefix pickiness and failure injection.

// Each integration test crate includes this file and uses a subset of it.
#![allow(dead_code)]

use std::collections::HashSet;
use std::future::IntoFuture;
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, head, put};
use axum::Router;

/// Mutable behavior and call recording for one mock server.
#[derive(Default)]
pub struct MockState {
    /// Hashes currently hosted; served by `/list` and HEAD probes.
    pub hosted: Mutex<Vec<String>>,
    /// Blob bodies served by `GET /{hash}`, keyed by hash.
    pub bodies: Mutex<std::collections::HashMap<String, Vec<u8>>>,
    /// Only accept this auth prefix; `None` accepts any.
    pub accepted_prefix: Mutex<Option<String>>,
    /// Auth prefixes seen on `/list` requests, in order.
    pub auth_attempts: Mutex<Vec<String>>,
    /// Cursors seen on `/list` requests, in order.
    pub list_cursors: Mutex<Vec<Option<String>>>,
    /// Serve the same full page forever (stuck-cursor server).
    pub stuck_cursor: Mutex<bool>,
    /// Respond 500 to `/list`.
    pub fail_list: Mutex<bool>,
    /// Respond 500 to `/upload`.
    pub fail_upload: Mutex<bool>,
    /// Hashes received via PUT/POST `/upload`.
    pub uploads: Mutex<Vec<String>>,
    /// Source URLs received via `/mirror`.
    pub mirrors: Mutex<Vec<String>>,
    /// Hashes deleted.
    pub deleted: Mutex<Vec<String>>,
}

impl MockState {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn hosting<S: AsRef<str>>(hashes: &[S]) -> Arc<Self> {
        let state = Self::default();
        *state.hosted.lock().unwrap() =
            hashes.iter().map(|h| h.as_ref().to_string()).collect();
        Arc::new(state)
    }

    pub fn host(&self, hash: &str) {
        self.hosted.lock().unwrap().push(hash.to_string());
    }

    pub fn host_with_body(&self, hash: &str, body: &[u8]) {
        self.host(hash);
        self.bodies
            .lock()
            .unwrap()
            .insert(hash.to_string(), body.to_vec());
    }

    pub fn unhost(&self, hash: &str) {
        self.hosted.lock().unwrap().retain(|h| h != hash);
    }

    pub fn require_prefix(&self, prefix: &str) {
        *self.accepted_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    fn auth_ok(&self, headers: &HeaderMap) -> bool {
        let Some(required) = self.accepted_prefix.lock().unwrap().clone() else {
            return true;
        };
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split_whitespace().next())
            .is_some_and(|prefix| prefix == required)
    }
}

/// A running mock server.
pub struct MockServer {
    pub url: String,
    pub state: Arc<MockState>,
}

/// Spawn a mock blob server on an ephemeral port.
pub async fn spawn(state: Arc<MockState>) -> MockServer {
    let app = Router::new()
        .route("/list/{pubkey}", get(list_handler))
        .route("/upload", put(upload_handler).post(upload_handler))
        .route("/mirror", put(mirror_handler).post(mirror_handler))
        .route(
            "/{hash}",
            head(head_handler).get(get_handler).delete(delete_handler),
        )
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(axum::serve(listener, app).into_future());

    MockServer {
        url: format!("http://{addr}"),
        state,
    }
}

#[derive(serde::Deserialize)]
struct ListQuery {
    #[allow(dead_code)]
    limit: Option<usize>,
    cursor: Option<String>,
}

async fn list_handler(
    State(state): State<Arc<MockState>>,
    Path(_pubkey): Path<String>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let prefix = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_whitespace().next())
        .unwrap_or("")
        .to_string();
    state.auth_attempts.lock().unwrap().push(prefix);

    if !state.auth_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if *state.fail_list.lock().unwrap() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    state
        .list_cursors
        .lock()
        .unwrap()
        .push(query.cursor.clone());

    let host = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("mock.invalid")
        .to_string();

    let hosted = state.hosted.lock().unwrap().clone();
    let descriptors: Vec<serde_json::Value> = if *state.stuck_cursor.lock().unwrap() {
        // A full page whose cursor never advances.
        hosted
            .iter()
            .cycle()
            .take(250)
            .map(|h| descriptor(&host, h))
            .collect()
    } else {
        hosted.iter().map(|h| descriptor(&host, h)).collect()
    };

    Json(descriptors).into_response()
}

fn descriptor(host: &str, hash: &str) -> serde_json::Value {
    serde_json::json!({
        "url": format!("http://{host}/{hash}"),
        "sha256": hash,
        "size": 1024,
        "type": "image/jpeg",
        "uploaded": 1_700_000_000u64,
    })
}

async fn get_handler(
    State(state): State<Arc<MockState>>,
    Path(hash): Path<String>,
) -> impl IntoResponse {
    match state.bodies.lock().unwrap().get(&hash) {
        Some(body) => (StatusCode::OK, body.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn head_handler(
    State(state): State<Arc<MockState>>,
    Path(hash): Path<String>,
) -> StatusCode {
    if state.hosted.lock().unwrap().contains(&hash) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn upload_handler(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    if !state.auth_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if *state.fail_upload.lock().unwrap() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let hash = blobsync::content::sha256_hex(&body);
    state.uploads.lock().unwrap().push(hash.clone());
    state.hosted.lock().unwrap().push(hash.clone());

    Json(serde_json::json!({
        "url": format!("https://cdn.example.com/{hash}"),
        "sha256": hash,
    }))
    .into_response()
}

#[derive(serde::Deserialize)]
struct MirrorBody {
    url: String,
}

async fn mirror_handler(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<MirrorBody>,
) -> impl IntoResponse {
    if !state.auth_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    // Mirror by hash from the source URL's last path segment.
    if let Some(hash) = body.url.rsplit('/').next() {
        state.hosted.lock().unwrap().push(hash.to_string());
    }
    state.mirrors.lock().unwrap().push(body.url);
    StatusCode::OK.into_response()
}

async fn delete_handler(
    State(state): State<Arc<MockState>>,
    Path(hash): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    if !state.auth_ok(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let mut hosted = state.hosted.lock().unwrap();
    if hosted.contains(&hash) {
        hosted.retain(|h| *h != hash);
        state.deleted.lock().unwrap().push(hash);
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Distinct hashes in the mock's hosted set.
pub fn hosted_set(state: &MockState) -> HashSet<String> {
    state.hosted.lock().unwrap().iter().cloned().collect()
}

/// A 64-hex test hash derived from a label.
pub fn test_hash(label: &str) -> String {
    blobsync::content::sha256_hex(label.as_bytes())
}
