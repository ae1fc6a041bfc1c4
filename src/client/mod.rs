//! HTTP client for Blossom-style blob servers.
//!
//! One [`ServerClient`] serves every configured server. Each operation
//! sends the signed authorization event under the negotiated header
//! prefix and falls back to the alternate prefix once on a 401, except
//! against the trusted local cache.

pub mod descriptor;
pub mod list;

use bytes::Bytes;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

use crate::auth::{self, AuthNegotiator};
use crate::constants::{
    HTTP_CONNECT_TIMEOUT, HTTP_PROBE_TIMEOUT, HTTP_TRANSFER_TIMEOUT, LOCAL_CACHE_HOSTS,
};
use crate::error::{Error, Result};

pub use descriptor::BlobDescriptor;

/// 2xx body of a successful upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub url: String,
    pub sha256: String,
}

/// Shared HTTP client for all blob-server operations.
#[derive(Clone)]
pub struct ServerClient {
    /// Short-timeout client for listings and probes.
    probe: reqwest::Client,
    /// Long-timeout client for body transfers.
    transfer: reqwest::Client,
    auth: Arc<AuthNegotiator>,
}

impl ServerClient {
    /// Build a client with per-class timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend fails to initialize.
    pub fn new(auth: Arc<AuthNegotiator>) -> Result<Self> {
        let probe = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(HTTP_PROBE_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        let transfer = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(HTTP_TRANSFER_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            probe,
            transfer,
            auth,
        })
    }

    /// The negotiator backing this client.
    #[must_use]
    pub fn negotiator(&self) -> &AuthNegotiator {
        &self.auth
    }

    /// Host portion of a server URL, used to key prefix memory.
    #[must_use]
    pub fn host_key(server: &str) -> String {
        Url::parse(server)
            .ok()
            .and_then(|u| u.host_str().map(std::string::ToString::to_string))
            .unwrap_or_else(|| server.to_string())
    }

    /// Whether `server` is the trusted local network cache.
    ///
    /// The local cache never gets prefix renegotiation on 401.
    #[must_use]
    pub fn is_local_cache(server: &str) -> bool {
        Url::parse(server)
            .ok()
            .and_then(|u| u.host_str().map(std::string::ToString::to_string))
            .is_some_and(|host| LOCAL_CACHE_HOSTS.contains(&host.as_str()))
    }

    /// Send a request with the remembered auth prefix, retrying once with
    /// the alternate prefix on 401 against non-local servers.
    async fn execute_with_auth(
        &self,
        server: &str,
        builder: RequestBuilder,
        auth_json: &str,
        operation: &str,
    ) -> Result<Response> {
        let host = Self::host_key(server);
        let mut prefix = self.auth.preferred(&host);

        for attempt in 0..2u8 {
            let request = builder
                .try_clone()
                .ok_or_else(|| Error::Config(format!("unclonable request for {operation}")))?
                .header("Authorization", auth::header_value(prefix, auth_json));

            let response = request
                .send()
                .await
                .map_err(|e| Error::transient(operation, e))?;

            if response.status() == StatusCode::UNAUTHORIZED
                && attempt == 0
                && !Self::is_local_cache(server)
            {
                tracing::debug!(
                    server = %server,
                    rejected = prefix.as_str(),
                    "Auth prefix rejected, retrying with alternate"
                );
                prefix = prefix.alternate();
                continue;
            }

            if response.status().is_success() {
                self.auth.remember(&host, prefix);
            }
            return Ok(response);
        }
        unreachable!("auth retry loop always returns")
    }

    /// Map a non-2xx response to the engine error taxonomy.
    fn status_error(server: &str, operation: &str, response: &Response) -> Error {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            Error::auth_rejected(server)
        } else {
            Error::server(server, status.as_u16(), operation)
        }
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Fetch one listing page. `cursor` is the content hash of the last
    /// item of the previous page.
    pub async fn list_page(
        &self,
        server: &str,
        pubkey: &str,
        limit: usize,
        cursor: Option<&str>,
        auth_json: &str,
    ) -> Result<Vec<BlobDescriptor>> {
        let mut builder = self
            .probe
            .get(format!("{server}/list/{pubkey}"))
            .query(&[("limit", limit.to_string())]);
        if let Some(cursor) = cursor {
            builder = builder.query(&[("cursor", cursor)]);
        }

        let response = self
            .execute_with_auth(server, builder, auth_json, "list")
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(server, "list", &response));
        }

        response
            .json::<Vec<BlobDescriptor>>()
            .await
            .map_err(|e| Error::protocol(server, format!("listing is not a blob array: {e}")))
    }

    // =========================================================================
    // Existence checks
    // =========================================================================

    /// Whether `server` already hosts `hash` (HEAD probe, no auth).
    pub async fn has_blob(&self, server: &str, hash: &str) -> Result<bool> {
        let response = self
            .probe
            .head(format!("{server}/{hash}"))
            .send()
            .await
            .map_err(|e| Error::transient("head", e))?;
        Ok(response.status().is_success())
    }

    /// Raw HEAD status for a URL, for local-cache detection.
    pub async fn head_status(&self, url: &str) -> Result<u16> {
        let response = self
            .probe
            .head(url)
            .send()
            .await
            .map_err(|e| Error::transient("head", e))?;
        Ok(response.status().as_u16())
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    /// Upload raw bytes via `PUT {server}/upload`, falling back to POST
    /// when the server rejects the method.
    pub async fn upload(
        &self,
        server: &str,
        bytes: Vec<u8>,
        mime_type: &str,
        auth_json: &str,
    ) -> Result<UploadResponse> {
        let url = format!("{server}/upload");
        let length = bytes.len();

        let put = self
            .transfer
            .put(&url)
            .header("Content-Type", mime_type)
            .header("Content-Length", length.to_string())
            .body(bytes.clone());
        let response = self.execute_with_auth(server, put, auth_json, "upload").await?;

        let response = if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED
        ) {
            let post = self
                .transfer
                .post(&url)
                .header("Content-Type", mime_type)
                .header("Content-Length", length.to_string())
                .body(bytes);
            self.execute_with_auth(server, post, auth_json, "upload")
                .await?
        } else {
            response
        };

        if !response.status().is_success() {
            return Err(Self::status_error(server, "upload", &response));
        }

        response
            .json::<UploadResponse>()
            .await
            .map_err(|e| Error::protocol(server, format!("upload response: {e}")))
    }

    /// Ask `server` to mirror an already-hosted blob from `source_url`.
    pub async fn mirror(&self, server: &str, source_url: &str, auth_json: &str) -> Result<()> {
        let url = format!("{server}/mirror");
        let body = serde_json::json!({ "url": source_url });

        let put = self.transfer.put(&url).json(&body);
        let response = self.execute_with_auth(server, put, auth_json, "mirror").await?;

        let response = if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED
        ) {
            let post = self.transfer.post(&url).json(&body);
            self.execute_with_auth(server, post, auth_json, "mirror")
                .await?
        } else {
            response
        };

        if !response.status().is_success() {
            return Err(Self::status_error(server, "mirror", &response));
        }
        Ok(())
    }

    /// Delete `hash` from `server`, trying `/{hash}` then `/media/{hash}`.
    pub async fn delete(&self, server: &str, hash: &str, auth_json: &str) -> Result<()> {
        let delete = self.probe.delete(format!("{server}/{hash}"));
        let response = self
            .execute_with_auth(server, delete, auth_json, "delete")
            .await?;

        let response = if response.status() == StatusCode::NOT_FOUND {
            let fallback = self.probe.delete(format!("{server}/media/{hash}"));
            self.execute_with_auth(server, fallback, auth_json, "delete")
                .await?
        } else {
            response
        };

        if !response.status().is_success() {
            return Err(Self::status_error(server, "delete", &response));
        }
        Ok(())
    }

    /// Download blob bytes from a direct URL.
    pub async fn download(&self, url: &str) -> Result<Bytes> {
        let response = self
            .transfer
            .get(url)
            .send()
            .await
            .map_err(|e| Error::transient("download", e))?;

        if !response.status().is_success() {
            return Err(Error::server(url, response.status().as_u16(), "download"));
        }

        response
            .bytes()
            .await
            .map_err(|e| Error::transient("download", e))
    }

    /// Instruct the local cache to pull `hash` from its origin server.
    ///
    /// `GET {local}/{hash}{ext}?xs={scheme}://{host}[:{port}]` is a
    /// proxy-fetch by hash and origin root, not a re-upload.
    pub async fn proxy_fetch(
        &self,
        local_server: &str,
        hash: &str,
        extension: Option<&str>,
        origin_root: &str,
    ) -> Result<()> {
        let ext = extension.map_or_else(String::new, |e| format!(".{e}"));
        let response = self
            .transfer
            .get(format!("{local_server}/{hash}{ext}"))
            .query(&[("xs", origin_root)])
            .send()
            .await
            .map_err(|e| Error::transient("proxy-fetch", e))?;

        if !response.status().is_success() {
            return Err(Error::server(
                local_server,
                response.status().as_u16(),
                "proxy-fetch",
            ));
        }
        Ok(())
    }
}

/// Origin root (`scheme://host[:port]`) of a blob URL, for proxy-fetch.
#[must_use]
pub fn origin_root(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let root = match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    };
    Some(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_key_extracts_host() {
        assert_eq!(
            ServerClient::host_key("https://blossom.example.com/path"),
            "blossom.example.com"
        );
        assert_eq!(ServerClient::host_key("not a url"), "not a url");
    }

    #[test]
    fn local_cache_detection() {
        assert!(ServerClient::is_local_cache("http://127.0.0.1:24242"));
        assert!(ServerClient::is_local_cache("http://10.0.2.2:24242"));
        assert!(!ServerClient::is_local_cache("https://blossom.example.com"));
    }

    #[test]
    fn origin_root_strips_path() {
        assert_eq!(
            origin_root("https://s1.example.com/ab12cd").as_deref(),
            Some("https://s1.example.com")
        );
        assert_eq!(
            origin_root("http://s1.example.com:3000/ab12cd").as_deref(),
            Some("http://s1.example.com:3000")
        );
        assert!(origin_root("not a url").is_none());
    }
}
