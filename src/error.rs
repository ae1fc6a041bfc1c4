//! Typed errors for the reconciliation engine.
//!
//! Every network-facing component reports failures through [`Error`] so the
//! merge layer can tell transient faults apart from confirmed server state,
//! which is what keeps a flaky server from trashing data.

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Timeout, connection reset, or other transport-level fault. Retryable.
    #[error("transient network error during {operation}: {reason}")]
    TransientNetwork { operation: String, reason: String },

    /// HTTP 401 after the alternate auth prefix was also rejected.
    #[error("authorization rejected by {server}")]
    AuthRejected { server: String },

    /// Non-401, non-2xx response. Treated as "server has no data for this
    /// operation", never as confirmation that a blob is gone.
    #[error("server {server} returned {status}: {reason}")]
    ServerError {
        server: String,
        status: u16,
        reason: String,
    },

    /// Locally computed hash disagrees with the server-reported hash.
    #[error("hash mismatch: expected {expected}, server reported {actual}")]
    DataIntegrity { expected: String, actual: String },

    /// Response body had an unexpected shape.
    #[error("unexpected response from {server}: {detail}")]
    ProtocolMismatch { server: String, detail: String },

    /// The signer declined to sign without interaction.
    #[error("signer requires interactive confirmation")]
    SignatureUnavailable,

    /// Signer invocation failed outright.
    #[error("signer error: {0}")]
    Signer(String),

    /// Relay transport failed.
    #[error("relay error: {0}")]
    Relay(String),

    /// A newer refresh superseded this one before it could commit.
    #[error("refresh superseded by a newer cycle")]
    Superseded,

    /// Persistent store failure.
    #[error("store error in {context}: {reason}")]
    Store { context: String, reason: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a transient network error.
    pub fn transient(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::TransientNetwork {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an auth-rejected error.
    pub fn auth_rejected(server: impl Into<String>) -> Self {
        Self::AuthRejected {
            server: server.into(),
        }
    }

    /// Create a server error from a response status.
    pub fn server(server: impl Into<String>, status: u16, reason: impl Into<String>) -> Self {
        Self::ServerError {
            server: server.into(),
            status,
            reason: reason.into(),
        }
    }

    /// Create a protocol-mismatch error.
    pub fn protocol(server: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ProtocolMismatch {
            server: server.into(),
            detail: detail.into(),
        }
    }

    /// Create a store error.
    pub fn store(context: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Store {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether retrying the same operation may succeed.
    ///
    /// Only transport-level faults and 5xx/408/429 responses qualify; auth
    /// rejections and integrity failures never do.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientNetwork { .. } => true,
            Self::ServerError { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

/// Check if an HTTP status code is worth retrying.
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let operation = err
            .url()
            .map_or_else(|| "request".to_string(), |u| u.to_string());
        Self::TransientNetwork {
            operation,
            reason: err.to_string(),
        }
    }
}
