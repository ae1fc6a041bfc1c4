//! Configuration types for blobsync.
//!
//! Settings load from a TOML file (`~/.blobsync/config.toml` by default)
//! and describe the user's identity, the configured blob servers, relay
//! endpoints, and local storage locations. All types support serde
//! deserialization and provide defaults suitable for first runs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Root configuration structure (config.toml).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Identity whose blobs are reconciled (hex public key).
    pub pubkey: String,
    /// Blob servers, in failover order. The first entry is the primary
    /// upload target.
    #[serde(default)]
    pub servers: Vec<String>,
    /// Relay endpoints handed to the relay collaborator.
    #[serde(default)]
    pub relays: Vec<String>,
    /// External signer command. Receives the unsigned event JSON on stdin
    /// and prints the signed event JSON; empty output means the signer
    /// needs interactive confirmation.
    #[serde(default)]
    pub signer_command: Option<String>,
    /// Probe for a local network cache on startup.
    #[serde(default = "default_true")]
    pub local_cache: bool,
    /// Override for the vault directory.
    #[serde(default)]
    pub vault_dir: Option<PathBuf>,
    /// Existing decode/disk cache to copy vault bytes from before
    /// falling back to a network download.
    #[serde(default)]
    pub decode_cache_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path()?)
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Required fields are missing or have invalid types
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration with comprehensive checks.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails:
    /// - Empty or non-hex pubkey
    /// - Malformed or non-HTTP server URLs
    /// - Duplicate server entries
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.pubkey.is_empty() {
            errors.push("pubkey cannot be empty".to_string());
        } else if self.pubkey.len() != 64 || !self.pubkey.chars().all(|c| c.is_ascii_hexdigit()) {
            errors.push(format!(
                "pubkey must be 64 hex characters (got {} chars)",
                self.pubkey.len()
            ));
        }

        if self.servers.is_empty() {
            warnings.push("no servers configured; refresh and upload will be no-ops".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for server in &self.servers {
            match Url::parse(server) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {},
                Ok(url) => errors.push(format!(
                    "server '{server}' has unsupported scheme '{}'",
                    url.scheme()
                )),
                Err(e) => errors.push(format!("server '{server}' is not a valid URL: {e}")),
            }
            if !seen.insert(normalized_server_url(server)) {
                errors.push(format!("server '{server}' is listed more than once"));
            }
            if server.ends_with('/') {
                warnings.push(format!(
                    "server '{server}' has a trailing slash; it will be trimmed"
                ));
            }
        }

        if self.relays.is_empty() && self.signer_command.is_some() {
            warnings.push("signer configured but no relays; metadata events will not publish".to_string());
        }

        if errors.is_empty() {
            Ok(ValidationResult { warnings })
        } else {
            anyhow::bail!("Configuration validation failed:\n  {}", errors.join("\n  "))
        }
    }

    /// Servers with trailing slashes trimmed, preserving order.
    #[must_use]
    pub fn normalized_servers(&self) -> Vec<String> {
        self.servers
            .iter()
            .map(|s| normalized_server_url(s))
            .collect()
    }

    /// Vault directory, honoring the override.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be resolved.
    pub fn vault_dir(&self) -> Result<PathBuf> {
        match &self.vault_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(base_dir()?.join("vault")),
        }
    }
}

/// Trim trailing slashes so `(hash, server)` keys are stable.
#[must_use]
pub fn normalized_server_url(server: &str) -> String {
    server.trim_end_matches('/').to_string()
}

// =============================================================================
// Base Directories
// =============================================================================

/// Get the blobsync base directory.
///
/// Resolution order:
/// 1. `BLOBSYNC_HOME` environment variable (if set)
/// 2. `~/.blobsync/` (default)
pub fn base_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("BLOBSYNC_HOME")
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }

    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".blobsync"))
}

/// Get the config file path: `~/.blobsync/config.toml`
pub fn config_path() -> Result<PathBuf> {
    Ok(base_dir()?.join("config.toml"))
}

/// Get the state database path: `~/.blobsync/state.redb`
pub fn state_db_path() -> Result<PathBuf> {
    Ok(base_dir()?.join("state.redb"))
}
