//! External signer capability.
//!
//! Signing stays outside this crate: the engine hands an unsigned event to
//! a [`Signer`] and gets back signed JSON, or `None` when the signer needs
//! interactive confirmation it cannot give right now.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Signing capability for authorization and metadata events.
///
/// Implementations must be thread-safe (`Send + Sync`) for use with tokio.
#[async_trait]
pub trait Signer: Send + Sync + 'static {
    /// Sign `unsigned_event_json` on behalf of `identity` (hex pubkey).
    ///
    /// Returns `Ok(None)` when signing requires interactive confirmation
    /// that is not currently possible.
    ///
    /// # Errors
    ///
    /// Returns an error if the signer itself fails (as opposed to
    /// declining).
    async fn sign(&self, unsigned_event_json: &str, identity: &str) -> Result<Option<String>>;
}

/// Signer backed by an external command.
///
/// The command receives the unsigned event JSON on stdin and prints the
/// signed event JSON on stdout. An empty stdout means "needs interactive
/// confirmation". The identity is passed in the `BLOBSYNC_IDENTITY`
/// environment variable.
pub struct CommandSigner {
    command: String,
}

impl CommandSigner {
    /// Create a signer invoking `command` through the shell.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Signer for CommandSigner {
    async fn sign(&self, unsigned_event_json: &str, identity: &str) -> Result<Option<String>> {
        let mut child = Command::new("sh")
            .args(["-c", &self.command])
            .env("BLOBSYNC_IDENTITY", identity)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn signer command: {}", self.command))?;

        let mut stdin = child.stdin.take().context("Signer stdin unavailable")?;
        stdin
            .write_all(unsigned_event_json.as_bytes())
            .await
            .context("Failed to write event to signer")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for signer command")?;

        if !output.status.success() {
            anyhow::bail!("Signer command exited with status: {}", output.status);
        }

        let signed = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!signed.is_empty()).then_some(signed))
    }
}

/// Signer that always declines, for unattended contexts with no signer
/// configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSigner;

#[async_trait]
impl Signer for UnavailableSigner {
    async fn sign(&self, _unsigned_event_json: &str, _identity: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Signer that "signs" by echoing the unsigned event back, for tests.
///
/// Real signatures are the signer collaborator's concern; the engine only
/// forwards opaque JSON, so tests can treat the unsigned event as signed.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoSigner;

#[async_trait]
impl Signer for EchoSigner {
    async fn sign(&self, unsigned_event_json: &str, _identity: &str) -> Result<Option<String>> {
        Ok(Some(unsigned_event_json.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_signer_returns_input() {
        let signer = EchoSigner;
        let signed = signer.sign("{\"kind\":24242}", "aa").await.unwrap();
        assert_eq!(signed.as_deref(), Some("{\"kind\":24242}"));
    }

    #[tokio::test]
    async fn unavailable_signer_declines() {
        let signer = UnavailableSigner;
        assert!(signer.sign("{}", "aa").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn command_signer_pipes_through() {
        let signer = CommandSigner::new("cat");
        let signed = signer.sign("{\"kind\":1}", "aa").await.unwrap();
        assert_eq!(signed.as_deref(), Some("{\"kind\":1}"));
    }

    #[tokio::test]
    async fn command_signer_empty_output_is_decline() {
        let signer = CommandSigner::new("true");
        assert!(signer.sign("{}", "aa").await.unwrap().is_none());
    }
}
