//! CLI command implementations for blobsync.
//!
//! Each submodule implements a specific command:
//!
//! - [`refresh`] - Full registry refresh across all configured servers
//! - [`list`] - Tier views (all media, per-server, trash, local cache)
//! - [`status`] - Registry, vault, and cache statistics
//! - [`upload`] - Hash, upload, mirror, and publish files
//! - [`remove`] - Delete hashes from all hosting servers
//! - [`label`] - Attach user-authored labels to hashes
//! - [`sync_cmd`] - Vault and local-cache synchronization

pub mod label;
pub mod list;
pub mod refresh;
pub mod remove;
pub mod status;
pub mod sync_cmd;
pub mod upload;
