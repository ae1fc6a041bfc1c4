//! blobsync: content-addressed multi-server blob reconciliation.
//!
//! The engine discovers which blobs an identity owns across any number of
//! independently operated Blossom-style servers, merges the per-server
//! listings into one deduplicated registry keyed by SHA-256, and keeps
//! three storage tiers consistent with it: the remote servers, an
//! optional local network cache, and the on-device vault/trash.
//!
//! # Architecture
//!
//! - [`content`] canonicalizes bytes and computes the content hash.
//! - [`auth`] negotiates the server authorization header.
//! - [`client`] talks to blob servers, including paginated listings.
//! - [`registry`] holds the data model, the reconciliation merge, the
//!   derived tier views, and redb persistence.
//! - [`metadata`] is the durable label store with commutative merges.
//! - [`sync`] contains the vault and local-cache synchronizers and the
//!   upload coordinator.
//! - [`engine`] ties everything together behind a snapshot/subscribe
//!   interface; the CLI in `main.rs` is a thin adapter over it.
//!
//! Signing and relay transport stay outside the crate as the [`signer`]
//! and [`relay`] capabilities.

#![deny(unsafe_code)]

pub mod auth;
pub mod client;
pub mod commands;
pub mod config;
pub mod constants;
pub mod content;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod registry;
pub mod relay;
pub mod reliability;
pub mod signer;
pub mod sync;
pub mod utils;

pub use engine::{BatchReport, ReconcileEngine, RefreshReport, Snapshot};
pub use error::{Error, Result};
pub use registry::{Blob, BlobTag};
