//! blobsync CLI entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use blobsync::commands;
use blobsync::config::{self, Config};
use blobsync::engine::ReconcileEngine;
use blobsync::registry::MediaKind;
use blobsync::registry::views::MediaTier;
use blobsync::relay::{NullRelay, Relay};
use blobsync::signer::{CommandSigner, Signer, UnavailableSigner};

#[derive(Parser)]
#[command(name = "blobsync", version, about = "Reconcile blobs across Blossom media servers")]
struct Cli {
    /// Config file path (defaults to ~/.blobsync/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh the registry from every configured server.
    Refresh,
    /// Show registry, vault, and cache statistics.
    Status,
    /// List a tier view of the registry.
    List {
        /// Show only blobs on this server.
        #[arg(long, conflicts_with_all = ["trash", "local"])]
        server: Option<String>,
        /// Show the trash.
        #[arg(long, conflicts_with = "local")]
        trash: bool,
        /// Show only locally cached blobs.
        #[arg(long)]
        local: bool,
        /// Show only images.
        #[arg(long, conflicts_with = "videos")]
        images: bool,
        /// Show only videos.
        #[arg(long)]
        videos: bool,
    },
    /// Upload files and mirror them to every configured server.
    Upload {
        /// Files to upload.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete hashes from every server hosting them.
    Rm {
        /// Content hashes to delete.
        #[arg(required = true)]
        hashes: Vec<String>,
    },
    /// Attach a label to one or more hashes.
    Label {
        /// Label key (e.g. alt, name).
        key: String,
        /// Label value.
        value: String,
        /// Content hashes to label.
        #[arg(required = true)]
        hashes: Vec<String>,
    },
    /// Synchronize the vault and local network cache with the registry.
    Sync {
        /// Sync only the vault.
        #[arg(long)]
        vault: bool,
        /// Sync only the local network cache.
        #[arg(long)]
        local_cache: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let validation = config.validate()?;
    for warning in &validation.warnings {
        eprintln!("warning: {warning}");
    }

    let signer: Arc<dyn Signer> = match &config.signer_command {
        Some(command) => Arc::new(CommandSigner::new(command.clone())),
        None => Arc::new(UnavailableSigner),
    };
    let relay: Arc<dyn Relay> = Arc::new(NullRelay);

    let db_path = config::state_db_path()?;
    let engine = ReconcileEngine::open(&config, &db_path, signer, relay)
        .context("Failed to open reconciliation engine")?;

    match cli.command {
        Command::Refresh => commands::refresh::execute(&engine).await,
        Command::Status => commands::status::execute(&engine, &config),
        Command::List {
            server,
            trash,
            local,
            images,
            videos,
        } => {
            let tier = if trash {
                MediaTier::Trash
            } else if local {
                MediaTier::LocalCache
            } else if let Some(server) = server {
                MediaTier::Server(config::normalized_server_url(&server))
            } else {
                MediaTier::All
            };
            let kind = if images {
                Some(MediaKind::Image)
            } else if videos {
                Some(MediaKind::Video)
            } else {
                None
            };
            commands::list::execute(&engine, &tier, kind)
        },
        Command::Upload { files } => commands::upload::execute(&engine, &files).await,
        Command::Rm { hashes } => commands::remove::execute(&engine, &hashes).await,
        Command::Label { key, value, hashes } => {
            commands::label::execute(&engine, &hashes, &key, &value).await
        },
        Command::Sync { vault, local_cache } => {
            commands::sync_cmd::execute(&engine, vault, local_cache).await
        },
    }
}
