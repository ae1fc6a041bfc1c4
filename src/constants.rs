//! Shared constants for network, pagination, and sync behavior.

use std::time::Duration;

/// Page size requested from `/list/{pubkey}`.
pub const LIST_PAGE_LIMIT: usize = 256;

/// A page with at least this many items is treated as full, meaning more
/// pages may follow. Some servers cap responses slightly below the
/// requested limit, so this sits under `LIST_PAGE_LIMIT`.
pub const FULL_PAGE_THRESHOLD: usize = 250;

/// Hard ceiling on pages fetched from a single server per listing.
pub const MAX_LIST_PAGES: usize = 100;

/// Retries per page fetch on transport-level errors.
pub const LIST_PAGE_RETRIES: usize = 2;

/// Fixed backoff between page-fetch retries.
pub const LIST_RETRY_DELAY: Duration = Duration::from_millis(400);

/// HTTP connect timeout for all requests.
pub const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Total request timeout for listing and existence probes.
pub const HTTP_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Total request timeout for body transfers (upload, download, mirror).
pub const HTTP_TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum simultaneous vault / local-cache transfers.
pub const SYNC_CONCURRENCY: usize = 2;

/// Maximum simultaneous per-item tasks in bulk operations.
pub const BULK_CONCURRENCY: usize = 4;

/// Port the local network cache listens on.
pub const LOCAL_CACHE_PORT: u16 = 24242;

/// Hosts probed for a local network cache. `10.0.2.2` reaches the host
/// loopback from emulated environments.
pub const LOCAL_CACHE_HOSTS: [&str; 2] = ["127.0.0.1", "10.0.2.2"];

/// Seconds until a signed authorization event expires.
pub const AUTH_EVENT_TTL_SECS: i64 = 600;

/// Grace window within which a local tag edit beats a newer relay edit.
pub const LABEL_GRACE_WINDOW_SECS: u64 = 300;
