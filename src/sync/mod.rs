//! Background synchronizers keeping storage tiers consistent with the
//! registry.
//!
//! The vault and local-cache synchronizers are independent, idempotent,
//! and bounded to a small fixed transfer concurrency. Both re-derive
//! their "already done" sets from durable storage on every run, so a
//! restart neither re-downloads needlessly nor skips newly-added hashes.

pub mod local_cache;
pub mod upload;
pub mod vault;

/// Outcome of one synchronizer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Items that were transferred or confirmed this run.
    pub completed: usize,
    /// Items that failed; failures never abort the batch.
    pub failed: usize,
    /// Items that needed syncing at the start of the run.
    pub total: usize,
}

impl SyncReport {
    /// Human-readable `completed/total` summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{}/{} completed, {} failed",
            self.completed, self.total, self.failed
        )
    }
}
