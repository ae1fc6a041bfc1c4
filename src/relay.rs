//! Relay capability for event publishing and metadata queries.
//!
//! Relay transport stays outside this crate; the engine only needs two
//! operations: publish a signed event and query events by filter.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Relay capability.
///
/// Implementations must be thread-safe (`Send + Sync`) for use with tokio.
#[async_trait]
pub trait Relay: Send + Sync + 'static {
    /// Publish a signed event. Returns whether any relay accepted it.
    ///
    /// # Errors
    ///
    /// Returns an error only on transport setup failure; per-relay
    /// rejections surface as `Ok(false)`.
    async fn publish(&self, signed_event_json: &str) -> Result<bool>;

    /// Query events matching `filter_json`, returned as raw event JSON.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    async fn query(&self, filter_json: &str) -> Result<Vec<String>>;
}

/// Relay that drops publishes and answers queries with nothing.
///
/// Used when no relay bridge is configured; metadata events are then
/// best-effort by design and simply not published.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRelay;

#[async_trait]
impl Relay for NullRelay {
    async fn publish(&self, _signed_event_json: &str) -> Result<bool> {
        tracing::debug!("No relay configured, dropping event");
        Ok(false)
    }

    async fn query(&self, _filter_json: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// In-memory relay that records published events, for tests.
#[derive(Debug, Default)]
pub struct MemoryRelay {
    published: Mutex<Vec<String>>,
    canned: Mutex<Vec<String>>,
}

impl MemoryRelay {
    /// Create an empty in-memory relay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events published so far.
    #[must_use]
    pub fn published(&self) -> Vec<String> {
        self.published.lock().clone()
    }

    /// Seed events returned by the next queries.
    pub fn seed(&self, events: impl IntoIterator<Item = String>) {
        self.canned.lock().extend(events);
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn publish(&self, signed_event_json: &str) -> Result<bool> {
        self.published.lock().push(signed_event_json.to_string());
        Ok(true)
    }

    async fn query(&self, _filter_json: &str) -> Result<Vec<String>> {
        Ok(self.canned.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_relay_records_publishes() {
        let relay = MemoryRelay::new();
        assert!(relay.publish("{\"kind\":1063}").await.unwrap());
        assert_eq!(relay.published(), vec!["{\"kind\":1063}".to_string()]);
    }

    #[tokio::test]
    async fn null_relay_drops() {
        let relay = NullRelay;
        assert!(!relay.publish("{}").await.unwrap());
        assert!(relay.query("{}").await.unwrap().is_empty());
    }
}
