//! Authorization header negotiation.
//!
//! Blob servers accept a signed authorization event in an HTTP header of
//! the form `<Prefix> <base64(event JSON)>`, but two prefix conventions
//! (`Nostr` and `Blossom`) are in circulation and servers honor one or the
//! other inconsistently. The negotiator tries the event's natural prefix
//! first and, after a 401 from a non-local server, retries once with the
//! alternate; the accepted prefix is remembered per host for the rest of
//! the session so later requests skip renegotiation.

pub mod event;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use dashmap::DashMap;

/// Header-prefix convention for signed authorization events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPrefix {
    /// The event's natural prefix; tried first.
    Nostr,
    /// Historical alternative some servers insist on.
    Blossom,
}

impl AuthPrefix {
    /// Header prefix string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nostr => "Nostr",
            Self::Blossom => "Blossom",
        }
    }

    /// The other convention.
    #[must_use]
    pub const fn alternate(self) -> Self {
        match self {
            Self::Nostr => Self::Blossom,
            Self::Blossom => Self::Nostr,
        }
    }
}

impl std::str::FromStr for AuthPrefix {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Nostr" => Ok(Self::Nostr),
            "Blossom" => Ok(Self::Blossom),
            _ => Err(()),
        }
    }
}

/// Per-host memory of which auth prefix a server accepted.
///
/// Thread-safe and cheap to clone; shared by every client of a session.
#[derive(Debug, Default)]
pub struct AuthNegotiator {
    accepted: DashMap<String, AuthPrefix>,
}

impl AuthNegotiator {
    /// Create an empty negotiator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a negotiator seeded with persisted `(host, prefix)` pairs.
    ///
    /// Seeded entries are advisory; a 401 always re-triggers negotiation.
    #[must_use]
    pub fn with_known(known: impl IntoIterator<Item = (String, AuthPrefix)>) -> Self {
        let negotiator = Self::new();
        for (host, prefix) in known {
            negotiator.accepted.insert(host, prefix);
        }
        negotiator
    }

    /// The prefix to try first for `host`.
    #[must_use]
    pub fn preferred(&self, host: &str) -> AuthPrefix {
        self.accepted
            .get(host)
            .map_or(AuthPrefix::Nostr, |entry| *entry.value())
    }

    /// Record that `host` accepted `prefix`.
    pub fn remember(&self, host: &str, prefix: AuthPrefix) {
        self.accepted.insert(host.to_string(), prefix);
    }

    /// Snapshot of all remembered `(host, prefix)` pairs, for persistence.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, AuthPrefix)> {
        self.accepted
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

/// Build the header value `<Prefix> <base64(trimmed json)>`.
///
/// The base64 payload is computed over the trimmed UTF-8 bytes of the
/// signed event JSON; some server implementations reject untrimmed input.
#[must_use]
pub fn header_value(prefix: AuthPrefix, signed_event_json: &str) -> String {
    let trimmed = signed_event_json.trim();
    format!("{} {}", prefix.as_str(), BASE64.encode(trimmed.as_bytes()))
}
