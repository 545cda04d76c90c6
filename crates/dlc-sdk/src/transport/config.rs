use std::time::Duration;

/// Default relay URLs.
pub const DEFAULT_RELAYS: &[&str] = &["wss://relay.damus.io", "wss://relay.primal.net"];

/// Configuration for the `NostrTransport`.
#[derive(Debug, Clone)]
pub struct NostrTransportConfig {
    /// Nostr relay URLs to connect to.
    pub relays: Vec<String>,
    /// How long to wait for relays when connecting.
    pub connect_timeout: Duration,
}

impl Default for NostrTransportConfig {
    fn default() -> Self {
        Self {
            relays: DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}
