use std::sync::{Arc, Mutex};

use nostr_sdk::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::config::NostrTransportConfig;
use super::{PeerBook, PeerDirectory, PeerTransport, TransportError};
use crate::params::PeerIdx;

/// Nostr event kind for direct peer messages.
pub const PEER_MESSAGE_KIND: Kind = Kind::Custom(8078);

/// Build a signed event carrying `bytes` to `recipient`.
///
/// The recipient is addressed by a hashtag with its hex public key. The
/// content is not encrypted.
pub fn build_peer_event(keys: &Keys, recipient: &PublicKey, bytes: &[u8]) -> Result<Event, String> {
    let content =
        std::str::from_utf8(bytes).map_err(|e| format!("peer message is not utf-8: {e}"))?;
    EventBuilder::new(PEER_MESSAGE_KIND, content)
        .tags(vec![Tag::hashtag(recipient.to_hex())])
        .sign_with_keys(keys)
        .map_err(|e| format!("failed to build event: {e}"))
}

/// Filter for peer messages addressed to `own`.
pub fn build_inbox_filter(own: &PublicKey) -> Filter {
    Filter::new().kind(PEER_MESSAGE_KIND).hashtag(own.to_hex())
}

/// Peer transport over Nostr relays.
///
/// Peers are identified by their Nostr public key. The relay pool checks
/// event signatures, so the sender key of an inbound message is
/// authenticated.
pub struct NostrTransport {
    client: Client,
    keys: Keys,
    config: NostrTransportConfig,
    peers: Arc<Mutex<PeerBook<PublicKey>>>,
    directory: Option<Arc<dyn PeerDirectory>>,
}

impl NostrTransport {
    /// A transport whose peer indices last only as long as the process.
    pub fn new(keys: Keys, config: NostrTransportConfig) -> Self {
        Self {
            client: Client::new(keys.clone()),
            keys,
            config,
            peers: Arc::new(Mutex::new(PeerBook::default())),
            directory: None,
        }
    }

    /// A transport that restores its peer indices from `directory` and
    /// records every new one there.
    pub fn with_directory(
        keys: Keys,
        config: NostrTransportConfig,
        directory: Arc<dyn PeerDirectory>,
    ) -> Result<Self, TransportError> {
        let mut book = PeerBook::default();
        for (idx, address) in directory.load_peers().map_err(TransportError::Io)? {
            let key = PublicKey::from_slice(&address)
                .map_err(|e| TransportError::Io(format!("stored key for peer {idx}: {e}")))?;
            book.restore(idx, key);
        }
        log::debug!("restored {} peer(s)", book.len());

        Ok(Self {
            client: Client::new(keys.clone()),
            keys,
            config,
            peers: Arc::new(Mutex::new(book)),
            directory: Some(directory),
        })
    }

    pub fn public_key(&self) -> PublicKey {
        self.keys.public_key()
    }

    /// Register a counterparty and return its peer index.
    pub fn connect_peer(&self, public_key: PublicKey) -> Result<PeerIdx, TransportError> {
        let idx = register_peer(&self.peers, self.directory.as_deref(), public_key)?;
        log::info!("peer {idx} is {}", public_key.to_hex());
        Ok(idx)
    }

    pub fn peer_public_key(&self, peer: PeerIdx) -> Option<PublicKey> {
        self.peers
            .lock()
            .ok()
            .and_then(|book| book.key(peer).cloned())
    }

    /// Connect to the configured relays and start the inbox loop.
    ///
    /// Returns the loop's handle and the receiver of `(peer, bytes)` pairs,
    /// ready to be fed into the message router.
    pub async fn start(
        &self,
        capacity: usize,
    ) -> Result<(JoinHandle<()>, mpsc::Receiver<(PeerIdx, Vec<u8>)>), TransportError> {
        self.ensure_connected().await?;

        let (tx, rx) = mpsc::channel(capacity);
        let client = self.client.clone();
        let own = self.public_key();
        let peers = self.peers.clone();
        let directory = self.directory.clone();

        let handle = tokio::spawn(async move {
            run_inbox_loop(client, own, peers, directory, tx).await;
        });

        Ok((handle, rx))
    }

    async fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.client.relays().await.is_empty() {
            for url in &self.config.relays {
                self.client
                    .add_relay(url.as_str())
                    .await
                    .map_err(|e| TransportError::Io(format!("failed to add relay {url}: {e}")))?;
            }
            self.client
                .connect_with_timeout(self.config.connect_timeout)
                .await;
        }
        Ok(())
    }
}

impl PeerTransport for NostrTransport {
    async fn send(&self, peer: PeerIdx, bytes: Vec<u8>) -> Result<(), TransportError> {
        let recipient = self
            .peer_public_key(peer)
            .ok_or(TransportError::UnknownPeer(peer))?;
        self.ensure_connected().await?;

        let event = build_peer_event(&self.keys, &recipient, &bytes).map_err(TransportError::Io)?;
        let output = self
            .client
            .send_event(event)
            .await
            .map_err(|e| TransportError::Io(format!("failed to publish: {e}")))?;
        if output.success.is_empty() {
            return Err(TransportError::Disconnected(peer));
        }
        log::debug!("sent {} bytes to peer {peer} as {}", bytes.len(), output.id());
        Ok(())
    }
}

/// Index for `key`, recording a first contact in `directory` before the
/// index is handed out.
fn register_peer(
    peers: &Mutex<PeerBook<PublicKey>>,
    directory: Option<&dyn PeerDirectory>,
    key: PublicKey,
) -> Result<PeerIdx, TransportError> {
    let mut book = peers
        .lock()
        .map_err(|_| TransportError::Io("peer book mutex poisoned".into()))?;
    book.connect_with(key, |idx, key| match directory {
        Some(directory) => directory.save_peer(idx, &key.to_bytes()),
        None => Ok(()),
    })
    .map_err(|(idx, e)| TransportError::Io(format!("failed to record peer {idx}: {e}")))
}

async fn run_inbox_loop(
    client: Client,
    own: PublicKey,
    peers: Arc<Mutex<PeerBook<PublicKey>>>,
    directory: Option<Arc<dyn PeerDirectory>>,
    tx: mpsc::Sender<(PeerIdx, Vec<u8>)>,
) {
    // Set up the notification receiver BEFORE subscribing so we don't miss events
    let mut notifications = client.notifications();

    if let Err(e) = client.subscribe(vec![build_inbox_filter(&own)], None).await {
        log::error!("failed to subscribe to inbox: {e}");
        return;
    }

    while let Ok(notification) = notifications.recv().await {
        let RelayPoolNotification::Event { event, .. } = notification else {
            continue;
        };
        if event.kind != PEER_MESSAGE_KIND || event.pubkey == own {
            continue;
        }

        // Unrecorded senders are skipped; the relay replays the event on
        // the next subscription.
        let peer = match register_peer(&peers, directory.as_deref(), event.pubkey) {
            Ok(peer) => peer,
            Err(e) => {
                log::error!("dropping event {} from {}: {e}", event.id, event.pubkey);
                continue;
            }
        };
        log::debug!("received event {} from peer {peer}", event.id);

        if tx.send((peer, event.content.as_bytes().to_vec())).await.is_err() {
            log::info!("inbound receiver dropped; stopping inbox loop");
            return;
        }
    }
}
