//! Peer transport seam and the Nostr relay implementation.

pub(crate) mod config;
pub(crate) mod relay;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;

use crate::params::PeerIdx;
use crate::store_trait::ContractBackend;

pub use config::{DEFAULT_RELAYS, NostrTransportConfig};
pub use relay::{NostrTransport, PEER_MESSAGE_KIND, build_inbox_filter, build_peer_event};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unknown peer {0}")]
    UnknownPeer(PeerIdx),

    #[error("peer {0} is disconnected")]
    Disconnected(PeerIdx),

    #[error("transport: {0}")]
    Io(String),
}

/// Delivers encoded peer messages. Inbound bytes are fed to the router by
/// whoever owns the receiving side.
pub trait PeerTransport: Send + Sync + 'static {
    fn send(
        &self,
        peer: PeerIdx,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Durable record of which transport address each peer index stands for.
///
/// Contracts keep their `PeerIdx` across restarts, so the assignment must
/// survive too.
pub trait PeerDirectory: Send + Sync + 'static {
    fn load_peers(&self) -> Result<Vec<(PeerIdx, Vec<u8>)>, String>;

    fn save_peer(&self, idx: PeerIdx, address: &[u8]) -> Result<(), String>;
}

impl<B: ContractBackend> PeerDirectory for Mutex<B> {
    fn load_peers(&self) -> Result<Vec<(PeerIdx, Vec<u8>)>, String> {
        self.lock()
            .map_err(|_| "backend mutex poisoned".to_string())?
            .list_peers()
    }

    fn save_peer(&self, idx: PeerIdx, address: &[u8]) -> Result<(), String> {
        self.lock()
            .map_err(|_| "backend mutex poisoned".to_string())?
            .insert_peer(idx, address)
    }
}

/// Bidirectional map between transport addresses and peer indices.
///
/// Indices start at 1 and are never reused.
#[derive(Debug)]
pub struct PeerBook<K> {
    keys: BTreeMap<PeerIdx, K>,
    index: HashMap<K, PeerIdx>,
    last: u32,
}

impl<K> Default for PeerBook<K> {
    fn default() -> Self {
        Self {
            keys: BTreeMap::new(),
            index: HashMap::new(),
            last: 0,
        }
    }
}

impl<K: Eq + Hash + Clone> PeerBook<K> {
    /// Index for `key`, assigning a fresh one on first contact.
    pub fn connect(&mut self, key: K) -> PeerIdx {
        match self.connect_with(key, |_, _| Ok::<(), ()>(())) {
            Ok(idx) | Err((idx, ())) => idx,
        }
    }

    /// `connect`, but a fresh index is only assigned once `persist` has
    /// recorded it. On failure the book is unchanged and the would-be index
    /// is returned with the error.
    pub fn connect_with<E>(
        &mut self,
        key: K,
        persist: impl FnOnce(PeerIdx, &K) -> Result<(), E>,
    ) -> Result<PeerIdx, (PeerIdx, E)> {
        if let Some(idx) = self.index.get(&key) {
            return Ok(*idx);
        }
        let idx = PeerIdx(self.last + 1);
        persist(idx, &key).map_err(|e| (idx, e))?;
        self.insert(idx, key);
        Ok(idx)
    }

    /// Put back an assignment loaded from storage.
    pub fn restore(&mut self, idx: PeerIdx, key: K) {
        self.insert(idx, key);
    }

    fn insert(&mut self, idx: PeerIdx, key: K) {
        self.last = self.last.max(idx.0);
        self.keys.insert(idx, key.clone());
        self.index.insert(key, idx);
    }

    pub fn key(&self, idx: PeerIdx) -> Option<&K> {
        self.keys.get(&idx)
    }

    pub fn idx(&self, key: &K) -> Option<PeerIdx> {
        self.index.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
