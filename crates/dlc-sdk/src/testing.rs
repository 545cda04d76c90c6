//! Test doubles for the node's collaborators, plus the tutorial fixtures.
//!
//! Everything here is deterministic: the clock is set by hand, the wallet
//! derives txids from the contract fingerprint, and the loopback network
//! delivers into in-process channels.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use nostr_sdk::secp256k1::{PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::contract::Contract;
use crate::division::{DivisionTable, PayoutSplit};
use crate::oracle::sign_numeric_attestation;
use crate::params::{ContractIdx, Funding, PeerIdx, Point, hex_to_array};
use crate::transport::{PeerTransport, TransportError};
use crate::wallet::Wallet;

// ---------------------------------------------------------------------------
// Tutorial fixtures
// ---------------------------------------------------------------------------

pub const TUTORIAL_ORACLE_PUBKEY: &str =
    "03c0d496ef6656fe102a689abc162ceeae166832d826f8750c94d797c92eedd465";
pub const TUTORIAL_R_POINT: &str =
    "027168bba1aaecce0500509df2ff5e35a4f55a26a8af7ceacd346045eceb1786ad";
pub const TUTORIAL_SIGNATURE: &str =
    "9e349c50db6d07d5d8b12b7ada7f91d13af742653ff57ffb0b554170536faeac";
pub const TUTORIAL_VALUE: u64 = 15_161;
pub const TUTORIAL_SETTLEMENT_TIME: u64 = 1_528_848_000;
pub const TUTORIAL_COIN_TYPE: u32 = 257;
pub const ONE_BTC: u64 = 100_000_000;

pub fn tutorial_oracle_pubkey() -> Point {
    hex_to_array(TUTORIAL_ORACLE_PUBKEY, "oracle pubkey").expect("valid constant")
}

pub fn tutorial_r_point() -> Point {
    hex_to_array(TUTORIAL_R_POINT, "r_point").expect("valid constant")
}

pub fn tutorial_signature() -> [u8; 32] {
    hex_to_array(TUTORIAL_SIGNATURE, "signature").expect("valid constant")
}

/// One BTC from each side.
pub fn tutorial_funding() -> Funding {
    Funding::new(ONE_BTC, ONE_BTC).expect("valid constant")
}

/// Everything to us at 20000, everything to them at 10000.
pub fn tutorial_division() -> DivisionTable {
    DivisionTable::linear(20_000, 10_000, 2 * ONE_BTC).expect("valid constant")
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// An oracle whose secrets we know, for producing fresh attestations.
pub struct TestOracle {
    secret: SecretKey,
}

impl TestOracle {
    pub fn new(seed: u8) -> Self {
        Self {
            secret: SecretKey::from_slice(&[seed.max(1); 32]).expect("valid secret"),
        }
    }

    pub fn public_key(&self) -> Point {
        PublicKey::from_secret_key(&Secp256k1::new(), &self.secret).serialize()
    }

    /// A one-time nonce and its public R point.
    pub fn nonce(&self, seed: u8) -> (SecretKey, Point) {
        let nonce = SecretKey::from_slice(&[seed.max(1).wrapping_add(0x40); 32])
            .expect("valid nonce");
        let r_point = PublicKey::from_secret_key(&Secp256k1::new(), &nonce).serialize();
        (nonce, r_point)
    }

    pub fn attest(&self, nonce: &SecretKey, value: u64) -> [u8; 32] {
        sign_numeric_attestation(&self.secret, nonce, value).expect("attestation")
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicU64,
}

impl FixedClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// Wallet double that records what it was asked to do.
///
/// The funding txid is SHA256 of the contract fingerprint, so both nodes
/// of a test agree on it without talking to each other.
#[derive(Debug, Default)]
pub struct MockWallet {
    pub locked: Mutex<Vec<(ContractIdx, u64)>>,
    pub settlements: Mutex<Vec<(ContractIdx, PayoutSplit)>>,
    fail_lock: AtomicBool,
    fail_build: AtomicBool,
}

impl MockWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_lock_funds(&self, fail: bool) {
        self.fail_lock.store(fail, Ordering::SeqCst);
    }

    pub fn fail_build_settlement(&self, fail: bool) {
        self.fail_build.store(fail, Ordering::SeqCst);
    }

    pub fn locked_count(&self) -> usize {
        self.locked.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn settlement_count(&self) -> usize {
        self.settlements.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn funding_txid(contract: &Contract) -> [u8; 32] {
        let mut hasher = Sha256::new();
        if let Some(fingerprint) = &contract.fingerprint {
            hasher.update(fingerprint.as_bytes());
        }
        hasher.finalize().into()
    }
}

impl Wallet for MockWallet {
    fn lock_funds(&self, contract: &Contract, amount: u64) -> Result<[u8; 32], String> {
        if self.fail_lock.load(Ordering::SeqCst) {
            return Err("insufficient funds".into());
        }
        self.locked
            .lock()
            .map_err(|e| e.to_string())?
            .push((contract.idx, amount));
        Ok(Self::funding_txid(contract))
    }

    fn build_settlement(&self, contract: &Contract, split: &PayoutSplit) -> Result<Vec<u8>, String> {
        if self.fail_build.load(Ordering::SeqCst) {
            return Err("signer offline".into());
        }
        self.settlements
            .lock()
            .map_err(|e| e.to_string())?
            .push((contract.idx, *split));
        Ok(format!("settle:{}:{}:{}", contract.idx, split.ours, split.theirs).into_bytes())
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// One message that went over a `LoopbackNetwork`.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub from: PeerIdx,
    pub to: PeerIdx,
    pub bytes: Vec<u8>,
}

/// In-process network. Each endpoint's peer index is the same on every
/// node, which keeps two-node tests readable.
#[derive(Debug, Default)]
pub struct LoopbackNetwork {
    inboxes: Mutex<HashMap<PeerIdx, mpsc::Sender<(PeerIdx, Vec<u8>)>>>,
    offline: Mutex<HashSet<PeerIdx>>,
    sent: Mutex<Vec<SentMessage>>,
    next: AtomicU32,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a new endpoint. Messages sent to it arrive on the receiver.
    pub fn endpoint(
        self: &Arc<Self>,
    ) -> (LoopbackTransport, mpsc::Receiver<(PeerIdx, Vec<u8>)>) {
        let id = PeerIdx(self.next.fetch_add(1, Ordering::SeqCst) + 1);
        let (tx, rx) = mpsc::channel(64);
        self.inboxes.lock().expect("inboxes").insert(id, tx);
        (
            LoopbackTransport {
                id,
                network: self.clone(),
            },
            rx,
        )
    }

    /// Make sends to `peer` fail as if it were unreachable.
    pub fn set_offline(&self, peer: PeerIdx, offline: bool) {
        let mut set = self.offline.lock().expect("offline set");
        if offline {
            set.insert(peer);
        } else {
            set.remove(&peer);
        }
    }

    /// Every message delivered so far, in send order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("sent log").clone()
    }
}

/// A node's handle on a `LoopbackNetwork`.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    id: PeerIdx,
    network: Arc<LoopbackNetwork>,
}

impl LoopbackTransport {
    /// This endpoint's index as seen by the other endpoints.
    pub fn id(&self) -> PeerIdx {
        self.id
    }
}

impl PeerTransport for LoopbackTransport {
    async fn send(&self, peer: PeerIdx, bytes: Vec<u8>) -> Result<(), TransportError> {
        let inbox = {
            if self
                .network
                .offline
                .lock()
                .map_err(|e| TransportError::Io(e.to_string()))?
                .contains(&peer)
            {
                return Err(TransportError::Disconnected(peer));
            }
            self.network
                .inboxes
                .lock()
                .map_err(|e| TransportError::Io(e.to_string()))?
                .get(&peer)
                .cloned()
                .ok_or(TransportError::UnknownPeer(peer))?
        };

        inbox
            .send((self.id, bytes.clone()))
            .await
            .map_err(|_| TransportError::Disconnected(peer))?;
        if let Ok(mut sent) = self.network.sent.lock() {
            sent.push(SentMessage {
                from: self.id,
                to: peer,
                bytes,
            });
        }
        Ok(())
    }
}
