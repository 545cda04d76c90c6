use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::contract::{Contract, ContractFilter};
use crate::error::Error;
use crate::oracle::Oracle;
use crate::params::{ContractFingerprint, ContractIdx, OracleIdx, PeerIdx, Point};

/// Persistence operations needed by the registry and the contract store.
///
/// This avoids a dependency from `dlc-sdk` on `dlc-store`. The `dlc-store`
/// crate implements this trait for `DlcStore`.
pub trait ContractBackend: Send + 'static {
    /// Insert a new oracle and return its allocated index.
    fn insert_oracle(&mut self, public_key: &Point, label: &str) -> Result<OracleIdx, String>;

    fn get_oracle(&mut self, idx: OracleIdx) -> Result<Option<Oracle>, String>;

    fn find_oracle(&mut self, public_key: &Point) -> Result<Option<Oracle>, String>;

    fn list_oracles(&mut self) -> Result<Vec<Oracle>, String>;

    /// Insert a contract and return its allocated index. `contract.idx` is ignored.
    fn insert_contract(&mut self, contract: &Contract) -> Result<ContractIdx, String>;

    /// Overwrite an existing contract record.
    fn save_contract(&mut self, contract: &Contract) -> Result<(), String>;

    fn get_contract(&mut self, idx: ContractIdx) -> Result<Option<Contract>, String>;

    /// The contract held with `peer` under `fingerprint`. The pair is unique.
    fn find_contract_by_fingerprint(
        &mut self,
        peer: PeerIdx,
        fingerprint: &ContractFingerprint,
    ) -> Result<Option<Contract>, String>;

    /// Contracts matching `filter`, ordered by index.
    fn list_contracts(&mut self, filter: &ContractFilter) -> Result<Vec<Contract>, String>;

    /// Remove a contract. Returns `false` if it did not exist.
    fn delete_contract(&mut self, idx: ContractIdx) -> Result<bool, String>;

    /// Record that `idx` stands for the transport address `address`. Both
    /// are unique.
    fn insert_peer(&mut self, idx: PeerIdx, address: &[u8]) -> Result<(), String>;

    /// Every recorded peer, ordered by index.
    fn list_peers(&mut self) -> Result<Vec<(PeerIdx, Vec<u8>)>, String>;
}

/// Lock a shared backend, mapping poisoning to a store error.
pub(crate) fn lock_backend<B: ContractBackend>(
    backend: &Mutex<B>,
) -> crate::error::Result<MutexGuard<'_, B>> {
    backend
        .lock()
        .map_err(|_| Error::Store("backend mutex poisoned by a prior panic".into()))
}

/// Volatile backend for nodes that do not need persistence, and for tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    oracles: Vec<Oracle>,
    contracts: BTreeMap<ContractIdx, Contract>,
    next_contract: u64,
    peers: BTreeMap<PeerIdx, Vec<u8>>,
}

impl ContractBackend for MemoryBackend {
    fn insert_oracle(&mut self, public_key: &Point, label: &str) -> Result<OracleIdx, String> {
        if self.oracles.iter().any(|o| &o.public_key == public_key) {
            return Err("oracle public key already present".into());
        }
        let idx = OracleIdx(self.oracles.len() as u64 + 1);
        self.oracles.push(Oracle {
            idx,
            public_key: *public_key,
            label: label.to_string(),
        });
        Ok(idx)
    }

    fn get_oracle(&mut self, idx: OracleIdx) -> Result<Option<Oracle>, String> {
        Ok(self.oracles.iter().find(|o| o.idx == idx).cloned())
    }

    fn find_oracle(&mut self, public_key: &Point) -> Result<Option<Oracle>, String> {
        Ok(self
            .oracles
            .iter()
            .find(|o| &o.public_key == public_key)
            .cloned())
    }

    fn list_oracles(&mut self) -> Result<Vec<Oracle>, String> {
        Ok(self.oracles.clone())
    }

    fn insert_contract(&mut self, contract: &Contract) -> Result<ContractIdx, String> {
        self.next_contract += 1;
        let idx = ContractIdx(self.next_contract);
        let mut stored = contract.clone();
        stored.idx = idx;
        self.contracts.insert(idx, stored);
        Ok(idx)
    }

    fn save_contract(&mut self, contract: &Contract) -> Result<(), String> {
        match self.contracts.get_mut(&contract.idx) {
            Some(slot) => {
                *slot = contract.clone();
                Ok(())
            }
            None => Err(format!("contract {} does not exist", contract.idx)),
        }
    }

    fn get_contract(&mut self, idx: ContractIdx) -> Result<Option<Contract>, String> {
        Ok(self.contracts.get(&idx).cloned())
    }

    fn find_contract_by_fingerprint(
        &mut self,
        peer: PeerIdx,
        fingerprint: &ContractFingerprint,
    ) -> Result<Option<Contract>, String> {
        Ok(self
            .contracts
            .values()
            .find(|c| c.peer_idx == Some(peer) && c.fingerprint.as_ref() == Some(fingerprint))
            .cloned())
    }

    fn list_contracts(&mut self, filter: &ContractFilter) -> Result<Vec<Contract>, String> {
        let matching = self.contracts.values().filter(|c| filter.matches(c)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    fn delete_contract(&mut self, idx: ContractIdx) -> Result<bool, String> {
        Ok(self.contracts.remove(&idx).is_some())
    }

    fn insert_peer(&mut self, idx: PeerIdx, address: &[u8]) -> Result<(), String> {
        if self.peers.contains_key(&idx) || self.peers.values().any(|a| a == address) {
            return Err(format!("peer {idx} or its address already recorded"));
        }
        self.peers.insert(idx, address.to_vec());
        Ok(())
    }

    fn list_peers(&mut self) -> Result<Vec<(PeerIdx, Vec<u8>)>, String> {
        Ok(self.peers.iter().map(|(i, a)| (*i, a.clone())).collect())
    }
}
