use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OwnedMutexGuard, broadcast};

use crate::clock::Clock;
use crate::config::NegotiatorConfig;
use crate::contract::{Contract, ContractField, ContractFilter};
use crate::error::{Error, Result};
use crate::events::ContractEvent;
use crate::params::{
    ContractFingerprint, ContractIdx, Funding, PeerIdx, check_contract_value, parse_point,
};
use crate::registry::OracleRegistry;
use crate::state::ContractStatus;
use crate::store_trait::{ContractBackend, lock_backend};

type LockTable = Arc<Mutex<HashMap<ContractIdx, Arc<tokio::sync::Mutex<()>>>>>;

/// Proof that the caller holds a contract's transition lock. Dropping it
/// releases the lock.
pub struct ContractLock {
    idx: ContractIdx,
    table: LockTable,
    _guard: OwnedMutexGuard<()>,
}

impl ContractLock {
    pub fn idx(&self) -> ContractIdx {
        self.idx
    }
}

impl Drop for ContractLock {
    fn drop(&mut self) {
        // The table entry and our guard are the only references when nobody
        // else holds or waits for this contract.
        if let Ok(mut table) = self.table.lock() {
            if table
                .get(&self.idx)
                .is_some_and(|mutex| Arc::strong_count(mutex) <= 2)
            {
                table.remove(&self.idx);
            }
        }
    }
}

/// Durable record of every contract, with at most one in-flight transition
/// per contract.
///
/// Reads go straight to the backend. Anything that changes a contract first
/// takes its `ContractLock`; a caller that cannot get the lock within
/// `lock_wait` fails with `Conflict`.
pub struct ContractStore<B: ContractBackend> {
    backend: Arc<Mutex<B>>,
    registry: OracleRegistry<B>,
    locks: LockTable,
    events: broadcast::Sender<ContractEvent>,
    clock: Arc<dyn Clock>,
    lock_wait: Duration,
}

impl<B: ContractBackend> Clone for ContractStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            registry: self.registry.clone(),
            locks: self.locks.clone(),
            events: self.events.clone(),
            clock: self.clock.clone(),
            lock_wait: self.lock_wait,
        }
    }
}

impl<B: ContractBackend> ContractStore<B> {
    pub fn new(backend: Arc<Mutex<B>>, clock: Arc<dyn Clock>, config: &NegotiatorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            registry: OracleRegistry::new(backend.clone()),
            backend,
            locks: Arc::new(Mutex::new(HashMap::new())),
            events,
            clock,
            lock_wait: config.lock_wait,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContractEvent> {
        self.events.subscribe()
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn get(&self, idx: ContractIdx) -> Result<Contract> {
        lock_backend(&self.backend)?
            .get_contract(idx)
            .map_err(Error::Store)?
            .ok_or_else(|| Error::NotFound(format!("contract {idx}")))
    }

    /// The contract held with `peer` under `fingerprint`.
    pub fn find_by_fingerprint(
        &self,
        peer: PeerIdx,
        fingerprint: &ContractFingerprint,
    ) -> Result<Option<Contract>> {
        lock_backend(&self.backend)?
            .find_contract_by_fingerprint(peer, fingerprint)
            .map_err(Error::Store)
    }

    /// The accepted contract a wallet event names by fingerprint alone.
    ///
    /// Only contracts that have been accepted can be funded, and among those
    /// the fingerprint must be unambiguous.
    pub fn find_fundable(&self, fingerprint: &ContractFingerprint) -> Result<Contract> {
        let filter = ContractFilter {
            fingerprint: Some(*fingerprint),
            ..Default::default()
        };
        let mut candidates: Vec<Contract> = self
            .list(&filter)?
            .into_iter()
            .filter(|c| {
                matches!(
                    c.status,
                    ContractStatus::Accepted | ContractStatus::Active | ContractStatus::Settled
                )
            })
            .collect();
        match candidates.len() {
            0 => Err(Error::NotFound(format!(
                "accepted contract with fingerprint {fingerprint}"
            ))),
            1 => Ok(candidates.remove(0)),
            n => Err(Error::Message(format!(
                "{n} accepted contracts share fingerprint {fingerprint}"
            ))),
        }
    }

    pub fn list(&self, filter: &ContractFilter) -> Result<Vec<Contract>> {
        lock_backend(&self.backend)?
            .list_contracts(filter)
            .map_err(Error::Store)
    }

    // ── Creation ────────────────────────────────────────────────────────

    /// Create an empty draft.
    pub fn create(&self) -> Result<Contract> {
        let mut contract = Contract::empty(ContractStatus::Draft, self.clock.now());
        contract.idx = lock_backend(&self.backend)?
            .insert_contract(&contract)
            .map_err(Error::Store)?;
        log::info!("created draft contract {}", contract.idx);
        let _ = self.events.send(ContractEvent::Created {
            idx: contract.idx,
            status: contract.status,
        });
        Ok(contract)
    }

    /// Insert a contract built from a received offer, unless the same peer
    /// already has one under this fingerprint. Returns the stored contract
    /// and whether it was created by this call.
    pub(crate) fn insert_received(&self, mut contract: Contract) -> Result<(Contract, bool)> {
        let (Some(peer), Some(fingerprint)) = (contract.peer_idx, contract.fingerprint) else {
            return Err(Error::Message(
                "received offer has no peer or fingerprint".into(),
            ));
        };

        {
            let mut backend = lock_backend(&self.backend)?;
            if let Some(existing) = backend
                .find_contract_by_fingerprint(peer, &fingerprint)
                .map_err(Error::Store)?
            {
                return Ok((existing, false));
            }
            contract.idx = backend.insert_contract(&contract).map_err(Error::Store)?;
        }

        log::info!(
            "contract {} received from peer {:?} ({fingerprint})",
            contract.idx,
            contract.peer_idx
        );
        let _ = self.events.send(ContractEvent::Created {
            idx: contract.idx,
            status: contract.status,
        });
        Ok((contract, true))
    }

    // ── Locking ─────────────────────────────────────────────────────────

    /// Take the transition lock for `idx`, waiting at most `lock_wait`.
    pub async fn lock(&self, idx: ContractIdx) -> Result<ContractLock> {
        let mutex = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| Error::Store("lock table mutex poisoned".into()))?;
            locks.entry(idx).or_default().clone()
        };
        match tokio::time::timeout(self.lock_wait, mutex.lock_owned()).await {
            Ok(guard) => Ok(ContractLock {
                idx,
                table: self.locks.clone(),
                _guard: guard,
            }),
            Err(_) => {
                log::warn!("contract {idx}: lock wait expired");
                Err(Error::Conflict(idx))
            }
        }
    }

    /// Lock the contract `peer` refers to by `fingerprint`.
    pub(crate) async fn lock_by_fingerprint(
        &self,
        peer: PeerIdx,
        fingerprint: &ContractFingerprint,
    ) -> Result<(ContractLock, Contract)> {
        let found = self.find_by_fingerprint(peer, fingerprint)?.ok_or_else(|| {
            Error::NotFound(format!(
                "contract with fingerprint {fingerprint} for peer {peer}"
            ))
        })?;
        let lock = self.lock(found.idx).await?;
        let contract = self.load(&lock)?;
        Ok((lock, contract))
    }

    /// Read the contract guarded by `lock`.
    pub fn load(&self, lock: &ContractLock) -> Result<Contract> {
        self.get(lock.idx)
    }

    /// Persist changes to non-status fields of the locked contract.
    pub fn save(&self, lock: &ContractLock, contract: &mut Contract) -> Result<()> {
        if contract.idx != lock.idx {
            return Err(Error::Store(format!(
                "lock for contract {} used to save contract {}",
                lock.idx, contract.idx
            )));
        }
        contract.updated_at = self.clock.now();
        lock_backend(&self.backend)?
            .save_contract(contract)
            .map_err(Error::Store)
    }

    /// Move the locked contract to `to`, persist it and broadcast the change.
    /// On error `contract` is left untouched.
    pub fn commit_transition(
        &self,
        lock: &ContractLock,
        contract: &mut Contract,
        to: ContractStatus,
    ) -> Result<()> {
        let from = contract.status;
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { from, to });
        }
        if to == ContractStatus::OfferedByMe {
            contract.terms()?;
        }

        let mut next = contract.clone();
        next.status = to;
        self.save(lock, &mut next)?;
        *contract = next;

        log::info!("contract {}: {from:?} -> {to:?}", contract.idx);
        let _ = self.events.send(ContractEvent::StatusChanged {
            idx: contract.idx,
            old: from,
            new: to,
        });
        Ok(())
    }

    // ── Mutations ───────────────────────────────────────────────────────

    /// Set one field of a draft.
    pub async fn set_field(&self, idx: ContractIdx, field: ContractField) -> Result<Contract> {
        let lock = self.lock(idx).await?;
        let mut contract = self.load(&lock)?;
        if contract.status != ContractStatus::Draft {
            return Err(Error::InvalidTransition {
                from: contract.status,
                to: ContractStatus::Draft,
            });
        }

        let field = self.validate_field(&contract, field)?;
        log::debug!("contract {idx}: set {}", field.name());
        contract.apply(field);
        self.save(&lock, &mut contract)?;
        Ok(contract)
    }

    /// Apply a status transition on its own.
    pub async fn transition(&self, idx: ContractIdx, to: ContractStatus) -> Result<Contract> {
        let lock = self.lock(idx).await?;
        let mut contract = self.load(&lock)?;
        self.commit_transition(&lock, &mut contract, to)?;
        Ok(contract)
    }

    /// Remove a draft. Anything already offered must run its course.
    pub async fn discard(&self, idx: ContractIdx) -> Result<()> {
        let lock = self.lock(idx).await?;
        let contract = self.load(&lock)?;
        if contract.status != ContractStatus::Draft {
            return Err(Error::WrongState(contract.status));
        }

        let removed = lock_backend(&self.backend)?
            .delete_contract(idx)
            .map_err(Error::Store)?;
        if !removed {
            return Err(Error::NotFound(format!("contract {idx}")));
        }

        log::info!("discarded draft contract {idx}");
        let _ = self.events.send(ContractEvent::Discarded { idx });
        Ok(())
    }

    #[cfg(test)]
    fn lock_table_len(&self) -> usize {
        self.locks.lock().map(|t| t.len()).unwrap_or(0)
    }

    fn validate_field(&self, contract: &Contract, field: ContractField) -> Result<ContractField> {
        match field {
            ContractField::Oracle(oracle_idx) => match self.registry.get(oracle_idx) {
                Ok(_) => Ok(field),
                Err(Error::NotFound(_)) => Err(Error::UnknownOracle),
                Err(e) => Err(e),
            },
            ContractField::RPoint(point) => {
                parse_point(&point, "r_point")?;
                Ok(field)
            }
            ContractField::Funding(funding) => {
                let funding = Funding::new(funding.ours, funding.theirs)?;
                if let Some(division) = &contract.division {
                    division.check_bounds(funding.total())?;
                }
                Ok(ContractField::Funding(funding))
            }
            ContractField::Division(ref division) => {
                if let Some(funding) = &contract.funding {
                    division.check_bounds(funding.total())?;
                }
                Ok(field)
            }
            ContractField::SettlementTime(time) => {
                check_contract_value(time, "settlement_time")?;
                Ok(field)
            }
            ContractField::CoinType(_) => Ok(field),
        }
    }
}
