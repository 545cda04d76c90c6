//! `DlcNode`: the unified SDK coordinator.
//!
//! Owns the oracle registry, contract store, negotiator, settlement engine
//! and message router over one shared backend, and exposes the operations a
//! node's RPC layer needs behind a single `&self` API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::config::NegotiatorConfig;
use crate::contract::{Contract, ContractField, ContractFilter};
use crate::division::{DivisionTable, PayoutSplit};
use crate::error::{Error, Result};
use crate::events::ContractEvent;
use crate::negotiator::ContractNegotiator;
use crate::oracle::{AttestationVerifier, Oracle, SchnorrNumericVerifier};
use crate::params::{ContractIdx, Funding, OracleIdx, PeerIdx, Point};
use crate::registry::OracleRegistry;
use crate::router::{Dispatched, PeerMessageRouter};
use crate::settlement::SettlementEngine;
use crate::state::ContractStatus;
use crate::store::ContractStore;
use crate::store_trait::ContractBackend;
use crate::transport::PeerTransport;
use crate::wallet::{FundingEvent, Wallet};

/// How often the inbound loop retries a message that failed with a
/// retryable error.
const INBOUND_RETRIES: u32 = 3;
const INBOUND_RETRY_BACKOFF: Duration = Duration::from_millis(250);

// ── Struct ──────────────────────────────────────────────────────────────────

pub struct DlcNode<B: ContractBackend, T: PeerTransport> {
    registry: OracleRegistry<B>,
    store: ContractStore<B>,
    negotiator: Arc<ContractNegotiator<B, T>>,
    settlement: Arc<SettlementEngine<B, T>>,
    router: PeerMessageRouter<B, T>,
    transport: Arc<T>,
}

// ── Construction ────────────────────────────────────────────────────────────

impl<B: ContractBackend, T: PeerTransport> DlcNode<B, T> {
    /// Create a node verifying attestations with `SchnorrNumericVerifier`.
    pub fn new(
        backend: Arc<Mutex<B>>,
        transport: Arc<T>,
        wallet: Arc<dyn Wallet>,
        clock: Arc<dyn Clock>,
        config: NegotiatorConfig,
    ) -> Self {
        Self::with_verifier(
            backend,
            transport,
            wallet,
            clock,
            Arc::new(SchnorrNumericVerifier::new()),
            config,
        )
    }

    pub fn with_verifier(
        backend: Arc<Mutex<B>>,
        transport: Arc<T>,
        wallet: Arc<dyn Wallet>,
        clock: Arc<dyn Clock>,
        verifier: Arc<dyn AttestationVerifier>,
        config: NegotiatorConfig,
    ) -> Self {
        let registry = OracleRegistry::new(backend.clone());
        let store = ContractStore::new(backend, clock, &config);
        let negotiator = Arc::new(ContractNegotiator::new(
            store.clone(),
            registry.clone(),
            transport.clone(),
            wallet.clone(),
            config,
        ));
        let settlement = Arc::new(SettlementEngine::new(
            store.clone(),
            registry.clone(),
            transport.clone(),
            wallet,
            verifier,
        ));
        let router = PeerMessageRouter::new(negotiator.clone(), settlement.clone());
        Self {
            registry,
            store,
            negotiator,
            settlement,
            router,
            transport,
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn router(&self) -> &PeerMessageRouter<B, T> {
        &self.router
    }

    // ── Oracles ─────────────────────────────────────────────────────────

    pub fn add_oracle(&self, public_key: &Point, label: &str) -> Result<OracleIdx> {
        self.registry.add(public_key, label)
    }

    pub fn find_oracle(&self, public_key: &Point) -> Result<OracleIdx> {
        self.registry.find(public_key)
    }

    pub fn get_oracle(&self, idx: OracleIdx) -> Result<Oracle> {
        self.registry.get(idx)
    }

    pub fn list_oracles(&self) -> Result<Vec<Oracle>> {
        self.registry.list()
    }

    // ── Contracts ───────────────────────────────────────────────────────

    pub fn new_contract(&self) -> Result<Contract> {
        self.store.create()
    }

    pub fn get_contract(&self, idx: ContractIdx) -> Result<Contract> {
        self.store.get(idx)
    }

    pub fn list_contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>> {
        self.store.list(filter)
    }

    pub async fn set_contract_oracle(&self, idx: ContractIdx, oracle: OracleIdx) -> Result<Contract> {
        self.store.set_field(idx, ContractField::Oracle(oracle)).await
    }

    pub async fn set_contract_r_point(&self, idx: ContractIdx, r_point: Point) -> Result<Contract> {
        self.store.set_field(idx, ContractField::RPoint(r_point)).await
    }

    pub async fn set_contract_settlement_time(
        &self,
        idx: ContractIdx,
        settlement_time: u64,
    ) -> Result<Contract> {
        self.store
            .set_field(idx, ContractField::SettlementTime(settlement_time))
            .await
    }

    pub async fn set_contract_coin_type(&self, idx: ContractIdx, coin_type: u32) -> Result<Contract> {
        self.store
            .set_field(idx, ContractField::CoinType(coin_type))
            .await
    }

    pub async fn set_contract_funding(
        &self,
        idx: ContractIdx,
        ours: u64,
        theirs: u64,
    ) -> Result<Contract> {
        let funding = Funding::new(ours, theirs)?;
        self.store
            .set_field(idx, ContractField::Funding(funding))
            .await
    }

    /// Two-point division: all funds to us at `value_all_ours`, all to the
    /// counterparty at `value_all_theirs`. Funding must already be set.
    pub async fn set_contract_division(
        &self,
        idx: ContractIdx,
        value_all_ours: u64,
        value_all_theirs: u64,
    ) -> Result<Contract> {
        let total = self
            .store
            .get(idx)?
            .funding
            .ok_or(Error::IncompleteContract("funding"))?
            .total();
        let table = DivisionTable::linear(value_all_ours, value_all_theirs, total)?;
        self.set_contract_division_table(idx, table).await
    }

    pub async fn set_contract_division_table(
        &self,
        idx: ContractIdx,
        table: DivisionTable,
    ) -> Result<Contract> {
        self.store
            .set_field(idx, ContractField::Division(table))
            .await
    }

    pub async fn discard_contract(&self, idx: ContractIdx) -> Result<()> {
        self.store.discard(idx).await
    }

    // ── Negotiation ─────────────────────────────────────────────────────

    pub async fn offer_contract(&self, idx: ContractIdx, peer: PeerIdx) -> Result<Contract> {
        self.negotiator.offer(idx, peer).await
    }

    pub async fn accept_contract(&self, idx: ContractIdx) -> Result<Contract> {
        self.negotiator.accept(idx).await
    }

    pub async fn decline_contract(&self, idx: ContractIdx) -> Result<Contract> {
        self.negotiator.reject(idx).await
    }

    pub async fn on_funded(&self, idx: ContractIdx, txid: [u8; 32]) -> Result<Contract> {
        self.negotiator.on_funded(idx, txid).await
    }

    // ── Settlement ──────────────────────────────────────────────────────

    pub async fn settle_contract(
        &self,
        idx: ContractIdx,
        oracle_value: u64,
        oracle_signature: [u8; 32],
    ) -> Result<Contract> {
        self.settlement
            .settle(idx, oracle_value, oracle_signature)
            .await
    }

    pub fn payout_for(&self, idx: ContractIdx, oracle_value: u64) -> Result<PayoutSplit> {
        let contract = self.store.get(idx)?;
        self.settlement.payout_for(&contract, oracle_value)
    }

    // ── Inbound ─────────────────────────────────────────────────────────

    pub async fn handle_inbound(&self, peer: PeerIdx, bytes: &[u8]) -> Result<Dispatched> {
        self.router.dispatch(peer, bytes).await
    }

    /// Feed transport bytes into the router until the sender closes.
    ///
    /// Retryable failures are retried a few times with linear backoff;
    /// anything else is logged and dropped.
    pub fn spawn_inbound_loop(&self, mut rx: mpsc::Receiver<(PeerIdx, Vec<u8>)>) -> JoinHandle<()> {
        let router = self.router.clone();
        tokio::spawn(async move {
            while let Some((peer, bytes)) = rx.recv().await {
                let mut attempt = 0;
                loop {
                    match router.dispatch(peer, &bytes).await {
                        Ok(dispatched) => {
                            log::debug!("peer {peer}: {dispatched:?}");
                            break;
                        }
                        Err(e) if e.is_retryable() && attempt < INBOUND_RETRIES => {
                            attempt += 1;
                            log::warn!("peer {peer}: {e}; retry {attempt}/{INBOUND_RETRIES}");
                            tokio::time::sleep(INBOUND_RETRY_BACKOFF * attempt).await;
                        }
                        Err(e) => {
                            log::warn!("peer {peer}: dropping message: {e}");
                            break;
                        }
                    }
                }
            }
            log::info!("inbound channel closed; stopping inbound loop");
        })
    }

    /// Apply wallet funding confirmations until the sender closes.
    pub fn spawn_funding_listener(&self, mut rx: mpsc::Receiver<FundingEvent>) -> JoinHandle<()> {
        let negotiator = self.negotiator.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = negotiator
                    .on_funded_by_fingerprint(&event.fingerprint, event.txid)
                    .await
                {
                    log::warn!("funding event for {}: {e}", event.fingerprint);
                }
            }
            log::info!("funding channel closed; stopping funding listener");
        })
    }

    // ── Status ──────────────────────────────────────────────────────────

    pub fn subscribe(&self) -> broadcast::Receiver<ContractEvent> {
        self.store.subscribe()
    }

    pub fn is_active(&self, idx: ContractIdx) -> Result<bool> {
        Ok(self.store.get(idx)?.status == ContractStatus::Active)
    }

    pub fn is_settled(&self, idx: ContractIdx) -> Result<bool> {
        Ok(self.store.get(idx)?.status == ContractStatus::Settled)
    }

    /// Wait until the contract reaches `status`.
    ///
    /// Fails with `WrongState` if the wait times out, or if the contract
    /// ends in a terminal state other than `status`.
    pub async fn wait_for_status(
        &self,
        idx: ContractIdx,
        status: ContractStatus,
        timeout: Duration,
    ) -> Result<Contract> {
        // Subscribe before reading so no transition falls in between.
        let mut rx = self.store.subscribe();
        let wait = async {
            loop {
                let contract = self.store.get(idx)?;
                if contract.status == status {
                    return Ok(contract);
                }
                if contract.status.is_terminal() {
                    return Err(Error::WrongState(contract.status));
                }
                loop {
                    match rx.recv().await {
                        Ok(event) if event.idx() == idx => break,
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => break,
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(Error::WrongState(contract.status));
                        }
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(Error::WrongState(self.store.get(idx)?.status)),
        }
    }
}
