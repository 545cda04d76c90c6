use std::sync::Arc;

use crate::contract::{Contract, ContractTerms, SettlementRecord};
use crate::division::PayoutSplit;
use crate::error::{Error, Result};
use crate::negotiator::routing;
use crate::oracle::AttestationVerifier;
use crate::params::{ContractIdx, PeerIdx, check_contract_value};
use crate::registry::OracleRegistry;
use crate::state::ContractStatus;
use crate::store::ContractStore;
use crate::store_trait::ContractBackend;
use crate::transport::PeerTransport;
use crate::wallet::Wallet;
use crate::wire::{PeerMessage, SettleAckMessage, SettleMessage};

/// Turns an oracle attestation into a settled contract.
///
/// Every step runs under the contract's lock and nothing is written until
/// the last one succeeds, so a failed settle leaves the contract `Active`
/// and can simply be retried.
pub struct SettlementEngine<B: ContractBackend, T: PeerTransport> {
    store: ContractStore<B>,
    registry: OracleRegistry<B>,
    transport: Arc<T>,
    wallet: Arc<dyn Wallet>,
    verifier: Arc<dyn AttestationVerifier>,
}

impl<B: ContractBackend, T: PeerTransport> SettlementEngine<B, T> {
    pub fn new(
        store: ContractStore<B>,
        registry: OracleRegistry<B>,
        transport: Arc<T>,
        wallet: Arc<dyn Wallet>,
        verifier: Arc<dyn AttestationVerifier>,
    ) -> Self {
        Self {
            store,
            registry,
            transport,
            wallet,
            verifier,
        }
    }

    /// Settle an active contract with the oracle's attested value.
    pub async fn settle(
        &self,
        idx: ContractIdx,
        oracle_value: u64,
        oracle_signature: [u8; 32],
    ) -> Result<Contract> {
        let lock = self.store.lock(idx).await?;
        let mut contract = self.store.load(&lock)?;
        if contract.status != ContractStatus::Active {
            return Err(Error::WrongState(contract.status));
        }

        let split = self.attested_split(&contract, oracle_value, &oracle_signature)?;
        let settlement_tx = self
            .wallet
            .build_settlement(&contract, &split)
            .map_err(Error::Wallet)?;

        let (peer, fingerprint) = routing(&contract)?;
        let message = PeerMessage::Settle(SettleMessage {
            fingerprint,
            oracle_value,
            oracle_signature,
            payout: split,
            settlement_tx: settlement_tx.clone(),
        });
        self.transport
            .send(peer, message.encode()?)
            .await
            .map_err(|e| Error::PeerUnreachable(e.to_string()))?;

        contract.settlement = Some(SettlementRecord {
            oracle_value,
            payout: split,
            settlement_tx,
        });
        self.store
            .commit_transition(&lock, &mut contract, ContractStatus::Settled)?;
        log::info!(
            "contract {idx} settled at {oracle_value}: ours {} theirs {}",
            split.ours,
            split.theirs
        );
        Ok(contract)
    }

    /// The counterparty settled. Check its claim against our own reading of
    /// the attestation before recording anything.
    pub async fn receive_settle(&self, peer: PeerIdx, settle: SettleMessage) -> Result<ContractIdx> {
        let (lock, mut contract) = self
            .store
            .lock_by_fingerprint(peer, &settle.fingerprint)
            .await?;
        let idx = contract.idx;

        match contract.status {
            ContractStatus::Active => {}
            ContractStatus::Settled => {
                log::debug!("contract {idx}: duplicate settle, re-sending ack");
                self.send_ack(peer, &settle).await;
                return Ok(idx);
            }
            ContractStatus::Accepted => {
                // The peer saw funding confirm before we did.
                log::debug!("contract {idx}: settle arrived before funding confirmed");
                return Err(Error::Conflict(idx));
            }
            status => return Err(Error::WrongState(status)),
        }

        let split =
            self.attested_split(&contract, settle.oracle_value, &settle.oracle_signature)?;
        if settle.payout != split.mirrored() {
            log::warn!(
                "contract {idx}: peer {peer} claims {:?}, local split is {:?}",
                settle.payout,
                split
            );
            return Err(Error::SettlementMismatch);
        }
        let settlement_tx = self
            .wallet
            .build_settlement(&contract, &split)
            .map_err(Error::Wallet)?;

        contract.settlement = Some(SettlementRecord {
            oracle_value: settle.oracle_value,
            payout: split,
            settlement_tx,
        });
        self.store
            .commit_transition(&lock, &mut contract, ContractStatus::Settled)?;
        log::info!(
            "contract {idx} settled by peer at {}: ours {} theirs {}",
            settle.oracle_value,
            split.ours,
            split.theirs
        );

        self.send_ack(peer, &settle).await;
        Ok(idx)
    }

    pub fn receive_settle_ack(&self, peer: PeerIdx, ack: SettleAckMessage) -> Result<ContractIdx> {
        let contract = self
            .store
            .find_by_fingerprint(peer, &ack.fingerprint)?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "contract with fingerprint {} for peer {peer}",
                    ack.fingerprint
                ))
            })?;
        log::info!(
            "contract {}: peer {peer} acknowledged settlement ({:?})",
            contract.idx,
            contract.status
        );
        Ok(contract.idx)
    }

    /// What `contract` would pay out at `oracle_value`, without checking any
    /// signature.
    pub fn payout_for(&self, contract: &Contract, oracle_value: u64) -> Result<PayoutSplit> {
        let terms = contract.terms()?;
        terms.division.split(oracle_value, &terms.funding)
    }

    /// Time check, signature check and payout split, in that order.
    /// Oracle values must fit the same range as every stored contract value.
    fn attested_split(
        &self,
        contract: &Contract,
        oracle_value: u64,
        oracle_signature: &[u8; 32],
    ) -> Result<PayoutSplit> {
        let terms: ContractTerms = contract.terms()?;
        check_contract_value(oracle_value, "oracle_value")?;

        let now = self.store.now();
        if now < terms.settlement_time {
            return Err(Error::TooEarly {
                now,
                settlement_time: terms.settlement_time,
            });
        }

        let oracle = self.registry.get(terms.oracle_idx)?;
        self.verifier.verify(
            &oracle.public_key,
            &terms.r_point,
            oracle_value,
            oracle_signature,
        )?;

        terms.division.split(oracle_value, &terms.funding)
    }

    async fn send_ack(&self, peer: PeerIdx, settle: &SettleMessage) {
        let ack = PeerMessage::SettleAck(SettleAckMessage {
            fingerprint: settle.fingerprint,
        });
        let result = match ack.encode() {
            Ok(bytes) => self
                .transport
                .send(peer, bytes)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = result {
            log::warn!("settle ack for {} not delivered: {e}", settle.fingerprint);
        }
    }
}
