use std::sync::Arc;

use crate::config::NegotiatorConfig;
use crate::contract::Contract;
use crate::error::{Error, Result};
use crate::params::{
    ContractFingerprint, ContractIdx, Funding, PeerIdx, check_contract_value, parse_point,
};
use crate::registry::OracleRegistry;
use crate::state::ContractStatus;
use crate::store::ContractStore;
use crate::store_trait::ContractBackend;
use crate::transport::PeerTransport;
use crate::wallet::Wallet;
use crate::wire::{AcceptMessage, OfferMessage, PeerMessage, RejectMessage};

/// Drives a contract from draft to active: offers, accepts, rejects and
/// the funding hand-off.
pub struct ContractNegotiator<B: ContractBackend, T: PeerTransport> {
    store: ContractStore<B>,
    registry: OracleRegistry<B>,
    transport: Arc<T>,
    wallet: Arc<dyn Wallet>,
    config: NegotiatorConfig,
}

impl<B: ContractBackend, T: PeerTransport> ContractNegotiator<B, T> {
    pub fn new(
        store: ContractStore<B>,
        registry: OracleRegistry<B>,
        transport: Arc<T>,
        wallet: Arc<dyn Wallet>,
        config: NegotiatorConfig,
    ) -> Self {
        Self {
            store,
            registry,
            transport,
            wallet,
            config,
        }
    }

    /// Offer a complete draft to `peer`.
    ///
    /// The contract only moves to `OfferedByMe` once the transport has taken
    /// the message. If the send fails it stays a draft and can be offered
    /// again.
    pub async fn offer(&self, idx: ContractIdx, peer: PeerIdx) -> Result<Contract> {
        let lock = self.store.lock(idx).await?;
        let mut contract = self.store.load(&lock)?;
        if contract.status != ContractStatus::Draft {
            return Err(Error::WrongState(contract.status));
        }
        let terms = contract.terms()?;
        let oracle = match self.registry.get(terms.oracle_idx) {
            Ok(oracle) => oracle,
            Err(Error::NotFound(_)) => return Err(Error::UnknownOracle),
            Err(e) => return Err(e),
        };

        let nonce: [u8; 32] = rand::random();
        let fingerprint = ContractFingerprint::compute(
            &oracle.public_key,
            &terms.r_point,
            terms.settlement_time,
            contract.idx,
            &nonce,
        );
        contract.fingerprint = Some(fingerprint);
        contract.peer_idx = Some(peer);
        self.store.save(&lock, &mut contract)?;

        let message = PeerMessage::Offer(OfferMessage {
            fingerprint,
            offerer_idx: contract.idx,
            nonce,
            oracle_pubkey: oracle.public_key,
            r_point: terms.r_point,
            settlement_time: terms.settlement_time,
            coin_type: terms.coin_type,
            funding: terms.funding,
            division: terms.division,
        });
        self.send(peer, &message).await?;

        self.store
            .commit_transition(&lock, &mut contract, ContractStatus::OfferedByMe)?;
        Ok(contract)
    }

    /// Store an offer received from `peer` as an `OfferedToMe` contract.
    ///
    /// A redelivered offer returns the existing contract without changes.
    pub async fn receive_offer(&self, peer: PeerIdx, offer: OfferMessage) -> Result<ContractIdx> {
        if !offer.fingerprint_is_consistent() {
            return Err(Error::Message(format!(
                "offer {} does not match its terms",
                offer.fingerprint
            )));
        }

        if let Some(existing) = self.store.find_by_fingerprint(peer, &offer.fingerprint)? {
            return self.known_offer(peer, existing);
        }

        parse_point(&offer.r_point, "r_point")?;
        check_contract_value(offer.settlement_time, "settlement_time")?;
        let oracle_idx = self
            .registry
            .resolve(&offer.oracle_pubkey, self.config.auto_register_oracles)?;
        // Everything on the wire is from the offerer's side.
        let funding = Funding::new(offer.funding.theirs, offer.funding.ours)?;
        let division = offer.division.mirrored(funding.total())?;

        let mut contract = Contract::empty(ContractStatus::OfferedToMe, self.store.now());
        contract.oracle_idx = Some(oracle_idx);
        contract.r_point = Some(offer.r_point);
        contract.settlement_time = Some(offer.settlement_time);
        contract.coin_type = Some(offer.coin_type);
        contract.funding = Some(funding);
        contract.division = Some(division);
        contract.peer_idx = Some(peer);
        contract.fingerprint = Some(offer.fingerprint);
        contract.remote_idx = Some(offer.offerer_idx);

        let (stored, created) = self.store.insert_received(contract)?;
        if created {
            Ok(stored.idx)
        } else {
            self.known_offer(peer, stored)
        }
    }

    fn known_offer(&self, peer: PeerIdx, existing: Contract) -> Result<ContractIdx> {
        if matches!(
            existing.status,
            ContractStatus::Draft | ContractStatus::OfferedByMe
        ) {
            return Err(Error::Message(format!(
                "peer {peer} sent back our own offer {}",
                existing.idx
            )));
        }
        log::debug!(
            "contract {}: duplicate offer from peer {peer} ignored ({:?})",
            existing.idx,
            existing.status
        );
        Ok(existing.idx)
    }

    /// Accept an offer received from the counterparty.
    pub async fn accept(&self, idx: ContractIdx) -> Result<Contract> {
        let lock = self.store.lock(idx).await?;
        let mut contract = self.store.load(&lock)?;
        if contract.status != ContractStatus::OfferedToMe {
            return Err(Error::WrongState(contract.status));
        }
        let (peer, fingerprint) = routing(&contract)?;

        let message = PeerMessage::Accept(AcceptMessage {
            fingerprint,
            acceptor_idx: contract.idx,
        });
        self.send(peer, &message).await?;

        self.store
            .commit_transition(&lock, &mut contract, ContractStatus::Accepted)?;
        Ok(contract)
    }

    /// Decline an offer received from the counterparty. The local decision
    /// stands even if the counterparty cannot be told.
    pub async fn reject(&self, idx: ContractIdx) -> Result<Contract> {
        let lock = self.store.lock(idx).await?;
        let mut contract = self.store.load(&lock)?;
        if contract.status != ContractStatus::OfferedToMe {
            return Err(Error::WrongState(contract.status));
        }
        let (peer, fingerprint) = routing(&contract)?;

        self.store
            .commit_transition(&lock, &mut contract, ContractStatus::Rejected)?;

        let message = PeerMessage::Reject(RejectMessage { fingerprint });
        if let Err(e) = self.send(peer, &message).await {
            log::warn!("contract {idx}: reject not delivered to peer {peer}: {e}");
        }
        Ok(contract)
    }

    /// The counterparty accepted our offer: move to `Accepted` and hand the
    /// funding over to the wallet.
    pub async fn receive_accept(&self, peer: PeerIdx, accept: AcceptMessage) -> Result<ContractIdx> {
        let (lock, mut contract) = self
            .store
            .lock_by_fingerprint(peer, &accept.fingerprint)
            .await?;
        let idx = contract.idx;

        match contract.status {
            ContractStatus::OfferedByMe => {}
            ContractStatus::Draft => {
                // Our own offer bookkeeping has not completed yet.
                return Err(Error::Conflict(idx));
            }
            status if status.has_reached(ContractStatus::Accepted) => {
                log::debug!("contract {idx}: duplicate accept ignored ({status:?})");
                return Ok(idx);
            }
            status => return Err(Error::WrongState(status)),
        }

        contract.remote_idx = Some(accept.acceptor_idx);
        self.store
            .commit_transition(&lock, &mut contract, ContractStatus::Accepted)?;

        let amount = contract.funding.map(|f| f.ours).unwrap_or_default();
        match self.wallet.lock_funds(&contract, amount) {
            Ok(txid) => log::info!(
                "contract {idx}: locked {amount} for funding tx {}",
                hex::encode(txid)
            ),
            Err(e) => {
                log::error!("contract {idx}: wallet failed to lock funds: {e}");
                self.store
                    .commit_transition(&lock, &mut contract, ContractStatus::Error)?;
                return Err(Error::Wallet(e));
            }
        }
        Ok(idx)
    }

    /// The counterparty declined our offer.
    pub async fn receive_reject(&self, peer: PeerIdx, reject: RejectMessage) -> Result<ContractIdx> {
        let (lock, mut contract) = self
            .store
            .lock_by_fingerprint(peer, &reject.fingerprint)
            .await?;
        let idx = contract.idx;

        match contract.status {
            ContractStatus::OfferedByMe => {
                self.store
                    .commit_transition(&lock, &mut contract, ContractStatus::Rejected)?;
                Ok(idx)
            }
            ContractStatus::Rejected => {
                log::debug!("contract {idx}: duplicate reject ignored");
                Ok(idx)
            }
            ContractStatus::Draft => Err(Error::Conflict(idx)),
            status => Err(Error::WrongState(status)),
        }
    }

    /// Funding confirmed on-chain.
    pub async fn on_funded(&self, idx: ContractIdx, txid: [u8; 32]) -> Result<Contract> {
        let lock = self.store.lock(idx).await?;
        let mut contract = self.store.load(&lock)?;

        match contract.status {
            ContractStatus::Accepted => {
                contract.funding_txid = Some(txid);
                self.store
                    .commit_transition(&lock, &mut contract, ContractStatus::Active)?;
                Ok(contract)
            }
            ContractStatus::Active | ContractStatus::Settled => {
                log::debug!("contract {idx}: funding already recorded");
                Ok(contract)
            }
            status => Err(Error::WrongState(status)),
        }
    }

    /// `on_funded` for a wallet event that names the contract by fingerprint.
    pub async fn on_funded_by_fingerprint(
        &self,
        fingerprint: &ContractFingerprint,
        txid: [u8; 32],
    ) -> Result<Contract> {
        let contract = self.store.find_fundable(fingerprint)?;
        self.on_funded(contract.idx, txid).await
    }

    async fn send(&self, peer: PeerIdx, message: &PeerMessage) -> Result<()> {
        let bytes = message.encode()?;
        self.transport
            .send(peer, bytes)
            .await
            .map_err(|e| Error::PeerUnreachable(e.to_string()))?;
        log::debug!("sent {} for {} to peer {peer}", message.kind(), message.fingerprint());
        Ok(())
    }
}

/// Peer and fingerprint of a contract that has been through an offer.
pub(crate) fn routing(contract: &Contract) -> Result<(PeerIdx, ContractFingerprint)> {
    match (contract.peer_idx, contract.fingerprint) {
        (Some(peer), Some(fingerprint)) => Ok((peer, fingerprint)),
        _ => Err(Error::Store(format!(
            "contract {} has no peer or fingerprint",
            contract.idx
        ))),
    }
}
