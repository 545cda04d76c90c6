use std::sync::Arc;

use crate::error::Result;
use crate::negotiator::ContractNegotiator;
use crate::params::{ContractIdx, PeerIdx};
use crate::settlement::SettlementEngine;
use crate::store_trait::ContractBackend;
use crate::transport::PeerTransport;
use crate::wire::PeerMessage;

/// What an inbound message did, and to which local contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Offer(ContractIdx),
    Accept(ContractIdx),
    Reject(ContractIdx),
    Settle(ContractIdx),
    SettleAck(ContractIdx),
}

impl Dispatched {
    pub fn idx(&self) -> ContractIdx {
        match self {
            Dispatched::Offer(idx)
            | Dispatched::Accept(idx)
            | Dispatched::Reject(idx)
            | Dispatched::Settle(idx)
            | Dispatched::SettleAck(idx) => *idx,
        }
    }
}

/// Decodes inbound peer bytes and hands each message to its handler.
pub struct PeerMessageRouter<B: ContractBackend, T: PeerTransport> {
    negotiator: Arc<ContractNegotiator<B, T>>,
    settlement: Arc<SettlementEngine<B, T>>,
}

impl<B: ContractBackend, T: PeerTransport> Clone for PeerMessageRouter<B, T> {
    fn clone(&self) -> Self {
        Self {
            negotiator: self.negotiator.clone(),
            settlement: self.settlement.clone(),
        }
    }
}

impl<B: ContractBackend, T: PeerTransport> PeerMessageRouter<B, T> {
    pub fn new(
        negotiator: Arc<ContractNegotiator<B, T>>,
        settlement: Arc<SettlementEngine<B, T>>,
    ) -> Self {
        Self {
            negotiator,
            settlement,
        }
    }

    /// Handle one message from `peer`.
    ///
    /// Redelivered messages succeed without changing anything. `Conflict`
    /// and `PeerUnreachable` are worth retrying; see `Error::is_retryable`.
    pub async fn dispatch(&self, peer: PeerIdx, bytes: &[u8]) -> Result<Dispatched> {
        let message = PeerMessage::decode(bytes)?;
        log::debug!(
            "peer {peer}: {} for {}",
            message.kind(),
            message.fingerprint()
        );

        match message {
            PeerMessage::Offer(offer) => self
                .negotiator
                .receive_offer(peer, offer)
                .await
                .map(Dispatched::Offer),
            PeerMessage::Accept(accept) => self
                .negotiator
                .receive_accept(peer, accept)
                .await
                .map(Dispatched::Accept),
            PeerMessage::Reject(reject) => self
                .negotiator
                .receive_reject(peer, reject)
                .await
                .map(Dispatched::Reject),
            PeerMessage::Settle(settle) => self
                .settlement
                .receive_settle(peer, settle)
                .await
                .map(Dispatched::Settle),
            PeerMessage::SettleAck(ack) => self
                .settlement
                .receive_settle_ack(peer, ack)
                .map(Dispatched::SettleAck),
        }
    }
}
