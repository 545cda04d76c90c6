use thiserror::Error;

use crate::params::ContractIdx;
use crate::state::ContractStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid status transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: ContractStatus,
        to: ContractStatus,
    },

    #[error("contract is incomplete: {0} is not set")]
    IncompleteContract(&'static str),

    #[error("oracle is not registered on this node")]
    UnknownOracle,

    #[error("oracle public key is already registered")]
    DuplicateOracle,

    #[error("operation not valid for contract in state {0:?}")]
    WrongState(ContractStatus),

    #[error("settlement not allowed before {settlement_time} (now {now})")]
    TooEarly { now: u64, settlement_time: u64 },

    #[error("oracle signature does not verify")]
    InvalidSignature,

    #[error("contract {0} is busy with another transition")]
    Conflict(ContractIdx),

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid field value: {0}")]
    InvalidField(String),

    #[error("malformed peer message: {0}")]
    Message(String),

    #[error("counterparty settlement does not match local payout")]
    SettlementMismatch,

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    /// Transport-level failures that a caller may retry with backoff.
    /// Everything else is a caller or counterparty logic error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::PeerUnreachable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(Error::Conflict(ContractIdx(1)).is_retryable());
        assert!(Error::PeerUnreachable("down".into()).is_retryable());
        assert!(!Error::InvalidSignature.is_retryable());
        assert!(!Error::WrongState(ContractStatus::Active).is_retryable());
        assert!(!Error::IncompleteContract("r_point").is_retryable());
    }
}
