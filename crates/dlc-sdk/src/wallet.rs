use crate::contract::Contract;
use crate::division::PayoutSplit;
use crate::params::ContractFingerprint;

/// The on-chain side of a contract. Key management, signing and broadcast
/// live behind this trait.
pub trait Wallet: Send + Sync {
    /// Reserve `amount` for the contract's funding transaction and return
    /// the txid of the funding transaction being built.
    fn lock_funds(&self, contract: &Contract, amount: u64) -> Result<[u8; 32], String>;

    /// Build our half of the settlement transaction paying out `split`.
    fn build_settlement(&self, contract: &Contract, split: &PayoutSplit) -> Result<Vec<u8>, String>;
}

/// Funding confirmation reported by the wallet's chain watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingEvent {
    pub fingerprint: ContractFingerprint,
    pub txid: [u8; 32],
}
