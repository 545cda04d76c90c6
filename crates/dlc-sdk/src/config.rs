use std::time::Duration;

/// Tuning for contract negotiation and the per-contract lock table.
#[derive(Debug, Clone)]
pub struct NegotiatorConfig {
    /// How long a second caller waits for a contract's in-flight
    /// transition before failing with `Conflict`.
    pub lock_wait: Duration,
    /// Register oracles named in received offers instead of failing with
    /// `UnknownOracle`. This trusts the counterparty's choice of oracle.
    pub auto_register_oracles: bool,
    /// Capacity of the contract event broadcast channel.
    pub event_capacity: usize,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_secs(5),
            auto_register_oracles: false,
            event_capacity: 256,
        }
    }
}
