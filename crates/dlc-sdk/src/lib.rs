pub mod clock;
pub mod config;
pub mod contract;
pub mod division;
pub mod error;
pub mod events;
pub mod negotiator;
pub mod node;
pub mod oracle;
pub mod params;
pub mod registry;
pub mod router;
pub mod settlement;
pub mod state;
pub mod store;
pub mod store_trait;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;
pub mod wallet;
pub mod wire;

// Core types
pub use clock::{Clock, SystemClock};
pub use config::NegotiatorConfig;
pub use contract::{Contract, ContractField, ContractFilter, ContractTerms, SettlementRecord};
pub use division::{DivisionPoint, DivisionTable, PayoutSplit};
pub use error::{Error, Result};
pub use events::ContractEvent;
pub use params::{
    ContractFingerprint, ContractIdx, Funding, MAX_CONTRACT_VALUE, OracleIdx, PeerIdx, Point,
    check_contract_value, parse_point,
};
pub use state::ContractStatus;

// Components
pub use negotiator::ContractNegotiator;
pub use node::DlcNode;
pub use registry::OracleRegistry;
pub use router::{Dispatched, PeerMessageRouter};
pub use settlement::SettlementEngine;
pub use store::{ContractLock, ContractStore};
pub use store_trait::{ContractBackend, MemoryBackend};

// Collaborators
pub use oracle::{
    AttestationVerifier, Oracle, SchnorrNumericVerifier, attestation_challenge,
    attestation_message, signature_point,
};
pub use transport::{
    DEFAULT_RELAYS, NostrTransport, NostrTransportConfig, PEER_MESSAGE_KIND, PeerBook,
    PeerDirectory, PeerTransport, TransportError, build_inbox_filter, build_peer_event,
};
pub use wallet::{FundingEvent, Wallet};

// Wire
pub use wire::{
    AcceptMessage, OfferMessage, PROTOCOL_VERSION, PeerMessage, RejectMessage, SettleAckMessage,
    SettleMessage,
};

// Re-export for app-layer key handling
pub use nostr_sdk;
