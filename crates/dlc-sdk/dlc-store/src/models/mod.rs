pub mod contract;
pub mod oracle;
pub mod peer;

pub use contract::{ContractChangeset, ContractRow, NewContractRow};
pub use oracle::{NewOracleRow, OracleRow};
pub use peer::{NewPeerRow, PeerRow};
