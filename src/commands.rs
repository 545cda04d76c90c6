//! Script-level node commands.
//!
//! Each command takes plain values (indices, hex strings, amounts), calls the
//! node and returns a camelCase response or the error as a string.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use dlc_sdk::{
    Contract, ContractBackend, ContractFilter, ContractIdx, ContractStatus, DlcNode, Error,
    Oracle, OracleIdx, PeerIdx, PeerTransport, Point,
};

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleResponse {
    pub idx: u64,
    pub public_key: String,
    pub label: String,
}

impl From<Oracle> for OracleResponse {
    fn from(oracle: Oracle) -> Self {
        Self {
            idx: oracle.idx.0,
            public_key: hex::encode(oracle.public_key),
            label: oracle.label,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResponse {
    pub oracle_value: u64,
    pub payout_ours: u64,
    pub payout_theirs: u64,
    pub settlement_tx: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractResponse {
    pub idx: u64,
    pub status: ContractStatus,
    pub oracle_idx: Option<u64>,
    pub r_point: Option<String>,
    pub settlement_time: Option<u64>,
    pub coin_type: Option<u32>,
    pub funding_ours: Option<u64>,
    pub funding_theirs: Option<u64>,
    pub peer_idx: Option<u32>,
    pub fingerprint: Option<String>,
    pub funding_txid: Option<String>,
    pub settlement: Option<SettlementResponse>,
}

impl From<Contract> for ContractResponse {
    fn from(c: Contract) -> Self {
        Self {
            idx: c.idx.0,
            status: c.status,
            oracle_idx: c.oracle_idx.map(|o| o.0),
            r_point: c.r_point.map(hex::encode),
            settlement_time: c.settlement_time,
            coin_type: c.coin_type,
            funding_ours: c.funding.map(|f| f.ours),
            funding_theirs: c.funding.map(|f| f.theirs),
            peer_idx: c.peer_idx.map(|p| p.0),
            fingerprint: c.fingerprint.map(|f| f.to_hex()),
            funding_txid: c.funding_txid.map(hex::encode),
            settlement: c.settlement.map(|s| SettlementResponse {
                oracle_value: s.oracle_value,
                payout_ours: s.payout.ours,
                payout_theirs: s.payout.theirs,
                settlement_tx: hex::encode(s.settlement_tx),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub idx: u64,
    pub status: ContractStatus,
    pub is_active: bool,
    pub is_settled: bool,
}

fn parse_hex<const N: usize>(s: &str, field: &str) -> Result<[u8; N], String> {
    let bytes = hex::decode(s.trim()).map_err(|e| format!("invalid {field} hex: {e}"))?;
    bytes
        .try_into()
        .map_err(|_| format!("{field} must be {N} bytes"))
}

fn contract_result(result: dlc_sdk::Result<Contract>) -> Result<ContractResponse, String> {
    result.map(ContractResponse::from).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Oracles
// ---------------------------------------------------------------------------

pub fn add_oracle<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    public_key_hex: &str,
    label: &str,
) -> Result<OracleResponse, String> {
    let public_key: Point = parse_hex(public_key_hex, "oracle public key")?;
    let idx = node
        .add_oracle(&public_key, label)
        .map_err(|e| e.to_string())?;
    node.get_oracle(idx)
        .map(OracleResponse::from)
        .map_err(|e| e.to_string())
}

/// Register the oracle unless a record with the same key already exists.
pub fn ensure_oracle<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    public_key_hex: &str,
    label: &str,
) -> Result<OracleResponse, String> {
    let public_key: Point = parse_hex(public_key_hex, "oracle public key")?;
    let idx = match node.find_oracle(&public_key) {
        Ok(idx) => idx,
        Err(Error::NotFound(_)) => node
            .add_oracle(&public_key, label)
            .map_err(|e| e.to_string())?,
        Err(e) => return Err(e.to_string()),
    };
    node.get_oracle(idx)
        .map(OracleResponse::from)
        .map_err(|e| e.to_string())
}

pub fn list_oracles<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
) -> Result<Vec<OracleResponse>, String> {
    node.list_oracles()
        .map(|oracles| oracles.into_iter().map(OracleResponse::from).collect())
        .map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

pub fn new_contract<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
) -> Result<ContractResponse, String> {
    contract_result(node.new_contract())
}

pub fn get_contract<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    idx: u64,
) -> Result<ContractResponse, String> {
    contract_result(node.get_contract(ContractIdx(idx)))
}

pub fn list_contracts<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    status: Option<ContractStatus>,
) -> Result<Vec<ContractResponse>, String> {
    let filter = ContractFilter {
        status,
        ..Default::default()
    };
    node.list_contracts(&filter)
        .map(|contracts| contracts.into_iter().map(ContractResponse::from).collect())
        .map_err(|e| e.to_string())
}

pub async fn set_contract_oracle<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    idx: u64,
    oracle_idx: u64,
) -> Result<ContractResponse, String> {
    contract_result(
        node.set_contract_oracle(ContractIdx(idx), OracleIdx(oracle_idx))
            .await,
    )
}

pub async fn set_contract_r_point<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    idx: u64,
    r_point_hex: &str,
) -> Result<ContractResponse, String> {
    let r_point: Point = parse_hex(r_point_hex, "r_point")?;
    contract_result(node.set_contract_r_point(ContractIdx(idx), r_point).await)
}

pub async fn set_contract_settlement_time<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    idx: u64,
    settlement_time: u64,
) -> Result<ContractResponse, String> {
    contract_result(
        node.set_contract_settlement_time(ContractIdx(idx), settlement_time)
            .await,
    )
}

pub async fn set_contract_coin_type<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    idx: u64,
    coin_type: u32,
) -> Result<ContractResponse, String> {
    contract_result(node.set_contract_coin_type(ContractIdx(idx), coin_type).await)
}

pub async fn set_contract_funding<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    idx: u64,
    ours: u64,
    theirs: u64,
) -> Result<ContractResponse, String> {
    contract_result(node.set_contract_funding(ContractIdx(idx), ours, theirs).await)
}

pub async fn set_contract_division<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    idx: u64,
    value_all_ours: u64,
    value_all_theirs: u64,
) -> Result<ContractResponse, String> {
    contract_result(
        node.set_contract_division(ContractIdx(idx), value_all_ours, value_all_theirs)
            .await,
    )
}

pub async fn discard_contract<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    idx: u64,
) -> Result<(), String> {
    node.discard_contract(ContractIdx(idx))
        .await
        .map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

pub async fn offer_contract<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    idx: u64,
    peer_idx: u32,
) -> Result<ContractResponse, String> {
    contract_result(node.offer_contract(ContractIdx(idx), PeerIdx(peer_idx)).await)
}

pub async fn accept_contract<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    idx: u64,
) -> Result<ContractResponse, String> {
    contract_result(node.accept_contract(ContractIdx(idx)).await)
}

pub async fn decline_contract<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    idx: u64,
) -> Result<ContractResponse, String> {
    contract_result(node.decline_contract(ContractIdx(idx)).await)
}

pub async fn settle_contract<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    idx: u64,
    oracle_value: u64,
    signature_hex: &str,
) -> Result<ContractResponse, String> {
    let signature: [u8; 32] = parse_hex(signature_hex, "oracle signature")?;
    contract_result(
        node.settle_contract(ContractIdx(idx), oracle_value, signature)
            .await,
    )
}

pub fn contract_status<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    idx: u64,
) -> Result<StatusResponse, String> {
    let contract = node
        .get_contract(ContractIdx(idx))
        .map_err(|e| e.to_string())?;
    Ok(StatusResponse {
        idx,
        status: contract.status,
        is_active: contract.status == ContractStatus::Active,
        is_settled: contract.status == ContractStatus::Settled,
    })
}

pub async fn wait_for_contract<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    idx: u64,
    status: ContractStatus,
    timeout_secs: u64,
) -> Result<ContractResponse, String> {
    contract_result(
        node.wait_for_status(ContractIdx(idx), status, Duration::from_secs(timeout_secs))
            .await,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_arguments_are_length_checked() {
        assert!(parse_hex::<32>(&"ab".repeat(32), "sig").is_ok());
        let err = parse_hex::<32>("abcd", "sig").unwrap_err();
        assert_eq!(err, "sig must be 32 bytes");
        assert!(parse_hex::<33>("zz", "r_point").unwrap_err().contains("invalid r_point hex"));
    }

    #[test]
    fn contract_response_uses_camel_case() {
        let json = serde_json::to_value(ContractResponse::from(Contract::empty(
            ContractStatus::Draft,
            0,
        )))
        .unwrap();
        assert_eq!(json["status"], "Draft");
        assert!(json.get("fundingOurs").is_some());
        assert!(json.get("funding_ours").is_none());
    }
}
