use dlc_sdk::{
    Contract, ContractFingerprint, ContractIdx, ContractStatus, DivisionTable, Funding, Oracle,
    OracleIdx, PayoutSplit, PeerIdx, SettlementRecord,
};

use crate::error::StoreError;
use crate::models::{ContractChangeset, ContractRow, NewContractRow, NewPeerRow, OracleRow, PeerRow};

pub fn vec_to_array<const N: usize>(
    v: &[u8],
    field: &str,
) -> std::result::Result<[u8; N], StoreError> {
    v.try_into().map_err(|_| {
        StoreError::InvalidData(format!("{field}: expected {N} bytes, got {}", v.len()))
    })
}

pub fn u64_to_i64(v: u64, field: &str) -> std::result::Result<i64, StoreError> {
    i64::try_from(v).map_err(|_| StoreError::InvalidData(format!("{field}: {v} out of range")))
}

pub fn i64_to_u64(v: i64, field: &str) -> std::result::Result<u64, StoreError> {
    u64::try_from(v).map_err(|_| StoreError::InvalidData(format!("{field}: negative value {v}")))
}

/// Row id for a node-local index. `None` if no row could have it.
pub fn row_id(idx: u64) -> Option<i32> {
    i32::try_from(idx).ok()
}

fn opt_u64_to_i64(v: Option<u64>, field: &str) -> std::result::Result<Option<i64>, StoreError> {
    v.map(|v| u64_to_i64(v, field)).transpose()
}

fn opt_i64_to_u64(v: Option<i64>, field: &str) -> std::result::Result<Option<u64>, StoreError> {
    v.map(|v| i64_to_u64(v, field)).transpose()
}

// --- SDK types -> rows ---

pub fn new_contract_row(contract: &Contract) -> std::result::Result<NewContractRow, StoreError> {
    let oracle_id = contract
        .oracle_idx
        .map(|o| {
            row_id(o.0).ok_or_else(|| StoreError::InvalidData(format!("oracle index {o}")))
        })
        .transpose()?;
    let peer_idx = contract
        .peer_idx
        .map(|p| {
            i32::try_from(p.0).map_err(|_| StoreError::InvalidData(format!("peer index {p}")))
        })
        .transpose()?;
    let division_json = contract
        .division
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::InvalidData(format!("division: {e}")))?;
    let coin_type = contract.coin_type.map(i64::from);
    let settlement = contract.settlement.as_ref();

    Ok(NewContractRow {
        oracle_id,
        r_point: contract.r_point.map(|p| p.to_vec()),
        settlement_time: opt_u64_to_i64(contract.settlement_time, "settlement_time")?,
        coin_type,
        funding_ours: opt_u64_to_i64(contract.funding.map(|f| f.ours), "funding_ours")?,
        funding_theirs: opt_u64_to_i64(contract.funding.map(|f| f.theirs), "funding_theirs")?,
        division_json,
        status: contract.status.as_u64() as i32,
        peer_idx,
        fingerprint: contract.fingerprint.map(|f| f.as_bytes().to_vec()),
        remote_idx: opt_u64_to_i64(contract.remote_idx.map(|r| r.0), "remote_idx")?,
        funding_txid: contract.funding_txid.map(|t| t.to_vec()),
        settlement_value: opt_u64_to_i64(settlement.map(|s| s.oracle_value), "settlement_value")?,
        settlement_ours: opt_u64_to_i64(settlement.map(|s| s.payout.ours), "settlement_ours")?,
        settlement_theirs: opt_u64_to_i64(
            settlement.map(|s| s.payout.theirs),
            "settlement_theirs",
        )?,
        settlement_tx: settlement.map(|s| s.settlement_tx.clone()),
        created_at: u64_to_i64(contract.created_at, "created_at")?,
        updated_at: u64_to_i64(contract.updated_at, "updated_at")?,
    })
}

impl From<NewContractRow> for ContractChangeset {
    fn from(row: NewContractRow) -> Self {
        ContractChangeset {
            oracle_id: row.oracle_id,
            r_point: row.r_point,
            settlement_time: row.settlement_time,
            coin_type: row.coin_type,
            funding_ours: row.funding_ours,
            funding_theirs: row.funding_theirs,
            division_json: row.division_json,
            status: row.status,
            peer_idx: row.peer_idx,
            fingerprint: row.fingerprint,
            remote_idx: row.remote_idx,
            funding_txid: row.funding_txid,
            settlement_value: row.settlement_value,
            settlement_ours: row.settlement_ours,
            settlement_theirs: row.settlement_theirs,
            settlement_tx: row.settlement_tx,
            updated_at: row.updated_at,
        }
    }
}

pub fn new_peer_row(idx: PeerIdx, address: &[u8]) -> std::result::Result<NewPeerRow, StoreError> {
    let id = i32::try_from(idx.0)
        .map_err(|_| StoreError::InvalidData(format!("peer index {idx}")))?;
    Ok(NewPeerRow {
        id,
        address: address.to_vec(),
    })
}

// --- Rows -> SDK types ---

pub fn peer_entry(row: &PeerRow) -> std::result::Result<(PeerIdx, Vec<u8>), StoreError> {
    let idx = u32::try_from(row.id)
        .map_err(|_| StoreError::InvalidData(format!("peer id {}", row.id)))?;
    Ok((PeerIdx(idx), row.address.clone()))
}

impl TryFrom<&OracleRow> for Oracle {
    type Error = StoreError;

    fn try_from(row: &OracleRow) -> std::result::Result<Self, Self::Error> {
        Ok(Oracle {
            idx: OracleIdx(row.id as u64),
            public_key: vec_to_array(&row.public_key, "public_key")?,
            label: row.label.clone(),
        })
    }
}

impl TryFrom<&ContractRow> for Contract {
    type Error = StoreError;

    fn try_from(row: &ContractRow) -> std::result::Result<Self, Self::Error> {
        let status = ContractStatus::from_u64(row.status as u64).ok_or_else(|| {
            StoreError::InvalidData(format!("invalid contract status: {}", row.status))
        })?;

        let funding = match (row.funding_ours, row.funding_theirs) {
            (Some(ours), Some(theirs)) => Some(Funding::new(
                i64_to_u64(ours, "funding_ours")?,
                i64_to_u64(theirs, "funding_theirs")?,
            )?),
            (None, None) => None,
            _ => {
                return Err(StoreError::InvalidData(format!(
                    "contract {}: half-set funding",
                    row.id
                )));
            }
        };

        let division = row
            .division_json
            .as_deref()
            .map(serde_json::from_str::<DivisionTable>)
            .transpose()
            .map_err(|e| StoreError::InvalidData(format!("division: {e}")))?;

        let settlement = match (
            row.settlement_value,
            row.settlement_ours,
            row.settlement_theirs,
            &row.settlement_tx,
        ) {
            (Some(value), Some(ours), Some(theirs), Some(tx)) => Some(SettlementRecord {
                oracle_value: i64_to_u64(value, "settlement_value")?,
                payout: PayoutSplit {
                    ours: i64_to_u64(ours, "settlement_ours")?,
                    theirs: i64_to_u64(theirs, "settlement_theirs")?,
                },
                settlement_tx: tx.clone(),
            }),
            _ => None,
        };

        Ok(Contract {
            idx: ContractIdx(row.id as u64),
            oracle_idx: row.oracle_id.map(|id| OracleIdx(id as u64)),
            r_point: row
                .r_point
                .as_deref()
                .map(|p| vec_to_array(p, "r_point"))
                .transpose()?,
            settlement_time: opt_i64_to_u64(row.settlement_time, "settlement_time")?,
            coin_type: row
                .coin_type
                .map(|c| {
                    u32::try_from(c)
                        .map_err(|_| StoreError::InvalidData(format!("coin type {c}")))
                })
                .transpose()?,
            funding,
            division,
            status,
            peer_idx: row.peer_idx.map(|p| PeerIdx(p as u32)),
            fingerprint: row
                .fingerprint
                .as_deref()
                .map(|f| vec_to_array(f, "fingerprint").map(ContractFingerprint))
                .transpose()?,
            remote_idx: opt_i64_to_u64(row.remote_idx, "remote_idx")?.map(ContractIdx),
            funding_txid: row
                .funding_txid
                .as_deref()
                .map(|t| vec_to_array(t, "funding_txid"))
                .transpose()?,
            settlement,
            created_at: i64_to_u64(row.created_at, "created_at")?,
            updated_at: i64_to_u64(row.updated_at, "updated_at")?,
        })
    }
}
