use diesel::prelude::*;

use crate::schema::contracts;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = contracts)]
pub struct ContractRow {
    pub id: i32,
    pub oracle_id: Option<i32>,
    pub r_point: Option<Vec<u8>>,
    pub settlement_time: Option<i64>,
    pub coin_type: Option<i64>,
    pub funding_ours: Option<i64>,
    pub funding_theirs: Option<i64>,
    /// `DivisionTable` as a JSON array of points.
    pub division_json: Option<String>,
    pub status: i32,
    pub peer_idx: Option<i32>,
    pub fingerprint: Option<Vec<u8>>,
    pub remote_idx: Option<i64>,
    pub funding_txid: Option<Vec<u8>>,
    pub settlement_value: Option<i64>,
    pub settlement_ours: Option<i64>,
    pub settlement_theirs: Option<i64>,
    pub settlement_tx: Option<Vec<u8>>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = contracts)]
pub struct NewContractRow {
    pub oracle_id: Option<i32>,
    pub r_point: Option<Vec<u8>>,
    pub settlement_time: Option<i64>,
    pub coin_type: Option<i64>,
    pub funding_ours: Option<i64>,
    pub funding_theirs: Option<i64>,
    pub division_json: Option<String>,
    pub status: i32,
    pub peer_idx: Option<i32>,
    pub fingerprint: Option<Vec<u8>>,
    pub remote_idx: Option<i64>,
    pub funding_txid: Option<Vec<u8>>,
    pub settlement_value: Option<i64>,
    pub settlement_ours: Option<i64>,
    pub settlement_theirs: Option<i64>,
    pub settlement_tx: Option<Vec<u8>>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Full overwrite of a contract row; `None` clears the column.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = contracts, treat_none_as_null = true)]
pub struct ContractChangeset {
    pub oracle_id: Option<i32>,
    pub r_point: Option<Vec<u8>>,
    pub settlement_time: Option<i64>,
    pub coin_type: Option<i64>,
    pub funding_ours: Option<i64>,
    pub funding_theirs: Option<i64>,
    pub division_json: Option<String>,
    pub status: i32,
    pub peer_idx: Option<i32>,
    pub fingerprint: Option<Vec<u8>>,
    pub remote_idx: Option<i64>,
    pub funding_txid: Option<Vec<u8>>,
    pub settlement_value: Option<i64>,
    pub settlement_ours: Option<i64>,
    pub settlement_theirs: Option<i64>,
    pub settlement_tx: Option<Vec<u8>>,
    pub updated_at: i64,
}
