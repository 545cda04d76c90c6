use diesel::prelude::*;
use diesel::sql_types::Integer;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use dlc_sdk::{
    Contract, ContractFilter, ContractFingerprint, ContractIdx, Oracle, OracleIdx, PeerIdx, Point,
};

use crate::conversions::{new_contract_row, new_peer_row, peer_entry, row_id};
use crate::error::StoreError;
use crate::models::{ContractChangeset, ContractRow, NewOracleRow, OracleRow, PeerRow};
use crate::schema::{contracts, oracles, peers};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// SQLite-backed persistence for oracles and contracts.
///
/// All methods take `&mut self` because Diesel's `SqliteConnection` requires
/// `&mut` for all operations, including reads.
pub struct DlcStore {
    conn: SqliteConnection,
}

impl DlcStore {
    /// Open (or create) a store at the given file path. Runs migrations automatically.
    pub fn open(path: &str) -> crate::Result<Self> {
        Self::establish(path)
    }

    /// Open an in-memory store for tests.
    pub fn open_in_memory() -> crate::Result<Self> {
        Self::establish(":memory:")
    }

    fn establish(url: &str) -> crate::Result<Self> {
        let mut conn = SqliteConnection::establish(url)?;
        diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut conn)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(DlcStore { conn })
    }

    fn last_insert_rowid(&mut self) -> crate::Result<i32> {
        Ok(
            diesel::select(diesel::dsl::sql::<Integer>("last_insert_rowid()"))
                .get_result(&mut self.conn)?,
        )
    }

    // ==================== Oracles ====================

    pub fn insert_oracle(&mut self, public_key: &Point, label: &str) -> crate::Result<OracleIdx> {
        let row = NewOracleRow {
            public_key: public_key.to_vec(),
            label: label.to_string(),
        };
        diesel::insert_into(oracles::table)
            .values(&row)
            .execute(&mut self.conn)?;
        let id = self.last_insert_rowid()?;
        log::debug!("stored oracle {id} ({label})");
        Ok(OracleIdx(id as u64))
    }

    pub fn get_oracle(&mut self, idx: OracleIdx) -> crate::Result<Option<Oracle>> {
        let Some(id) = row_id(idx.0) else {
            return Ok(None);
        };
        let row: Option<OracleRow> = oracles::table
            .find(id)
            .first(&mut self.conn)
            .optional()?;
        row.as_ref().map(Oracle::try_from).transpose()
    }

    pub fn find_oracle(&mut self, public_key: &Point) -> crate::Result<Option<Oracle>> {
        let row: Option<OracleRow> = oracles::table
            .filter(oracles::public_key.eq(public_key.to_vec()))
            .first(&mut self.conn)
            .optional()?;
        row.as_ref().map(Oracle::try_from).transpose()
    }

    pub fn list_oracles(&mut self) -> crate::Result<Vec<Oracle>> {
        let rows: Vec<OracleRow> = oracles::table
            .order(oracles::id.asc())
            .load(&mut self.conn)?;
        rows.iter().map(Oracle::try_from).collect()
    }

    // ==================== Contracts ====================

    /// Insert a contract and return the allocated index. `contract.idx` is ignored.
    pub fn insert_contract(&mut self, contract: &Contract) -> crate::Result<ContractIdx> {
        let row = new_contract_row(contract)?;
        diesel::insert_into(contracts::table)
            .values(&row)
            .execute(&mut self.conn)?;
        let id = self.last_insert_rowid()?;
        Ok(ContractIdx(id as u64))
    }

    /// Overwrite every column of an existing contract.
    pub fn save_contract(&mut self, contract: &Contract) -> crate::Result<()> {
        let id = row_id(contract.idx.0).ok_or_else(|| {
            StoreError::InvalidData(format!("contract {} does not exist", contract.idx))
        })?;
        let changes = ContractChangeset::from(new_contract_row(contract)?);
        let updated = diesel::update(contracts::table.find(id))
            .set(&changes)
            .execute(&mut self.conn)?;
        if updated == 0 {
            return Err(StoreError::InvalidData(format!(
                "contract {} does not exist",
                contract.idx
            )));
        }
        Ok(())
    }

    pub fn get_contract(&mut self, idx: ContractIdx) -> crate::Result<Option<Contract>> {
        let Some(id) = row_id(idx.0) else {
            return Ok(None);
        };
        let row: Option<ContractRow> = contracts::table
            .find(id)
            .select(ContractRow::as_select())
            .first(&mut self.conn)
            .optional()?;
        row.as_ref().map(Contract::try_from).transpose()
    }

    /// The contract held with `peer` under `fingerprint`.
    pub fn find_contract_by_fingerprint(
        &mut self,
        peer: PeerIdx,
        fingerprint: &ContractFingerprint,
    ) -> crate::Result<Option<Contract>> {
        let Ok(peer) = i32::try_from(peer.0) else {
            return Ok(None);
        };
        let row: Option<ContractRow> = contracts::table
            .filter(contracts::peer_idx.eq(peer))
            .filter(contracts::fingerprint.eq(fingerprint.as_bytes().to_vec()))
            .select(ContractRow::as_select())
            .first(&mut self.conn)
            .optional()?;
        row.as_ref().map(Contract::try_from).transpose()
    }

    pub fn list_contracts(&mut self, filter: &ContractFilter) -> crate::Result<Vec<Contract>> {
        let mut query = contracts::table
            .select(ContractRow::as_select())
            .into_boxed();

        if let Some(status) = filter.status {
            query = query.filter(contracts::status.eq(status.as_u64() as i32));
        }
        if let Some(peer) = filter.peer_idx {
            let Ok(peer) = i32::try_from(peer.0) else {
                return Ok(Vec::new());
            };
            query = query.filter(contracts::peer_idx.eq(peer));
        }
        if let Some(fingerprint) = filter.fingerprint {
            query = query.filter(contracts::fingerprint.eq(fingerprint.as_bytes().to_vec()));
        }
        query = query.order(contracts::id.asc());
        if let Some(lim) = filter.limit {
            query = query.limit(i64::try_from(lim).unwrap_or(i64::MAX));
        }

        let rows: Vec<ContractRow> = query.load(&mut self.conn)?;
        rows.iter().map(Contract::try_from).collect()
    }

    /// Delete a contract row. Returns `false` if it did not exist.
    pub fn delete_contract(&mut self, idx: ContractIdx) -> crate::Result<bool> {
        let Some(id) = row_id(idx.0) else {
            return Ok(false);
        };
        let deleted = diesel::delete(contracts::table.find(id)).execute(&mut self.conn)?;
        Ok(deleted > 0)
    }

    // ==================== Peers ====================

    pub fn insert_peer(&mut self, idx: PeerIdx, address: &[u8]) -> crate::Result<()> {
        let row = new_peer_row(idx, address)?;
        diesel::insert_into(peers::table)
            .values(&row)
            .execute(&mut self.conn)?;
        log::debug!("stored peer {idx}");
        Ok(())
    }

    pub fn list_peers(&mut self) -> crate::Result<Vec<(PeerIdx, Vec<u8>)>> {
        let rows: Vec<PeerRow> = peers::table
            .select(PeerRow::as_select())
            .order(peers::id.asc())
            .load(&mut self.conn)?;
        rows.iter().map(peer_entry).collect()
    }
}

// ==================== ContractBackend trait impl ====================

impl dlc_sdk::ContractBackend for DlcStore {
    fn insert_oracle(&mut self, public_key: &Point, label: &str) -> Result<OracleIdx, String> {
        DlcStore::insert_oracle(self, public_key, label).map_err(|e| format!("{e}"))
    }

    fn get_oracle(&mut self, idx: OracleIdx) -> Result<Option<Oracle>, String> {
        DlcStore::get_oracle(self, idx).map_err(|e| format!("{e}"))
    }

    fn find_oracle(&mut self, public_key: &Point) -> Result<Option<Oracle>, String> {
        DlcStore::find_oracle(self, public_key).map_err(|e| format!("{e}"))
    }

    fn list_oracles(&mut self) -> Result<Vec<Oracle>, String> {
        DlcStore::list_oracles(self).map_err(|e| format!("{e}"))
    }

    fn insert_contract(&mut self, contract: &Contract) -> Result<ContractIdx, String> {
        DlcStore::insert_contract(self, contract).map_err(|e| format!("{e}"))
    }

    fn save_contract(&mut self, contract: &Contract) -> Result<(), String> {
        DlcStore::save_contract(self, contract).map_err(|e| format!("{e}"))
    }

    fn get_contract(&mut self, idx: ContractIdx) -> Result<Option<Contract>, String> {
        DlcStore::get_contract(self, idx).map_err(|e| format!("{e}"))
    }

    fn find_contract_by_fingerprint(
        &mut self,
        peer: PeerIdx,
        fingerprint: &ContractFingerprint,
    ) -> Result<Option<Contract>, String> {
        DlcStore::find_contract_by_fingerprint(self, peer, fingerprint).map_err(|e| format!("{e}"))
    }

    fn list_contracts(&mut self, filter: &ContractFilter) -> Result<Vec<Contract>, String> {
        DlcStore::list_contracts(self, filter).map_err(|e| format!("{e}"))
    }

    fn delete_contract(&mut self, idx: ContractIdx) -> Result<bool, String> {
        DlcStore::delete_contract(self, idx).map_err(|e| format!("{e}"))
    }

    fn insert_peer(&mut self, idx: PeerIdx, address: &[u8]) -> Result<(), String> {
        DlcStore::insert_peer(self, idx, address).map_err(|e| format!("{e}"))
    }

    fn list_peers(&mut self) -> Result<Vec<(PeerIdx, Vec<u8>)>, String> {
        DlcStore::list_peers(self).map_err(|e| format!("{e}"))
    }
}
