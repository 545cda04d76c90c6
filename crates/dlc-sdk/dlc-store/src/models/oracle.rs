use diesel::prelude::*;

use crate::schema::oracles;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = oracles)]
pub struct OracleRow {
    pub id: i32,
    pub public_key: Vec<u8>,
    pub label: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = oracles)]
pub struct NewOracleRow {
    pub public_key: Vec<u8>,
    pub label: String,
}
