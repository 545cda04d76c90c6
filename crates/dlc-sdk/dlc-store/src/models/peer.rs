use diesel::prelude::*;

use crate::schema::peers;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = peers)]
pub struct PeerRow {
    pub id: i32,
    /// Transport address, a 32-byte Nostr public key for the relay transport.
    pub address: Vec<u8>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = peers)]
pub struct NewPeerRow {
    pub id: i32,
    pub address: Vec<u8>,
}
