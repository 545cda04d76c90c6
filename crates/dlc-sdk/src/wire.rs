//! Peer message encoding.
//!
//! Messages are JSON objects tagged by `type`, with byte fields as hex.
//! Amounts, payouts and division tables are always from the sender's
//! perspective; the receiver mirrors them.

use serde::{Deserialize, Serialize};

use crate::division::{DivisionTable, PayoutSplit};
use crate::error::{Error, Result};
use crate::params::{ContractFingerprint, ContractIdx, Funding, Point, serde_hex};

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferMessage {
    pub fingerprint: ContractFingerprint,
    pub offerer_idx: ContractIdx,
    /// Random per offer, bound into the fingerprint.
    #[serde(with = "serde_hex::array")]
    pub nonce: [u8; 32],
    #[serde(with = "serde_hex::array")]
    pub oracle_pubkey: Point,
    #[serde(with = "serde_hex::array")]
    pub r_point: Point,
    pub settlement_time: u64,
    pub coin_type: u32,
    pub funding: Funding,
    pub division: DivisionTable,
}

impl OfferMessage {
    /// Whether `fingerprint` matches the terms carried in the message.
    pub fn fingerprint_is_consistent(&self) -> bool {
        ContractFingerprint::compute(
            &self.oracle_pubkey,
            &self.r_point,
            self.settlement_time,
            self.offerer_idx,
            &self.nonce,
        ) == self.fingerprint
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptMessage {
    pub fingerprint: ContractFingerprint,
    pub acceptor_idx: ContractIdx,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectMessage {
    pub fingerprint: ContractFingerprint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleMessage {
    pub fingerprint: ContractFingerprint,
    pub oracle_value: u64,
    #[serde(with = "serde_hex::array")]
    pub oracle_signature: [u8; 32],
    pub payout: PayoutSplit,
    #[serde(with = "serde_hex::vec")]
    pub settlement_tx: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleAckMessage {
    pub fingerprint: ContractFingerprint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    Offer(OfferMessage),
    Accept(AcceptMessage),
    Reject(RejectMessage),
    Settle(SettleMessage),
    SettleAck(SettleAckMessage),
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    #[serde(flatten)]
    message: PeerMessage,
}

impl PeerMessage {
    pub fn fingerprint(&self) -> &ContractFingerprint {
        match self {
            PeerMessage::Offer(m) => &m.fingerprint,
            PeerMessage::Accept(m) => &m.fingerprint,
            PeerMessage::Reject(m) => &m.fingerprint,
            PeerMessage::Settle(m) => &m.fingerprint,
            PeerMessage::SettleAck(m) => &m.fingerprint,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::Offer(_) => "offer",
            PeerMessage::Accept(_) => "accept",
            PeerMessage::Reject(_) => "reject",
            PeerMessage::Settle(_) => "settle",
            PeerMessage::SettleAck(_) => "settle_ack",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&Envelope {
            version: PROTOCOL_VERSION,
            message: self.clone(),
        })
        .map_err(|e| Error::Message(format!("encode {}: {e}", self.kind())))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| Error::Message(e.to_string()))?;
        if envelope.version != PROTOCOL_VERSION {
            return Err(Error::Message(format!(
                "unsupported protocol version {}",
                envelope.version
            )));
        }
        Ok(envelope.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::hex_to_array;

    const ORACLE: &str = "03c0d496ef6656fe102a689abc162ceeae166832d826f8750c94d797c92eedd465";
    const R_POINT: &str = "027168bba1aaecce0500509df2ff5e35a4f55a26a8af7ceacd346045eceb1786ad";

    fn offer() -> OfferMessage {
        let oracle_pubkey: Point = hex_to_array(ORACLE, "oracle").unwrap();
        let r_point: Point = hex_to_array(R_POINT, "r").unwrap();
        OfferMessage {
            fingerprint: ContractFingerprint::compute(
                &oracle_pubkey,
                &r_point,
                1_528_848_000,
                ContractIdx(1),
                &[0x5a; 32],
            ),
            offerer_idx: ContractIdx(1),
            nonce: [0x5a; 32],
            oracle_pubkey,
            r_point,
            settlement_time: 1_528_848_000,
            coin_type: 257,
            funding: Funding::new(100_000_000, 100_000_000).unwrap(),
            division: DivisionTable::linear(20_000, 10_000, 200_000_000).unwrap(),
        }
    }

    #[test]
    fn offer_is_tagged_json_with_hex_fields() {
        let bytes = PeerMessage::Offer(offer()).encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], "offer");
        assert_eq!(json["version"], 1);
        assert_eq!(json["oracle_pubkey"], ORACLE);
        assert_eq!(json["r_point"], R_POINT);
        assert_eq!(json["nonce"], hex::encode([0x5a; 32]));

        let back = PeerMessage::decode(&bytes).unwrap();
        assert_eq!(back, PeerMessage::Offer(offer()));
    }

    #[test]
    fn settle_roundtrips_signature_and_tx() {
        let msg = PeerMessage::Settle(SettleMessage {
            fingerprint: offer().fingerprint,
            oracle_value: 15_161,
            oracle_signature: [0xab; 32],
            payout: PayoutSplit {
                ours: 103_220_000,
                theirs: 96_780_000,
            },
            settlement_tx: vec![1, 2, 3],
        });
        let bytes = msg.encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], "settle");
        assert_eq!(json["settlement_tx"], "010203");
        assert_eq!(PeerMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn settle_ack_uses_snake_case_tag() {
        let msg = PeerMessage::SettleAck(SettleAckMessage {
            fingerprint: offer().fingerprint,
        });
        let json: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "settle_ack");
    }

    #[test]
    fn wrong_version_is_refused() {
        let fp = offer().fingerprint.to_hex();
        let raw = format!(r#"{{"version":2,"type":"reject","fingerprint":"{fp}"}}"#);
        assert!(matches!(
            PeerMessage::decode(raw.as_bytes()),
            Err(Error::Message(_))
        ));
        let raw = format!(r#"{{"version":1,"type":"reject","fingerprint":"{fp}"}}"#);
        assert!(PeerMessage::decode(raw.as_bytes()).is_ok());
    }

    #[test]
    fn garbage_is_a_message_error() {
        assert!(matches!(
            PeerMessage::decode(b"not json"),
            Err(Error::Message(_))
        ));
        assert!(matches!(
            PeerMessage::decode(br#"{"version":1,"type":"bogus"}"#),
            Err(Error::Message(_))
        ));
    }

    #[test]
    fn fingerprint_consistency_check() {
        let mut msg = offer();
        assert!(msg.fingerprint_is_consistent());
        msg.settlement_time += 1;
        assert!(!msg.fingerprint_is_consistent());

        let mut msg = offer();
        msg.nonce = [0x5b; 32];
        assert!(!msg.fingerprint_is_consistent());
    }
}
