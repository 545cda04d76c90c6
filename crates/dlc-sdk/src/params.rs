use std::fmt;

use nostr_sdk::secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// A 33-byte compressed secp256k1 point.
pub type Point = [u8; 33];

/// Node-local contract index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractIdx(pub u64);

impl fmt::Display for ContractIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node-local oracle index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OracleIdx(pub u64);

impl fmt::Display for OracleIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a connected peer, assigned by the transport's peer book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerIdx(pub u32);

impl fmt::Display for PeerIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content fingerprint that both nodes derive for the same offer.
///
/// Contract indices are node-local, so peer messages refer to contracts by
/// this value instead. The offerer's random nonce keeps fingerprints apart
/// when different nodes offer on the same oracle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractFingerprint(#[serde(with = "serde_hex::array")] pub [u8; 32]);

impl ContractFingerprint {
    /// SHA256(oracle_pubkey || r_point || settlement_time_be || offerer_idx_be || nonce).
    pub fn compute(
        oracle_pubkey: &Point,
        r_point: &Point,
        settlement_time: u64,
        offerer_idx: ContractIdx,
        nonce: &[u8; 32],
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(oracle_pubkey);
        hasher.update(r_point);
        hasher.update(settlement_time.to_be_bytes());
        hasher.update(offerer_idx.0.to_be_bytes());
        hasher.update(nonce);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(hex_to_array::<32>(s, "fingerprint")?))
    }
}

impl fmt::Display for ContractFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Largest amount or time a contract may carry, so that every value fits a
/// signed 64-bit column.
pub const MAX_CONTRACT_VALUE: u64 = i64::MAX as u64;

/// Reject values above `MAX_CONTRACT_VALUE`.
pub fn check_contract_value(value: u64, field: &str) -> Result<u64> {
    if value > MAX_CONTRACT_VALUE {
        return Err(Error::InvalidField(format!(
            "{field}: {value} exceeds {MAX_CONTRACT_VALUE}"
        )));
    }
    Ok(value)
}

/// Collateral each side locks into the funding transaction, in the smallest
/// currency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funding {
    pub ours: u64,
    pub theirs: u64,
}

impl Funding {
    /// Both amounts must be positive and their sum at most
    /// `MAX_CONTRACT_VALUE`, which also bounds every payout.
    pub fn new(ours: u64, theirs: u64) -> Result<Self> {
        if ours == 0 || theirs == 0 {
            return Err(Error::InvalidField(
                "funding amounts must both be positive".into(),
            ));
        }
        let total = ours
            .checked_add(theirs)
            .ok_or_else(|| Error::InvalidField("total funding overflows".into()))?;
        check_contract_value(total, "total funding")?;
        Ok(Self { ours, theirs })
    }

    pub fn total(&self) -> u64 {
        self.ours + self.theirs
    }

    /// The same funding seen from the counterparty.
    pub fn mirrored(&self) -> Self {
        Self {
            ours: self.theirs,
            theirs: self.ours,
        }
    }
}

/// Parse a compressed point, rejecting anything not on the curve.
pub fn parse_point(bytes: &Point, field: &str) -> Result<PublicKey> {
    PublicKey::from_slice(bytes)
        .map_err(|e| Error::InvalidField(format!("{field}: not a valid point: {e}")))
}

/// Decode a hex string into a fixed-size byte array.
pub(crate) fn hex_to_array<const N: usize>(hex_str: &str, field: &str) -> Result<[u8; N]> {
    let bytes =
        hex::decode(hex_str).map_err(|e| Error::Message(format!("{field}: hex decode: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| Error::Message(format!("{field}: expected {N} bytes")))
}

/// Hex string encodings for byte fields in JSON.
pub(crate) mod serde_hex {
    pub mod array {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer, const N: usize>(
            bytes: &[u8; N],
            s: S,
        ) -> Result<S::Ok, S::Error> {
            s.serialize_str(&hex::encode(bytes))
        }

        pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
            d: D,
        ) -> Result<[u8; N], D::Error> {
            let s = String::deserialize(d)?;
            let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
            bytes
                .try_into()
                .map_err(|_| serde::de::Error::custom(format!("expected {N} bytes")))
        }
    }

    pub mod vec {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(&hex::encode(bytes))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
            let s = String::deserialize(d)?;
            hex::decode(&s).map_err(serde::de::Error::custom)
        }
    }
}
