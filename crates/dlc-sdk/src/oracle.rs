use nostr_sdk::secp256k1::{self, PublicKey, Scalar, Secp256k1};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::params::{OracleIdx, Point, parse_point};

/// An oracle known to this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oracle {
    pub idx: OracleIdx,
    #[serde(with = "crate::params::serde_hex::array")]
    pub public_key: Point,
    pub label: String,
}

/// Construct the oracle message for a numeric outcome: the value as a
/// 32-byte big-endian integer.
pub fn attestation_message(value: u64) -> [u8; 32] {
    let mut msg = [0u8; 32];
    msg[24..].copy_from_slice(&value.to_be_bytes());
    msg
}

/// Challenge scalar e = SHA256(message || x(R)).
pub fn attestation_challenge(r_point: &Point, value: u64) -> Result<Scalar> {
    let mut hasher = Sha256::new();
    hasher.update(attestation_message(value));
    hasher.update(&r_point[1..]);
    let digest: [u8; 32] = hasher.finalize().into();
    Scalar::from_be_bytes(digest)
        .map_err(|_| Error::InvalidField("attestation challenge out of range".into()))
}

/// The point s·G an honest oracle's signature for `value` must produce:
/// R − e·A. Computable from public data alone, so both parties can derive
/// it before the attestation exists.
pub fn signature_point<C: secp256k1::Verification>(
    secp: &Secp256k1<C>,
    oracle_pubkey: &Point,
    r_point: &Point,
    value: u64,
) -> Result<PublicKey> {
    let a = parse_point(oracle_pubkey, "oracle_pubkey")?;
    let r = parse_point(r_point, "r_point")?;
    let e = attestation_challenge(r_point, value)?;
    let ea = a
        .mul_tweak(secp, &e)
        .map_err(|e| Error::InvalidField(format!("e*A: {e}")))?;
    r.combine(&ea.negate(secp))
        .map_err(|e| Error::InvalidField(format!("R - e*A: {e}")))
}

/// Verifies an oracle's signature over an attested value.
///
/// Settlement takes this as a trait object so the commitment scheme can be
/// swapped without touching the engine.
pub trait AttestationVerifier: Send + Sync {
    fn verify(
        &self,
        oracle_pubkey: &Point,
        r_point: &Point,
        value: u64,
        signature: &[u8; 32],
    ) -> Result<()>;
}

/// Schnorr-style numeric attestation: valid iff s·G == R − e·A.
pub struct SchnorrNumericVerifier {
    secp: Secp256k1<secp256k1::All>,
}

impl SchnorrNumericVerifier {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }
}

impl Default for SchnorrNumericVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl AttestationVerifier for SchnorrNumericVerifier {
    fn verify(
        &self,
        oracle_pubkey: &Point,
        r_point: &Point,
        value: u64,
        signature: &[u8; 32],
    ) -> Result<()> {
        let expected = signature_point(&self.secp, oracle_pubkey, r_point, value)
            .map_err(|_| Error::InvalidSignature)?;
        let s = secp256k1::SecretKey::from_slice(signature).map_err(|_| Error::InvalidSignature)?;
        if PublicKey::from_secret_key(&self.secp, &s) == expected {
            Ok(())
        } else {
            Err(Error::InvalidSignature)
        }
    }
}

/// Produce s = k − e·a for `value`. Only used to fabricate attestations in
/// tests; real attestations come from the oracle.
#[cfg(any(test, feature = "testing"))]
pub fn sign_numeric_attestation(
    oracle_secret: &secp256k1::SecretKey,
    nonce: &secp256k1::SecretKey,
    value: u64,
) -> Result<[u8; 32]> {
    let secp = Secp256k1::new();
    let r_point = PublicKey::from_secret_key(&secp, nonce).serialize();
    let e = attestation_challenge(&r_point, value)?;
    let ea = oracle_secret
        .mul_tweak(&e)
        .map_err(|e| Error::InvalidField(format!("e*a: {e}")))?;
    let s = nonce
        .add_tweak(&Scalar::from(ea.negate()))
        .map_err(|e| Error::InvalidField(format!("k - e*a: {e}")))?;
    Ok(s.secret_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::hex_to_array;

    const ORACLE_PUBKEY: &str =
        "03c0d496ef6656fe102a689abc162ceeae166832d826f8750c94d797c92eedd465";
    const R_POINT: &str = "027168bba1aaecce0500509df2ff5e35a4f55a26a8af7ceacd346045eceb1786ad";
    const SIG: &str = "9e349c50db6d07d5d8b12b7ada7f91d13af742653ff57ffb0b554170536faeac";

    fn vector() -> (Point, Point, [u8; 32]) {
        (
            hex_to_array(ORACLE_PUBKEY, "a").unwrap(),
            hex_to_array(R_POINT, "r").unwrap(),
            hex_to_array(SIG, "s").unwrap(),
        )
    }

    #[test]
    fn message_is_big_endian_value() {
        let msg = attestation_message(15_161);
        assert_eq!(&msg[..30], &[0u8; 30]);
        assert_eq!(&msg[30..], &[0x3b, 0x39]);
    }

    #[test]
    fn published_attestation_verifies() {
        let (a, r, s) = vector();
        SchnorrNumericVerifier::new()
            .verify(&a, &r, 15_161, &s)
            .unwrap();
    }

    #[test]
    fn wrong_value_is_rejected() {
        let (a, r, s) = vector();
        let err = SchnorrNumericVerifier::new()
            .verify(&a, &r, 15_162, &s)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSignature));
    }

    #[test]
    fn swapped_keys_are_rejected() {
        let (a, r, s) = vector();
        let err = SchnorrNumericVerifier::new()
            .verify(&r, &a, 15_161, &s)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSignature));
    }

    #[test]
    fn zero_signature_is_rejected() {
        let (a, r, _) = vector();
        let err = SchnorrNumericVerifier::new()
            .verify(&a, &r, 15_161, &[0u8; 32])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSignature));
    }

    #[test]
    fn sign_then_verify() {
        let secp = Secp256k1::new();
        let oracle = secp256k1::SecretKey::from_slice(&[0x11; 32]).unwrap();
        let nonce = secp256k1::SecretKey::from_slice(&[0x22; 32]).unwrap();
        let a = PublicKey::from_secret_key(&secp, &oracle).serialize();
        let r = PublicKey::from_secret_key(&secp, &nonce).serialize();

        let sig = sign_numeric_attestation(&oracle, &nonce, 42).unwrap();
        let verifier = SchnorrNumericVerifier::new();
        verifier.verify(&a, &r, 42, &sig).unwrap();
        assert!(verifier.verify(&a, &r, 43, &sig).is_err());
    }

    #[test]
    fn oracle_serializes_key_as_hex() {
        let (a, _, _) = vector();
        let oracle = Oracle {
            idx: OracleIdx(1),
            public_key: a,
            label: "Tutorial".into(),
        };
        let json = serde_json::to_string(&oracle).unwrap();
        assert!(json.contains(ORACLE_PUBKEY));
        let back: Oracle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, oracle);
    }
}
