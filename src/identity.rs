use std::path::Path;

use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

pub const IDENTITY_FILE: &str = "nostr_identity.key";

/// Public side of the node's Nostr identity, as reported to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    pub pubkey_hex: String,
    pub npub: String,
}

impl IdentityResponse {
    pub fn from_keys(keys: &Keys) -> Result<Self, String> {
        Ok(Self {
            pubkey_hex: keys.public_key().to_hex(),
            npub: keys
                .public_key()
                .to_bech32()
                .map_err(|e| format!("bech32 error: {e}"))?,
        })
    }
}

/// Load or generate a Nostr keypair.
///
/// Persists the secret key as hex in `<data_dir>/nostr_identity.key`.
pub fn load_or_generate_keys(data_dir: &Path) -> Result<Keys, String> {
    let key_path = data_dir.join(IDENTITY_FILE);

    if key_path.exists() {
        let hex_str = std::fs::read_to_string(&key_path)
            .map_err(|e| format!("failed to read key file: {e}"))?;
        let secret_key = SecretKey::from_hex(hex_str.trim())
            .map_err(|e| format!("failed to parse secret key: {e}"))?;
        Ok(Keys::new(secret_key))
    } else {
        let keys = Keys::generate();
        std::fs::create_dir_all(data_dir)
            .map_err(|e| format!("failed to create data dir: {e}"))?;
        std::fs::write(&key_path, keys.secret_key().to_secret_hex())
            .map_err(|e| format!("failed to write key file: {e}"))?;
        log::info!("generated node identity {}", keys.public_key().to_hex());
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_stable_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_generate_keys(dir.path()).unwrap();
        let second = load_or_generate_keys(dir.path()).unwrap();
        assert_eq!(first.public_key(), second.public_key());
        assert!(dir.path().join(IDENTITY_FILE).exists());
    }

    #[test]
    fn corrupt_key_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(IDENTITY_FILE), "zz").unwrap();
        let err = load_or_generate_keys(dir.path()).unwrap_err();
        assert!(err.contains("failed to parse secret key"));
    }

    #[test]
    fn response_carries_hex_and_npub() {
        let keys = Keys::generate();
        let response = IdentityResponse::from_keys(&keys).unwrap();
        assert_eq!(response.pubkey_hex, keys.public_key().to_hex());
        assert!(response.npub.starts_with("npub1"));
    }
}
