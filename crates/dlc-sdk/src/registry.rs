use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::oracle::Oracle;
use crate::params::{OracleIdx, Point, parse_point};
use crate::store_trait::{ContractBackend, lock_backend};

/// Known oracle public keys. Grows for the lifetime of the node; oracles
/// are never removed or modified.
pub struct OracleRegistry<B: ContractBackend> {
    backend: Arc<Mutex<B>>,
}

impl<B: ContractBackend> Clone for OracleRegistry<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
        }
    }
}

impl<B: ContractBackend> OracleRegistry<B> {
    pub fn new(backend: Arc<Mutex<B>>) -> Self {
        Self { backend }
    }

    /// Register an oracle. Fails with `DuplicateOracle` if the key is already known.
    pub fn add(&self, public_key: &Point, label: &str) -> Result<OracleIdx> {
        parse_point(public_key, "oracle public key")?;

        let mut backend = lock_backend(&self.backend)?;
        if backend.find_oracle(public_key).map_err(Error::Store)?.is_some() {
            return Err(Error::DuplicateOracle);
        }
        let idx = backend
            .insert_oracle(public_key, label)
            .map_err(Error::Store)?;
        log::info!("registered oracle {idx} ({label}) {}", hex::encode(public_key));
        Ok(idx)
    }

    /// Exact byte-equality lookup.
    pub fn find(&self, public_key: &Point) -> Result<OracleIdx> {
        lock_backend(&self.backend)?
            .find_oracle(public_key)
            .map_err(Error::Store)?
            .map(|o| o.idx)
            .ok_or_else(|| Error::NotFound(format!("oracle {}", hex::encode(public_key))))
    }

    pub fn get(&self, idx: OracleIdx) -> Result<Oracle> {
        lock_backend(&self.backend)?
            .get_oracle(idx)
            .map_err(Error::Store)?
            .ok_or_else(|| Error::NotFound(format!("oracle {idx}")))
    }

    pub fn list(&self) -> Result<Vec<Oracle>> {
        lock_backend(&self.backend)?
            .list_oracles()
            .map_err(Error::Store)
    }

    /// Resolve an oracle named by a counterparty. Unknown keys fail with
    /// `UnknownOracle` unless `auto_register` is set.
    pub(crate) fn resolve(&self, public_key: &Point, auto_register: bool) -> Result<OracleIdx> {
        match self.find(public_key) {
            Ok(idx) => Ok(idx),
            Err(Error::NotFound(_)) if auto_register => {
                log::warn!(
                    "auto-registering oracle {} asserted by counterparty",
                    hex::encode(public_key)
                );
                match self.add(public_key, "auto") {
                    Ok(idx) => Ok(idx),
                    // Lost a race with a concurrent registration.
                    Err(Error::DuplicateOracle) => self.find(public_key),
                    Err(e) => Err(e),
                }
            }
            Err(Error::NotFound(_)) => Err(Error::UnknownOracle),
            Err(e) => Err(e),
        }
    }
}
