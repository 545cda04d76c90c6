use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dlc_sdk::{DEFAULT_RELAYS, NegotiatorConfig, NostrTransportConfig};

pub const CONFIG_FILE: &str = "node_config.json";
const DB_FILE: &str = "dlc.db";

/// Node settings persisted in `<data_dir>/node_config.json`.
///
/// Missing keys take their default, so older files keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeConfig {
    pub relays: Vec<String>,
    pub db_file: String,
    pub lock_wait_secs: u64,
    pub connect_timeout_secs: u64,
    pub auto_register_oracles: bool,
    pub event_capacity: usize,
    pub inbound_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let negotiator = NegotiatorConfig::default();
        Self {
            relays: DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect(),
            db_file: DB_FILE.to_string(),
            lock_wait_secs: negotiator.lock_wait.as_secs(),
            connect_timeout_secs: 5,
            auto_register_oracles: negotiator.auto_register_oracles,
            event_capacity: negotiator.event_capacity,
            inbound_capacity: 64,
        }
    }
}

impl NodeConfig {
    /// Read the config file, falling back to defaults if it is absent.
    /// A file that exists but does not parse is an error.
    pub fn load(data_dir: &Path) -> Result<Self, String> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        serde_json::from_str(&contents)
            .map_err(|e| format!("failed to parse {}: {e}", path.display()))
    }

    pub fn save(&self, data_dir: &Path) -> Result<(), String> {
        fs::create_dir_all(data_dir).map_err(|e| format!("failed to create data dir: {e}"))?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("failed to serialize config: {e}"))?;
        fs::write(data_dir.join(CONFIG_FILE), json)
            .map_err(|e| format!("failed to write config: {e}"))
    }

    pub fn negotiator(&self) -> NegotiatorConfig {
        NegotiatorConfig {
            lock_wait: Duration::from_secs(self.lock_wait_secs),
            auto_register_oracles: self.auto_register_oracles,
            event_capacity: self.event_capacity,
        }
    }

    pub fn transport(&self) -> NostrTransportConfig {
        NostrTransportConfig {
            relays: self.relays.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(NodeConfig::load(dir.path()).unwrap(), NodeConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "relays": ["ws://127.0.0.1:7777"], "autoRegisterOracles": true }"#,
        )
        .unwrap();

        let config = NodeConfig::load(dir.path()).unwrap();
        assert_eq!(config.relays, vec!["ws://127.0.0.1:7777".to_string()]);
        assert!(config.auto_register_oracles);
        assert_eq!(config.db_file, DB_FILE);
        assert!(config.negotiator().auto_register_oracles);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            lock_wait_secs: 9,
            ..Default::default()
        };
        config.save(dir.path()).unwrap();
        let loaded = NodeConfig::load(dir.path()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.negotiator().lock_wait, Duration::from_secs(9));
    }

    #[test]
    fn garbage_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "not json").unwrap();
        assert!(NodeConfig::load(dir.path()).is_err());
    }
}
