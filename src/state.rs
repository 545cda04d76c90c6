use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use nostr_sdk::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use dlc_sdk::{DlcNode, FundingEvent, NostrTransport, SystemClock, TransportError, Wallet};
use dlc_store::{DlcStore, StoreError};

use crate::config::NodeConfig;
use crate::identity::{self, IdentityResponse};

/// The node as wired by the app layer: SQLite persistence, Nostr transport.
pub type AppNode = DlcNode<DlcStore, NostrTransport>;

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("config error: {0}")]
    Config(String),

    #[error("identity error: {0}")]
    Identity(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// A running node and the background tasks feeding it.
pub struct NodeState {
    pub node: AppNode,
    pub config: NodeConfig,
    keys: Keys,
    data_dir: PathBuf,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeState {
    /// Load config and identity from `data_dir`, open the store, connect to
    /// the relays and start routing inbound messages and funding events.
    pub async fn start(
        data_dir: &Path,
        wallet: Arc<dyn Wallet>,
        funding: mpsc::Receiver<FundingEvent>,
    ) -> Result<Self, StartError> {
        let config = NodeConfig::load(data_dir).map_err(StartError::Config)?;
        let keys = identity::load_or_generate_keys(data_dir).map_err(StartError::Identity)?;

        let db_path = data_dir.join(&config.db_file);
        let backend = Arc::new(Mutex::new(DlcStore::open(&db_path.to_string_lossy())?));
        // Peer indices are stored next to the contracts that reference them.
        let transport =
            NostrTransport::with_directory(keys.clone(), config.transport(), backend.clone())?;

        let node = DlcNode::new(
            backend,
            Arc::new(transport),
            wallet,
            Arc::new(SystemClock),
            config.negotiator(),
        );

        let (relay_task, inbound) = node.transport().start(config.inbound_capacity).await?;
        let router_task = node.spawn_inbound_loop(inbound);
        let funding_task = node.spawn_funding_listener(funding);
        log::info!(
            "node {} started with {} relay(s), data in {}",
            keys.public_key().to_hex(),
            config.relays.len(),
            data_dir.display()
        );

        Ok(Self {
            node,
            config,
            keys,
            data_dir: data_dir.to_path_buf(),
            tasks: vec![relay_task, router_task, funding_task],
        })
    }

    pub fn identity(&self) -> Result<IdentityResponse, String> {
        IdentityResponse::from_keys(&self.keys)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Register a counterparty by its hex or npub public key and return the
    /// peer index to offer contracts to.
    pub fn connect_peer(&self, public_key: &str) -> Result<u32, String> {
        let public_key =
            PublicKey::parse(public_key.trim()).map_err(|e| format!("invalid public key: {e}"))?;
        self.node
            .transport()
            .connect_peer(public_key)
            .map(|peer| peer.0)
            .map_err(|e| e.to_string())
    }

    /// Stop the background tasks. Contract state is already persisted.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        log::info!("node {} stopped", self.keys.public_key().to_hex());
    }
}
