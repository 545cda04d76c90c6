pub mod commands;
pub mod config;
pub mod identity;
pub mod state;

pub use config::NodeConfig;
pub use state::{AppNode, NodeState, StartError};

/// Install the `env_logger` backend. `RUST_LOG` overrides the default
/// `info` level; chatty network crates are capped at `warn`.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("tungstenite", log::LevelFilter::Warn)
        .filter_module("tokio_tungstenite", log::LevelFilter::Warn)
        .filter_module("nostr_relay_pool", log::LevelFilter::Warn)
        .filter_module("diesel", log::LevelFilter::Warn)
        .try_init();
}
