//! HookDB registry node.
//!
//! Opens the registry store against the configured log, keeps the view in
//! sync until interrupted, then shuts replay and the log client down.
//!
//! Usage:
//!   hookdb [CONFIG_PATH]

use std::time::Duration;

use hookdb::config::Config;
use hookdb::log::init_log_client;
use hookdb::store::RegistryStore;
use hookdb::utils::bootstrap::init_tracing;
use tracing::{error, info, warn};

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref())?;
    info!(
        log_type = ?config.log.log_type,
        log = %config.log.name,
        "Starting hookdb"
    );

    let client = init_log_client(&config.log)?;
    let store = RegistryStore::builder(client)
        .log_name(config.log.name.clone())
        .replay(config.replay.clone())
        .on_restart_ceiling(|attempt, err| {
            error!(attempt, error = %err, "Registry log unreachable, view is going stale");
        })
        .open();

    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for shutdown signal");
                }
                break;
            }
            _ = ticker.tick() => {
                info!(
                    entries = store.len().await,
                    health = ?store.health(),
                    "Registry status"
                );
            }
        }
    }

    info!("Shutting down");
    store.close().await?;
    Ok(())
}
