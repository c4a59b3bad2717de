//! Notify-based configuration hot-reload watcher.
//!
//! - Watches a single JSON file using notify::RecommendedWatcher.
//! - On create/modify events, reloads and validates the file and atomically
//!   replaces the shared tier table. Buckets already created keep their
//!   limits unless the tier change policy is `rebind`.

use crate::config::loader::load_rate_limit_config_from_file;
use crate::config::TierTable;
use crate::errors::RateLimitError;
use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Watch the tier configuration file and swap in a new [`TierTable`] on
/// every valid change. Invalid files are logged and the old table stays.
pub async fn watch_config_file(
    path: PathBuf,
    shared_table: Arc<ArcSwap<TierTable>>,
) -> Result<(), notify::Error> {
    // Bridge the watcher's callback thread to this task.
    let (tx, mut rx) = mpsc::channel(1);

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Err(e) = tx.blocking_send(res) {
                debug!("Failed to send config file event: {}", e);
            }
        },
        notify::Config::default(),
    )?;

    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    info!("Watching config file for changes: {}", path.display());

    while let Some(res) = rx.recv().await {
        match res {
            Ok(event) => {
                if should_reload(&event) {
                    info!(
                        "Config file change detected. Event: {:?}. Triggering reload.",
                        event.kind
                    );
                    reload_config(&path, &shared_table).await;
                } else {
                    debug!("Ignoring irrelevant filesystem event: {:?}", event.kind);
                }
            }
            Err(e) => {
                crate::metrics::record_config_reload(false);
                error!("Error watching config file: {}", e);
            }
        }
    }

    warn!("Configuration watcher task is shutting down.");
    Ok(())
}

fn should_reload(event: &Event) -> bool {
    matches!(
        event.kind,
        notify::EventKind::Modify(_) | notify::EventKind::Create(_)
    )
}

/// Reload the file and swap the table in. Returns whether the swap happened.
pub(crate) async fn reload_config(path: &Path, shared_table: &Arc<ArcSwap<TierTable>>) -> bool {
    let new_config = match load_rate_limit_config_from_file(path).await {
        Ok(config) => config,
        Err(e) => {
            crate::metrics::record_config_reload(false);
            match e {
                RateLimitError::FileSystemError(io_err) => error!(
                    "Failed to read config file '{}': {}. Keeping old config.",
                    path.display(),
                    io_err
                ),
                RateLimitError::JsonError(json_err) => error!(
                    "Failed to parse JSON from '{}': {}. Keeping old config.",
                    path.display(),
                    json_err
                ),
                other => error!(
                    "New configuration in '{}' is invalid: {}. Keeping old config.",
                    path.display(),
                    other
                ),
            }
            return false;
        }
    };

    let current = shared_table.load().get_full_config();
    if current.registry != new_config.registry {
        warn!(
            "Registry bounds changed in '{}'. max_keys and idle_timeout_secs apply after restart.",
            path.display()
        );
    }

    let new_table = match TierTable::new(new_config) {
        Ok(table) => table,
        Err(e) => {
            crate::metrics::record_config_reload(false);
            error!("Failed to build tier table: {}. Keeping old config.", e);
            return false;
        }
    };

    crate::metrics::update_config_metrics(new_table.stats().configured_tier_count);
    shared_table.store(Arc::new(new_table));
    crate::metrics::record_config_reload(true);
    info!("Configuration hot-reloaded successfully. New buckets use the new tier limits.");
    true
}
