//! Log-backed registry store.
//!
//! `RegistryStore` treats a compacted log as its database:
//! - writes validate, append the full document to the log keyed by its
//!   registry key, and only then update the in-memory view
//! - reads are served from the view alone and always return copies
//! - a background replay task tails the log from the oldest retained record
//!   and folds every record (including this process's own) into the view
//!
//! Read-your-writes holds for writes made through this instance. Writes from
//! other processes become visible once replay delivers them; the log's order
//! decides the winner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use crate::config::Config;
use crate::log::{LogClient, LogError, DEFAULT_LOG_NAME};
use crate::model::{derive_key, FunctionConfig, RegistryKey, Status};
use crate::validation::{validate_function_config, ValidationError};

mod cache;
mod replay;

pub use cache::{Fold, RegistryCache};
pub use replay::{ReplayConfig, ReplayHealth, RestartAlert};

use replay::ReplayTask;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors returned by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document already exists: {0}")]
    AlreadyExists(RegistryKey),

    #[error("document not found: {0}")]
    NotFound(RegistryKey),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    LogUnavailable(#[from] LogError),

    #[error("failed to encode document: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// Builder for [`RegistryStore`].
pub struct StoreBuilder {
    client: Arc<dyn LogClient>,
    log_name: String,
    replay: ReplayConfig,
    alert: Option<RestartAlert>,
}

impl StoreBuilder {
    /// Log holding the registry documents.
    pub fn log_name(mut self, name: impl Into<String>) -> Self {
        self.log_name = name.into();
        self
    }

    pub fn replay(mut self, config: ReplayConfig) -> Self {
        self.replay = config;
        self
    }

    /// Hook invoked when replay restarts exceed the configured ceiling.
    pub fn on_restart_ceiling<F>(mut self, alert: F) -> Self
    where
        F: Fn(usize, &LogError) + Send + Sync + 'static,
    {
        self.alert = Some(Arc::new(alert));
        self
    }

    /// Open the store and start replaying the log.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(self) -> RegistryStore {
        let cache = Arc::new(RegistryCache::new());
        let (health_tx, health_rx) = watch::channel(ReplayHealth::Starting);
        let replay = ReplayTask::spawn(
            Arc::clone(&self.client),
            self.log_name.clone(),
            Arc::clone(&cache),
            self.replay,
            health_tx,
            self.alert,
        );

        info!(log = %self.log_name, "Registry store opened");

        RegistryStore {
            client: self.client,
            log_name: self.log_name,
            cache,
            writes: Mutex::new(()),
            health: health_rx,
            replay: Mutex::new(replay),
            closed: AtomicBool::new(false),
        }
    }
}

/// Function registry materialized from a compacted log.
pub struct RegistryStore {
    client: Arc<dyn LogClient>,
    log_name: String,
    cache: Arc<RegistryCache>,
    /// Serializes check-append-cache sequences.
    writes: Mutex<()>,
    health: watch::Receiver<ReplayHealth>,
    replay: Mutex<ReplayTask>,
    closed: AtomicBool,
}

impl RegistryStore {
    pub fn builder(client: Arc<dyn LogClient>) -> StoreBuilder {
        StoreBuilder {
            client,
            log_name: DEFAULT_LOG_NAME.to_string(),
            replay: ReplayConfig::default(),
            alert: None,
        }
    }

    /// Open a store with settings from `config`.
    pub fn from_config(client: Arc<dyn LogClient>, config: &Config) -> Self {
        Self::builder(client)
            .log_name(config.log.name.clone())
            .replay(config.replay.clone())
            .open()
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    /// Create a new function document.
    ///
    /// Sets `id`, `created_at` and `updated_at`. Fails with `AlreadyExists`
    /// when the key is already present.
    #[tracing::instrument(
        name = "store.create",
        skip_all,
        fields(tenant = %doc.tenant, name = %doc.name)
    )]
    pub async fn create(&self, doc: FunctionConfig) -> Result<RegistryKey> {
        validate_function_config(&doc)?;
        let _guard = self.writes.lock().await;
        self.create_locked(doc).await
    }

    async fn create_locked(&self, mut doc: FunctionConfig) -> Result<RegistryKey> {
        let key = doc.registry_key();
        if self.cache.contains(&key).await {
            return Err(StoreError::AlreadyExists(key));
        }

        let now = Utc::now();
        doc.id = key;
        doc.created_at = Some(now);
        doc.updated_at = Some(now);
        self.append_and_cache(doc).await
    }

    /// Replace a function document, creating it when absent.
    ///
    /// `id` and `created_at` are kept from the stored copy; everything else
    /// comes from `doc`.
    #[tracing::instrument(
        name = "store.update",
        skip_all,
        fields(tenant = %doc.tenant, name = %doc.name)
    )]
    pub async fn update(&self, mut doc: FunctionConfig) -> Result<RegistryKey> {
        validate_function_config(&doc)?;
        let _guard = self.writes.lock().await;

        let key = doc.registry_key();
        let Some(current) = self.cache.get(&key).await else {
            return self.create_locked(doc).await;
        };

        info!(key = %key, status = %doc.function_status, "Upserting function configuration");
        doc.id = current.id;
        doc.created_at = current.created_at;
        doc.updated_at = Some(Utc::now());
        self.append_and_cache(doc).await
    }

    /// Delete the function `(tenant, name)`.
    pub async fn delete(&self, tenant: &str, name: &str) -> Result<RegistryKey> {
        self.delete_by_key(&derive_key(tenant, name)).await
    }

    /// Write a tombstone for `key` and evict it.
    #[tracing::instrument(name = "store.delete", skip_all, fields(key = %key))]
    pub async fn delete_by_key(&self, key: &RegistryKey) -> Result<RegistryKey> {
        let _guard = self.writes.lock().await;

        let mut doc = self
            .cache
            .get(key)
            .await
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        let now = Utc::now();
        doc.function_status = Status::Deleted;
        doc.deleted_at = Some(now);
        doc.updated_at = Some(now);
        self.append_and_cache(doc).await
    }

    async fn append_and_cache(&self, doc: FunctionConfig) -> Result<RegistryKey> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::LogUnavailable(LogError::Closed));
        }

        let payload = serde_json::to_vec(&doc)?;
        let key = doc.id.clone();
        self.cache.begin_local(&key, payload.clone()).await;
        if let Err(e) = self
            .client
            .append(&self.log_name, key.as_str(), payload.clone())
            .await
        {
            self.cache.abort_local(&key, &payload).await;
            return Err(e.into());
        }
        debug!(key = %key, log = %self.log_name, "Appended registry record");

        self.cache.commit_local(doc, &payload).await;
        Ok(key)
    }

    pub async fn get_by_key(&self, key: &RegistryKey) -> Result<FunctionConfig> {
        self.cache
            .get(key)
            .await
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    pub async fn get_by_topic(&self, tenant: &str, name: &str) -> Result<FunctionConfig> {
        self.get_by_key(&derive_key(tenant, name)).await
    }

    /// Snapshot of every live document, in no particular order.
    pub async fn load(&self) -> Vec<FunctionConfig> {
        self.cache.snapshot().await
    }

    pub async fn len(&self) -> usize {
        self.cache.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.is_empty().await
    }

    /// The view follows the log on its own; there is nothing to sync.
    pub fn sync(&self) -> Result<()> {
        Err(StoreError::Unsupported(
            "the registry view is kept in sync by log replay",
        ))
    }

    pub fn health(&self) -> ReplayHealth {
        self.health.borrow().clone()
    }

    /// Receiver for replay health changes.
    pub fn health_watch(&self) -> watch::Receiver<ReplayHealth> {
        self.health.clone()
    }

    /// Stop replay, close its reader, then close the append path.
    ///
    /// Further writes fail with `LogUnavailable`. Calling `close` again is a
    /// no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // Wait out any write already past the closed check.
        let _guard = self.writes.lock().await;
        self.replay.lock().await.stop().await;
        self.client.close().await?;
        info!(log = %self.log_name, "Registry store closed");
        Ok(())
    }
}
