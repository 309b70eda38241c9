//! The materialized registry view.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::log::LogRecord;
use crate::model::{FunctionConfig, RegistryKey};

/// What folding one record did to the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fold {
    Upserted(RegistryKey),
    Evicted(RegistryKey),
    /// An older record for a key this process has since rewritten; ignored
    /// until replay reaches the newer write.
    Superseded(RegistryKey),
}

#[derive(Debug, Default)]
struct View {
    entries: HashMap<RegistryKey, FunctionConfig>,
    /// Payloads of local appends per key, oldest first, that replay has not
    /// yet delivered back.
    in_flight: HashMap<RegistryKey, Vec<Vec<u8>>>,
}

impl View {
    fn apply(&mut self, doc: FunctionConfig) -> Fold {
        let key = doc.id.clone();
        if doc.function_status.is_tombstone() {
            self.entries.remove(&key);
            Fold::Evicted(key)
        } else {
            self.entries.insert(key.clone(), doc);
            Fold::Upserted(key)
        }
    }

    /// Whether a replayed payload precedes the latest local write for `key`.
    ///
    /// Delivering a pending payload retires it and every older one; once
    /// nothing is pending the record folds normally.
    fn superseded(&mut self, key: &RegistryKey, payload: &[u8]) -> bool {
        let Some(pending) = self.in_flight.get_mut(key) else {
            return false;
        };
        if let Some(idx) = pending.iter().position(|p| p.as_slice() == payload) {
            pending.drain(..=idx);
        }
        if pending.is_empty() {
            self.in_flight.remove(key);
            false
        } else {
            true
        }
    }

    fn is_pending(&self, key: &RegistryKey, payload: &[u8]) -> bool {
        self.in_flight
            .get(key)
            .is_some_and(|pending| pending.iter().any(|p| p.as_slice() == payload))
    }
}

/// Keyed view of the latest live document per registry key.
///
/// Every access takes the lock for a single map operation; documents are
/// cloned in and out, never lent.
#[derive(Debug, Default)]
pub struct RegistryCache {
    view: RwLock<View>,
}

impl RegistryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &RegistryKey) -> Option<FunctionConfig> {
        self.view.read().await.entries.get(key).cloned()
    }

    pub async fn contains(&self, key: &RegistryKey) -> bool {
        self.view.read().await.entries.contains_key(key)
    }

    pub async fn snapshot(&self) -> Vec<FunctionConfig> {
        self.view.read().await.entries.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.view.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.view.read().await.entries.is_empty()
    }

    /// Fold one decoded document: tombstones evict, everything else upserts.
    ///
    /// Folding the same document twice leaves the view as folding it once.
    pub async fn apply(&self, doc: FunctionConfig) -> Fold {
        self.view.write().await.apply(doc)
    }

    /// Mark `payload` as about to be appended for `key`.
    ///
    /// Must happen before the append so replay can never deliver the record
    /// ahead of its marker.
    pub(crate) async fn begin_local(&self, key: &RegistryKey, payload: Vec<u8>) {
        let mut view = self.view.write().await;
        view.in_flight.entry(key.clone()).or_default().push(payload);
    }

    /// Install a document whose append as `payload` succeeded.
    ///
    /// Returns `None` when replay already folded the record; the view then
    /// holds that record or something newer in log order.
    pub(crate) async fn commit_local(&self, doc: FunctionConfig, payload: &[u8]) -> Option<Fold> {
        let mut view = self.view.write().await;
        if view.is_pending(&doc.id, payload) {
            Some(view.apply(doc))
        } else {
            None
        }
    }

    /// Drop the marker of an append that failed.
    pub(crate) async fn abort_local(&self, key: &RegistryKey, payload: &[u8]) {
        let mut view = self.view.write().await;
        if let Some(pending) = view.in_flight.get_mut(key) {
            if let Some(idx) = pending.iter().rposition(|p| p.as_slice() == payload) {
                pending.remove(idx);
            }
            if pending.is_empty() {
                view.in_flight.remove(key);
            }
        }
    }

    /// Decode and fold one log record.
    ///
    /// Returns `None` for records that cannot be decoded; those are logged and
    /// skipped. An empty payload is a log-level tombstone for the record key.
    /// A document without an id is filed under the record key.
    pub async fn fold_record(&self, record: &LogRecord) -> Option<Fold> {
        if record.payload.is_empty() {
            if record.key.is_empty() {
                warn!("Skipping empty record without key");
                return None;
            }
            let key = RegistryKey::from_hex(record.key.clone());
            let mut view = self.view.write().await;
            if view.superseded(&key, &record.payload) {
                return Some(Fold::Superseded(key));
            }
            view.entries.remove(&key);
            debug!(key = %key, "Evicted entry on log tombstone");
            return Some(Fold::Evicted(key));
        }

        let mut doc: FunctionConfig = match serde_json::from_slice(&record.payload) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(key = %record.key, error = %e, "Skipping undecodable registry record");
                return None;
            }
        };
        if doc.id.is_empty() {
            if record.key.is_empty() {
                warn!(name = %doc.name, "Skipping registry record without id or key");
                return None;
            }
            doc.id = RegistryKey::from_hex(record.key.clone());
        }

        let fold = {
            let mut view = self.view.write().await;
            if view.superseded(&doc.id, &record.payload) {
                Fold::Superseded(doc.id.clone())
            } else {
                view.apply(doc)
            }
        };
        match &fold {
            Fold::Upserted(key) => info!(key = %key, "Added function configuration"),
            Fold::Evicted(key) => info!(key = %key, "Removed function configuration"),
            Fold::Superseded(key) => debug!(key = %key, "Skipped record older than local write"),
        }
        Some(fold)
    }
}
