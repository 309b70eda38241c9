//! In-memory compacted log.
//!
//! Backs standalone mode and tests. Records are kept per log name with
//! monotonically increasing offsets; `compact` drops every record that is not
//! the latest for its key, exactly like a broker-side compaction pass. Readers
//! block on a watch channel until new records arrive.
//!
//! Fault injection hooks (`set_fail_appends`, `set_fail_opens`,
//! `set_fail_reads_after`, `disconnect_readers`) let tests drive the store
//! through log outages.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use super::{LogClient, LogError, LogReader, LogRecord, ReaderOptions, Result, StartPosition};

#[derive(Debug, Clone)]
struct StoredRecord {
    offset: u64,
    record: LogRecord,
}

#[derive(Debug, Default)]
struct Partition {
    records: Vec<StoredRecord>,
    next_offset: u64,
}

impl Partition {
    fn push(&mut self, record: LogRecord) {
        self.records.push(StoredRecord {
            offset: self.next_offset,
            record,
        });
        self.next_offset += 1;
    }

    /// First retained record at or after `offset`.
    fn first_from(&self, offset: u64) -> Option<&StoredRecord> {
        let idx = self.records.partition_point(|r| r.offset < offset);
        self.records.get(idx)
    }

    fn compact(&mut self) -> usize {
        let before = self.records.len();
        let mut seen = HashSet::new();
        let mut kept: Vec<StoredRecord> = self
            .records
            .iter()
            .rev()
            .filter(|r| seen.insert(r.record.key.clone()))
            .cloned()
            .collect();
        kept.reverse();
        self.records = kept;
        before - self.records.len()
    }
}

#[derive(Debug, Default)]
struct Shared {
    logs: HashMap<String, Partition>,
    /// Bumped by `disconnect_readers`; readers from older generations fail.
    generation: u64,
    fail_appends: bool,
    fail_opens: bool,
    /// Readers fail once they have delivered this many records.
    fail_reads_after: Option<u64>,
    closed: bool,
}

/// In-process log with compaction and fault injection.
pub struct MemoryLog {
    shared: Arc<Mutex<Shared>>,
    changes: Arc<watch::Sender<u64>>,
    open_readers: Arc<AtomicUsize>,
    opened_total: AtomicU64,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLog {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            changes: Arc::new(changes),
            open_readers: Arc::new(AtomicUsize::new(0)),
            opened_total: AtomicU64::new(0),
        }
    }

    fn notify(&self) {
        self.changes.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Make subsequent appends fail with `Unavailable`.
    pub async fn set_fail_appends(&self, fail: bool) {
        self.shared.lock().await.fail_appends = fail;
    }

    /// Make subsequent `open_reader` calls fail with `Unavailable`.
    pub async fn set_fail_opens(&self, fail: bool) {
        self.shared.lock().await.fail_opens = fail;
    }

    /// Make every reader fail after delivering `limit` records; `None` lifts
    /// the limit.
    pub async fn set_fail_reads_after(&self, limit: Option<u64>) {
        self.shared.lock().await.fail_reads_after = limit;
    }

    /// Fail every currently open reader on its next read.
    pub async fn disconnect_readers(&self) {
        {
            let mut shared = self.shared.lock().await;
            shared.generation += 1;
        }
        self.notify();
    }

    /// Drop superseded records from `log`. Returns how many were removed.
    pub async fn compact(&self, log: &str) -> usize {
        let removed = {
            let mut shared = self.shared.lock().await;
            shared
                .logs
                .get_mut(log)
                .map(Partition::compact)
                .unwrap_or_default()
        };
        debug!(log = %log, removed, "Compacted memory log");
        removed
    }

    /// Retained records of `log`, oldest first.
    pub async fn records(&self, log: &str) -> Vec<LogRecord> {
        let shared = self.shared.lock().await;
        shared
            .logs
            .get(log)
            .map(|p| p.records.iter().map(|r| r.record.clone()).collect())
            .unwrap_or_default()
    }

    /// Readers opened and not yet closed or dropped.
    pub fn open_readers(&self) -> usize {
        self.open_readers.load(Ordering::SeqCst)
    }

    /// Readers opened over the lifetime of this log.
    pub fn opened_total(&self) -> u64 {
        self.opened_total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogClient for MemoryLog {
    async fn append(&self, log: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        {
            let mut shared = self.shared.lock().await;
            if shared.closed {
                return Err(LogError::Closed);
            }
            if shared.fail_appends {
                return Err(LogError::Unavailable(format!("append to {} rejected", log)));
            }
            shared
                .logs
                .entry(log.to_string())
                .or_default()
                .push(LogRecord::new(key, payload));
        }
        self.notify();
        Ok(())
    }

    async fn open_reader(&self, log: &str, options: ReaderOptions) -> Result<Box<dyn LogReader>> {
        let (generation, start_offset) = {
            let shared = self.shared.lock().await;
            if shared.closed {
                return Err(LogError::Closed);
            }
            if shared.fail_opens {
                return Err(LogError::Unavailable(format!("cannot open reader on {}", log)));
            }
            let start_offset = match options.start {
                StartPosition::Earliest => 0,
                StartPosition::Latest => shared
                    .logs
                    .get(log)
                    .map(|p| p.next_offset)
                    .unwrap_or_default(),
            };
            (shared.generation, start_offset)
        };

        self.open_readers.fetch_add(1, Ordering::SeqCst);
        self.opened_total.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryLogReader {
            log: log.to_string(),
            shared: Arc::clone(&self.shared),
            changes: self.changes.subscribe(),
            open_readers: Arc::clone(&self.open_readers),
            generation,
            next_offset: start_offset,
            delivered: 0,
            released: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        {
            let mut shared = self.shared.lock().await;
            shared.closed = true;
        }
        self.notify();
        info!("Memory log closed");
        Ok(())
    }
}

/// Reader over one `MemoryLog` partition.
pub struct MemoryLogReader {
    log: String,
    shared: Arc<Mutex<Shared>>,
    changes: watch::Receiver<u64>,
    open_readers: Arc<AtomicUsize>,
    generation: u64,
    next_offset: u64,
    delivered: u64,
    released: bool,
}

impl MemoryLogReader {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.open_readers.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl LogReader for MemoryLogReader {
    async fn next(&mut self) -> Result<LogRecord> {
        loop {
            if self.released {
                return Err(LogError::Closed);
            }
            {
                let shared = self.shared.lock().await;
                if shared.closed {
                    return Err(LogError::Closed);
                }
                if shared.generation != self.generation {
                    return Err(LogError::Disconnected(format!(
                        "reader on {} lost its connection",
                        self.log
                    )));
                }
                if shared
                    .fail_reads_after
                    .is_some_and(|limit| self.delivered >= limit)
                {
                    return Err(LogError::Disconnected(format!(
                        "reader on {} dropped after {} records",
                        self.log, self.delivered
                    )));
                }
                if let Some(stored) = shared
                    .logs
                    .get(&self.log)
                    .and_then(|p| p.first_from(self.next_offset))
                {
                    self.next_offset = stored.offset + 1;
                    self.delivered += 1;
                    return Ok(stored.record.clone());
                }
                // Marked while holding the lock so no append can slip between
                // the check above and the wait below.
                self.changes.borrow_and_update();
            }
            if self.changes.changed().await.is_err() {
                return Err(LogError::Closed);
            }
        }
    }

    async fn close(&mut self) {
        self.release();
    }
}

impl Drop for MemoryLogReader {
    fn drop(&mut self) {
        self.release();
    }
}
