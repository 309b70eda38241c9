//! Compacted log capability.
//!
//! This module contains:
//! - `LogClient` trait: append keyed records, open tailing readers
//! - `LogReader` trait: ordered delivery from the oldest retained record
//! - Log configuration types and the backend factory
//! - Implementations: in-memory (`memory`), Kafka (`kafka`, feature-gated)
//!
//! The log is the system of record. Only the latest record per key is
//! guaranteed to survive compaction, but a full replay may still deliver
//! older versions; readers hand them over in commit order.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

#[cfg(feature = "kafka")]
pub use kafka::KafkaLogClient;
pub use memory::MemoryLog;

// ============================================================================
// Traits
// ============================================================================

/// Result type for log operations.
pub type Result<T> = std::result::Result<T, LogError>;

/// Errors raised by a log backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LogError {
    #[error("log unavailable: {0}")]
    Unavailable(String),

    #[error("reader disconnected: {0}")]
    Disconnected(String),

    #[error("log client closed")]
    Closed,
}

/// One record as stored in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Compaction key.
    pub key: String,
    /// Opaque document bytes. Empty means the log itself tombstoned the key.
    pub payload: Vec<u8>,
}

impl LogRecord {
    pub fn new(key: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
        }
    }
}

/// Where a reader starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartPosition {
    /// Oldest retained record.
    #[default]
    Earliest,
    /// Only records appended after the reader opens.
    Latest,
}

/// Options for opening a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    pub start: StartPosition,
    /// Read the compacted view of the log where the backend has one.
    pub read_compacted: bool,
}

impl ReaderOptions {
    /// Full compaction-aware replay, the mode the registry uses.
    pub fn replay() -> Self {
        Self {
            start: StartPosition::Earliest,
            read_compacted: true,
        }
    }
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self::replay()
    }
}

/// Ordered cursor over one log.
///
/// `next` must be cancel-safe: dropping its future before completion must not
/// skip a record.
#[async_trait]
pub trait LogReader: Send {
    /// Wait for the next record.
    async fn next(&mut self) -> Result<LogRecord>;

    /// Release the reader. Further `next` calls fail.
    async fn close(&mut self);
}

/// Append and tail access to named logs.
///
/// Implementations:
/// - `MemoryLog`: in-process log with compaction and fault injection
/// - `KafkaLogClient`: compacted Kafka topic (feature `kafka`)
#[async_trait]
pub trait LogClient: Send + Sync {
    /// Append a keyed record. Returns once the log acknowledged it.
    async fn append(&self, log: &str, key: &str, payload: Vec<u8>) -> Result<()>;

    /// Open a reader over `log`.
    async fn open_reader(&self, log: &str, options: ReaderOptions) -> Result<Box<dyn LogReader>>;

    /// Release the append path.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Log backend discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    /// In-process log; contents are lost on exit.
    #[default]
    Memory,
    Kafka,
}

/// Default name of the registry log.
pub const DEFAULT_LOG_NAME: &str = "hookdb-functions";

/// Log configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    #[serde(rename = "type")]
    pub log_type: LogType,
    /// Log (topic) holding the registry documents.
    pub name: String,
    pub kafka: KafkaConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_type: LogType::Memory,
            name: DEFAULT_LOG_NAME.to_string(),
            kafka: KafkaConfig::default(),
        }
    }
}

/// Kafka-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// How long an append waits for acknowledgement.
    pub append_timeout_ms: u64,
    /// SASL username (optional, for authenticated clusters).
    pub sasl_username: Option<String>,
    /// SASL password (optional, for authenticated clusters).
    pub sasl_password: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    /// SSL CA certificate path (for SSL connections).
    pub ssl_ca_location: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            append_timeout_ms: 5000,
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ssl_ca_location: None,
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Build the configured log backend.
///
/// Kafka requires the `kafka` feature.
pub fn init_log_client(config: &LogConfig) -> Result<Arc<dyn LogClient>> {
    match config.log_type {
        LogType::Memory => {
            info!(log_type = "memory", log = %config.name, "Log client initialized");
            Ok(Arc::new(MemoryLog::new()))
        }
        LogType::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let client = KafkaLogClient::new(config.kafka.clone())?;
                info!(
                    log_type = "kafka",
                    log = %config.name,
                    bootstrap_servers = %config.kafka.bootstrap_servers,
                    "Log client initialized"
                );
                Ok(Arc::new(client))
            }

            #[cfg(not(feature = "kafka"))]
            {
                Err(LogError::Unavailable(
                    "Kafka support requires the 'kafka' feature. Rebuild with --features kafka"
                        .to_string(),
                ))
            }
        }
    }
}
