//! HookDB - a function registry materialized from a compacted log.
//!
//! Function configurations are written to a compacted log keyed by a
//! deterministic registry key, and every process rebuilds its in-memory view
//! by replaying that log from the oldest retained record.

pub mod config;
pub mod log;
pub mod model;
pub mod store;
pub mod utils;
pub mod validation;

pub use config::Config;
pub use log::{init_log_client, LogClient, LogError, MemoryLog};
pub use model::{derive_key, FunctionConfig, RegistryKey, Status, TopicConfig, WebhookConfig};
pub use store::{RegistryStore, ReplayHealth, StoreError};
