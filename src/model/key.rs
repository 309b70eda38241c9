//! Registry key derivation.
//!
//! Keys are the log compaction key and the durable identity of a registry
//! entry at the same time. The algorithm (SHA-1 over `tenant ++ name`, lowercase
//! hex) must never change: existing logs would stop compacting onto the same
//! keys and every stored document would become unreachable.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Hex-encoded SHA-1 digest identifying one registry entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryKey(String);

impl RegistryKey {
    /// Wrap an already-derived key (e.g. one read back from the log).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RegistryKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the registry key for a `(tenant, resource_name)` pair.
///
/// The two inputs are concatenated without a separator, so `("ab", "c")` and
/// `("a", "bc")` share a key. Callers relying on uniqueness must keep tenant
/// names unambiguous.
pub fn derive_key(tenant: &str, resource_name: &str) -> RegistryKey {
    let mut hasher = Sha1::new();
    hasher.update(tenant.as_bytes());
    hasher.update(resource_name.as_bytes());
    RegistryKey(hex::encode(hasher.finalize()))
}
