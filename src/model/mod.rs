//! Registry documents and their identity.
//!
//! - `key`: deterministic registry key derivation
//! - `status`: four-state lifecycle shared by all documents
//! - `function`: `FunctionConfig`, the document the store persists
//! - `topic`: `TopicConfig` and its `WebhookConfig` subscriptions

pub mod function;
pub mod key;
pub mod status;
pub mod topic;

pub use function::{FunctionConfig, FunctionTopic};
pub use key::{derive_key, RegistryKey};
pub use status::Status;
pub use topic::{InitialPosition, SubscriptionType, TopicConfig, WebhookConfig};

use serde::{Deserialize, Deserializer};

/// Decode `null` as the type's default.
///
/// Legacy writers encode empty lists as `null`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
