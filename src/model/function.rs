//! Function configuration, the canonical registry document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::key::{derive_key, RegistryKey};
use super::status::Status;
use super::topic::{default_initial_position, default_subscription_type};

/// Connection parameters for one topic a function reads or writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FunctionTopic {
    pub topic_full_name: String,
    #[serde(rename = "pulsarURL")]
    pub pulsar_url: String,
    pub token: String,
    pub tenant: String,
    pub key: String,
    pub subscription: String,
    pub subscription_type: String,
    pub key_shared_policy: String,
    pub initial_position: String,
}

impl Default for FunctionTopic {
    fn default() -> Self {
        Self {
            topic_full_name: String::new(),
            pulsar_url: String::new(),
            token: String::new(),
            tenant: String::new(),
            key: String::new(),
            subscription: String::new(),
            subscription_type: default_subscription_type(),
            key_shared_policy: String::new(),
            initial_position: default_initial_position(),
        }
    }
}

impl FunctionTopic {
    /// A topic slot with no topic name is unused.
    pub fn is_configured(&self) -> bool {
        !self.topic_full_name.trim().is_empty()
    }
}

/// A function registered in the store.
///
/// `id` is always `derive_key(tenant, name)` once the store has admitted the
/// document; callers may leave it empty on create.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FunctionConfig {
    pub name: String,
    pub id: RegistryKey,
    pub tenant: String,
    pub function_status: Status,
    pub function_file_path: String,
    pub language_pack: String,
    pub parallelism: i32,
    #[serde(rename = "webhookURLs", deserialize_with = "super::null_as_default")]
    pub webhook_urls: Vec<String>,
    #[serde(rename = "inputTopics")]
    pub input_topic: FunctionTopic,
    #[serde(rename = "outputTopics")]
    pub output_topic: FunctionTopic,
    pub log_topic: FunctionTopic,
    pub trigger_type: String,
    pub cron: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FunctionConfig {
    pub fn new(tenant: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Key this document is stored under.
    pub fn registry_key(&self) -> RegistryKey {
        derive_key(&self.tenant, &self.name)
    }

    /// Configured topics in input, output, log order.
    pub fn topics(&self) -> impl Iterator<Item = &FunctionTopic> {
        [&self.input_topic, &self.output_topic, &self.log_topic]
            .into_iter()
            .filter(|t| t.is_configured())
    }
}
