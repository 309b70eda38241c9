//! Topic and webhook configuration documents.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::key::{derive_key, RegistryKey};
use super::status::Status;

/// Prefix of generated subscription names; such subscriptions do not resume
/// from a stored cursor.
pub const NON_RESUMABLE: &str = "NonResumable";

/// Default subscription type written when a document omits it.
pub const DEFAULT_SUBSCRIPTION_TYPE: &str = "exclusive";
/// Default initial position written when a document omits it.
pub const DEFAULT_INITIAL_POSITION: &str = "latest";

pub(crate) fn default_subscription_type() -> String {
    DEFAULT_SUBSCRIPTION_TYPE.to_string()
}

pub(crate) fn default_initial_position() -> String {
    DEFAULT_INITIAL_POSITION.to_string()
}

/// How consumers share a named subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionType {
    /// One consumer at a time.
    Exclusive,
    Shared,
    KeyShared,
    Failover,
}

impl SubscriptionType {
    /// Case-insensitive parse. Empty resolves to `Exclusive`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "exclusive" | "" => Some(SubscriptionType::Exclusive),
            "shared" => Some(SubscriptionType::Shared),
            "keyshared" => Some(SubscriptionType::KeyShared),
            "failover" => Some(SubscriptionType::Failover),
            _ => None,
        }
    }
}

/// Where a new subscription starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitialPosition {
    Latest,
    Earliest,
}

impl InitialPosition {
    /// Case-insensitive parse. Empty resolves to `Latest`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "latest" | "" => Some(InitialPosition::Latest),
            "earliest" => Some(InitialPosition::Earliest),
            _ => None,
        }
    }
}

/// A webhook subscribed to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub headers: Vec<String>,
    pub subscription: String,
    pub subscription_type: String,
    pub initial_position: String,
    pub webhook_status: Status,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: Vec::new(),
            subscription: String::new(),
            subscription_type: default_subscription_type(),
            initial_position: default_initial_position(),
            webhook_status: Status::default(),
            created_at: None,
            updated_at: None,
            deleted_at: None,
        }
    }
}

impl WebhookConfig {
    /// Create an activated, exclusive webhook with a generated non-resumable
    /// subscription name.
    pub fn new(url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            url: url.into(),
            subscription: generate_subscription_name(),
            webhook_status: Status::Activated,
            created_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        }
    }
}

fn generate_subscription_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}{}{}", NON_RESUMABLE, Uuid::new_v4().simple(), nanos)
}

/// A topic and the webhooks subscribed to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopicConfig {
    pub topic_full_name: String,
    #[serde(rename = "pulsarURL")]
    pub pulsar_url: String,
    pub token: String,
    pub tenant: String,
    pub key: RegistryKey,
    pub notes: String,
    pub topic_status: Status,
    #[serde(deserialize_with = "super::null_as_default")]
    pub webhooks: Vec<WebhookConfig>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TopicConfig {
    pub fn new(
        tenant: impl Into<String>,
        topic_full_name: impl Into<String>,
        pulsar_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let tenant = tenant.into();
        let topic_full_name = topic_full_name.into();
        let key = derive_key(&tenant, &topic_full_name);
        let now = Utc::now();
        Self {
            topic_full_name,
            pulsar_url: pulsar_url.into(),
            token: token.into(),
            tenant,
            key,
            webhooks: Vec::with_capacity(10),
            created_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        }
    }
}
