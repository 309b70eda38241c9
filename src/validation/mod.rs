//! Validation of registry documents before the store admits them.
//!
//! Validation is explicit and hand-written: every rule lives here, reports
//! the offending value, and has no side effects.

use std::collections::HashSet;

use crate::model::{
    derive_key, FunctionConfig, FunctionTopic, InitialPosition, RegistryKey, SubscriptionType,
    TopicConfig, WebhookConfig,
};

/// Result type for validation.
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Reasons a document is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("not a URL {0}")]
    InvalidUrl(String),

    #[error("subscription name is missing for webhook {0}")]
    MissingSubscription(String),

    #[error("unsupported subscription type {0}")]
    UnsupportedSubscriptionType(String),

    #[error("invalid subscription initial position {0}")]
    InvalidInitialPosition(String),

    #[error("exclusive subscription {0} cannot be shared between multiple webhooks")]
    DuplicateExclusiveSubscription(String),

    #[error("function name is missing")]
    MissingName,

    #[error("tenant is missing")]
    MissingTenant,
}

/// Whether `value` is an absolute URL with both a scheme and a host.
pub fn is_url(value: &str) -> bool {
    match url::Url::parse(value) {
        Ok(parsed) => {
            !parsed.scheme().is_empty() && parsed.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

fn resolve_subscription_type(value: &str) -> Result<SubscriptionType> {
    SubscriptionType::parse(value)
        .ok_or_else(|| ValidationError::UnsupportedSubscriptionType(value.to_string()))
}

fn resolve_initial_position(value: &str) -> Result<InitialPosition> {
    InitialPosition::parse(value)
        .ok_or_else(|| ValidationError::InvalidInitialPosition(value.to_string()))
}

/// Validate a topic's webhook set.
///
/// Webhooks are checked in input order; the first failure is returned. Two
/// exclusive webhooks sharing a subscription name fail on the second one.
pub fn validate_webhook_set(webhooks: &[WebhookConfig]) -> Result<()> {
    let mut exclusive_subscriptions: HashSet<&str> = HashSet::new();

    for webhook in webhooks {
        if !is_url(&webhook.url) {
            return Err(ValidationError::InvalidUrl(webhook.url.clone()));
        }
        if webhook.subscription.trim().is_empty() {
            return Err(ValidationError::MissingSubscription(webhook.url.clone()));
        }
        let subscription_type = resolve_subscription_type(&webhook.subscription_type)?;
        if subscription_type == SubscriptionType::Exclusive
            && !exclusive_subscriptions.insert(webhook.subscription.as_str())
        {
            return Err(ValidationError::DuplicateExclusiveSubscription(
                webhook.subscription.clone(),
            ));
        }
        resolve_initial_position(&webhook.initial_position)?;
    }

    Ok(())
}

/// Validate a topic configuration and return the key identifying it.
pub fn validate_topic_config(topic: &TopicConfig) -> Result<RegistryKey> {
    validate_webhook_set(&topic.webhooks)?;
    Ok(derive_key(&topic.tenant, &topic.topic_full_name))
}

fn validate_function_topic(topic: &FunctionTopic) -> Result<()> {
    resolve_subscription_type(&topic.subscription_type)?;
    resolve_initial_position(&topic.initial_position)?;
    Ok(())
}

/// Validate a function document before it is written.
///
/// Requires a name and tenant, absolute webhook URLs, and resolvable
/// subscription settings on every configured topic.
pub fn validate_function_config(function: &FunctionConfig) -> Result<()> {
    if function.tenant.trim().is_empty() {
        return Err(ValidationError::MissingTenant);
    }
    if function.name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }
    if let Some(bad) = function.webhook_urls.iter().find(|u| !is_url(u)) {
        return Err(ValidationError::InvalidUrl(bad.clone()));
    }
    for topic in function.topics() {
        validate_function_topic(topic)?;
    }
    Ok(())
}
